//! Adam オプティマイザ

use crate::callbacks::LearningRateControl;
use crate::model::{Classifier, Gradients};
use crate::params::{ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON, ADAM_LEARNING_RATE};

pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    beta1_pow: f32,
    beta2_pow: f32,
    steps: u64,
    m: [Vec<f32>; 4],
    v: [Vec<f32>; 4],
}

impl Adam {
    pub fn new(model: &Classifier) -> Self {
        let sizes = model.tensor_sizes();
        Adam {
            learning_rate: ADAM_LEARNING_RATE,
            beta1: ADAM_BETA1,
            beta2: ADAM_BETA2,
            epsilon: ADAM_EPSILON,
            beta1_pow: 1.0,
            beta2_pow: 1.0,
            steps: 0,
            m: sizes.map(|n| vec![0.0; n]),
            v: sizes.map(|n| vec![0.0; n]),
        }
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// 更新済みステップ数
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// バイアス補正付きで 1 ステップ更新する
    pub fn step(&mut self, model: &mut Classifier, grads: &Gradients) {
        self.steps += 1;
        self.beta1_pow *= self.beta1;
        self.beta2_pow *= self.beta2;
        let lr_t = self.learning_rate * (1.0 - self.beta2_pow).sqrt() / (1.0 - self.beta1_pow);

        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let params = model.tensors_mut();
        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads.tensors())
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            for i in 0..param.len() {
                let g = grad[i];
                m[i] = b1 * m[i] + (1.0 - b1) * g;
                v[i] = b2 * v[i] + (1.0 - b2) * g * g;
                param[i] -= lr_t * m[i] / (v[i].sqrt() + eps);
            }
        }
    }
}

impl LearningRateControl for Adam {
    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
