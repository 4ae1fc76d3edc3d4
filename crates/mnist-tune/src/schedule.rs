//! 学習率スケジュール
//!
//! 10 エポックごとに固定倍率で学習率を下げるステップ減衰。

use serde::{Deserialize, Serialize};

/// 初期学習率
pub const INITIAL_LR: f32 = 0.001;
/// 減衰率
pub const DECAY_FACTOR: f32 = 0.1;
/// 減衰間隔（エポック）
pub const DECAY_EVERY_EPOCHS: usize = 10;

/// ステップ減衰スケジュール
///
/// `lr(epoch) = initial_lr * decay_factor^(epoch / step_epochs)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepDecay {
    /// 初期学習率
    pub initial_lr: f32,
    /// 減衰率
    pub decay_factor: f32,
    /// 減衰間隔（0 の場合は減衰しない）
    pub step_epochs: usize,
}

impl Default for StepDecay {
    fn default() -> Self {
        Self {
            initial_lr: INITIAL_LR,
            decay_factor: DECAY_FACTOR,
            step_epochs: DECAY_EVERY_EPOCHS,
        }
    }
}

impl StepDecay {
    pub fn new(initial_lr: f32, decay_factor: f32, step_epochs: usize) -> Self {
        Self {
            initial_lr,
            decay_factor,
            step_epochs,
        }
    }

    /// エポックに応じた学習率を計算
    pub fn lr_at(&self, epoch: usize) -> f32 {
        if self.step_epochs == 0 || epoch < self.step_epochs {
            return self.initial_lr;
        }
        let k = (epoch / self.step_epochs) as i32;
        self.initial_lr * self.decay_factor.powi(k)
    }
}

/// 既定スケジュール（0.001、10 エポックごとに 1/10）
pub fn lr_schedule(epoch: usize) -> f32 {
    StepDecay::default().lr_at(epoch)
}
