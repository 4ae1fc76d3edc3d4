//! 学習ループ
//!
//! エポック単位での学習を管理する。

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::callbacks::{EpochStats, LearningRateControl, TrainCallback};
use crate::dataset::Dataset;
use crate::error::ModelError;
use crate::model::{Classifier, Gradients};
use crate::optimizer::Adam;
use crate::params::{DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS};

/// 学習設定
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    /// エポック数
    pub epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// エポックごとにサンプル順をシャッフルするか
    pub shuffle: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle: true,
        }
    }
}

/// トレーナー
pub struct Trainer {
    config: FitConfig,
    optimizer: Adam,
    rng: ChaCha8Rng,
    callbacks: Vec<Box<dyn TrainCallback>>,
}

impl Trainer {
    /// `model` の形状に合わせたオプティマイザを持つトレーナーを作成
    pub fn new(config: FitConfig, model: &Classifier, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            optimizer: Adam::new(model),
            rng,
            callbacks: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: Box<dyn TrainCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Vec<Box<dyn TrainCallback>>) -> Self {
        self.callbacks.extend(callbacks);
        self
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// 全サンプルで学習
    pub fn train_all(
        &mut self,
        model: &mut Classifier,
        data: &Dataset,
    ) -> Result<Vec<EpochStats>, ModelError> {
        let indices: Vec<usize> = (0..data.len()).collect();
        self.train(model, data, &indices)
    }

    /// `indices` で指定したサンプルだけで学習を実行
    pub fn train(
        &mut self,
        model: &mut Classifier,
        data: &Dataset,
        indices: &[usize],
    ) -> Result<Vec<EpochStats>, ModelError> {
        model.check_input(data)?;

        let epochs = self.config.epochs;
        let batch_size = self.config.batch_size.max(1);
        let mut order = indices.to_vec();
        let mut grads = Gradients::zeros_like(model);
        let mut history = Vec::with_capacity(epochs);

        for cb in &mut self.callbacks {
            cb.on_train_begin(epochs);
        }

        for epoch in 0..epochs {
            // 学習率の更新はコールバック経由
            for cb in &mut self.callbacks {
                cb.on_epoch_begin(epoch, &mut self.optimizer);
            }

            if self.config.shuffle {
                order.shuffle(&mut self.rng);
            }

            let stats = self.train_epoch(model, data, &order, &mut grads, batch_size, epoch);
            log::debug!(
                "Epoch {}/{}: lr={:.6}, loss={:.6}, acc={:.4}, samples={}",
                epoch + 1,
                epochs,
                stats.learning_rate,
                stats.loss,
                stats.accuracy,
                stats.samples
            );

            for cb in &mut self.callbacks {
                cb.on_epoch_end(&stats);
            }
            history.push(stats);
        }

        Ok(history)
    }

    /// 1エポックの学習
    fn train_epoch(
        &mut self,
        model: &mut Classifier,
        data: &Dataset,
        order: &[usize],
        grads: &mut Gradients,
        batch_size: usize,
        epoch: usize,
    ) -> EpochStats {
        let mut loss_sum = 0.0f32;
        let mut correct = 0usize;
        let mut samples = 0usize;

        for batch in order.chunks(batch_size) {
            grads.clear();
            let stats = model.accumulate_gradients(data, batch, grads, &mut self.rng);
            model.add_l2_gradient(grads);
            self.optimizer.step(model, grads);

            loss_sum += stats.loss_sum;
            correct += stats.correct;
            samples += stats.samples;
        }

        let (loss, accuracy) = if samples > 0 {
            (
                loss_sum / samples as f32 + model.l2_penalty(),
                correct as f32 / samples as f32,
            )
        } else {
            (model.l2_penalty(), 0.0)
        };

        EpochStats {
            epoch,
            learning_rate: self.optimizer.learning_rate(),
            loss,
            accuracy,
            samples,
        }
    }
}
