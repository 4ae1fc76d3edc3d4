//! 学習ループのコールバック
//!
//! エポック開始時に学習率を差し込むスケジューラなど、学習ループの外から
//! 振る舞いを足すためのフック。

/// 学習率を読み書きできるオプティマイザ
pub trait LearningRateControl {
    fn learning_rate(&self) -> f32;
    fn set_learning_rate(&mut self, lr: f32);
}

/// 1 エポック分の統計
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub learning_rate: f32,
    /// 交差エントロピー平均 + L2 正則化項
    pub loss: f32,
    /// 学習データ上の正解率（Dropout 有効時の値）
    pub accuracy: f32,
    pub samples: usize,
}

/// 学習ループのフック。既定実装は何もしない
pub trait TrainCallback: Send {
    fn on_train_begin(&mut self, _epochs: usize) {}

    fn on_epoch_begin(&mut self, _epoch: usize, _optimizer: &mut dyn LearningRateControl) {}

    fn on_epoch_end(&mut self, _stats: &EpochStats) {}
}

/// エポック番号から学習率を決めてオプティマイザに設定する
pub struct LearningRateScheduler<F> {
    schedule: F,
}

impl<F> LearningRateScheduler<F>
where
    F: Fn(usize) -> f32 + Send,
{
    pub fn new(schedule: F) -> Self {
        Self { schedule }
    }
}

impl<F> TrainCallback for LearningRateScheduler<F>
where
    F: Fn(usize) -> f32 + Send,
{
    fn on_epoch_begin(&mut self, epoch: usize, optimizer: &mut dyn LearningRateControl) {
        let lr = (self.schedule)(epoch);
        log::trace!("epoch {epoch}: learning rate {lr}");
        optimizer.set_learning_rate(lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::lr_schedule;

    struct FixedLr(f32);

    impl LearningRateControl for FixedLr {
        fn learning_rate(&self) -> f32 {
            self.0
        }
        fn set_learning_rate(&mut self, lr: f32) {
            self.0 = lr;
        }
    }

    #[test]
    fn test_scheduler_pushes_lr_each_epoch() {
        let mut opt = FixedLr(1.0);
        let mut cb = LearningRateScheduler::new(lr_schedule);

        cb.on_epoch_begin(0, &mut opt);
        assert_eq!(opt.learning_rate(), 0.001);

        cb.on_epoch_begin(25, &mut opt);
        assert_eq!(opt.learning_rate(), lr_schedule(25));
    }
}
