//! MNIST 向け全結合分類器のハイパーパラメータ探索
//!
//! - `dataset`: IDX 形式（.gz 可）の読み込み
//! - `model` / `optimizer` / `trainer`: 2 層 MLP と Adam による学習
//! - `schedule` / `callbacks`: エポック単位の学習率ステップ減衰
//! - `grid` / `cv` / `search`: 層化 k 分割によるグリッドサーチ
//! - `report`: 活性化関数ごとの結果集計とレポート出力

pub mod callbacks;
pub mod cv;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod io;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod report;
pub mod schedule;
pub mod search;
pub mod trainer;

pub use callbacks::{EpochStats, LearningRateControl, LearningRateScheduler, TrainCallback};
pub use cv::{Fold, StratifiedKFold};
pub use dataset::{Dataset, Mnist};
pub use error::{DatasetError, Error, GridError, ModelError, Result, SearchError};
pub use grid::{ParamGrid, ParamSet, ParamValue};
pub use model::{Activation, Classifier, ModelConfig, create_model};
pub use report::{SearchReport, TrialResult, filter_by_activation, group_by_activation};
pub use schedule::{StepDecay, lr_schedule};
pub use search::{CvResults, FitRng, GridSearch, SearchOutcome};
pub use trainer::{FitConfig, Trainer};
