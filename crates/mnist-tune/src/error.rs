//! Error types for mnist-tune
//!
//! データ読み込み・グリッド定義・モデル構築・探索それぞれの失敗を型で表す。

use std::path::PathBuf;

/// IDX データセット読み込みのエラー
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// File I/O error
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No candidate file (plain or .gz) exists
    #[error("dataset file not found: {0} (also tried .gz)")]
    NotFound(PathBuf),

    /// Magic number mismatch
    #[error("{source_name}: bad IDX magic {found:#010x}, expected {expected:#010x}")]
    BadMagic {
        source_name: String,
        expected: u32,
        found: u32,
    },

    /// Header or payload shorter than announced
    #[error("{source_name}: truncated IDX data (need {needed} bytes, have {available})")]
    Truncated {
        source_name: String,
        needed: usize,
        available: usize,
    },

    /// Image and label files disagree on sample count
    #[error("image/label count mismatch: {images} images, {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    /// Feature buffer is not a whole number of rows
    #[error("feature buffer of {len} values is not a multiple of row width {dim}")]
    RaggedFeatures { len: usize, dim: usize },

    /// Label outside 0..NUM_CLASSES
    #[error("label {label} at index {index} is out of range 0..{num_classes}")]
    LabelOutOfRange {
        index: usize,
        label: u8,
        num_classes: usize,
    },
}

/// パラメータグリッド定義のエラー
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GridError {
    #[error("parameter '{0}' has no candidate values")]
    EmptyValues(String),
}

/// モデル構築のエラー
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("unknown hyperparameter '{0}'")]
    UnknownParam(String),

    #[error("hyperparameter '{name}' expects {expected}, got {found}")]
    ParamType {
        name: String,
        expected: &'static str,
        found: String,
    },

    #[error("unknown activation function '{0}' (expected relu, tanh or sigmoid)")]
    UnknownActivation(String),

    #[error("neurons_per_layer must be positive")]
    ZeroWidth,

    #[error("dropout_rate must be in [0, 1), got {0}")]
    InvalidDropout(f32),

    #[error("weight_decay must be finite and non-negative, got {0}")]
    InvalidWeightDecay(f32),

    #[error("input dimension mismatch: model expects {expected}, data has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// グリッドサーチのエラー
#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("cannot split {n_samples} samples into {n_splits} folds (need 2 <= folds <= samples)")]
    InvalidSplits { n_splits: usize, n_samples: usize },

    #[error("n_splits={n_splits} is greater than the number of members in every class")]
    ClassesTooSmall { n_splits: usize },

    #[error("label {label} at index {index} is out of range 0..{num_classes}")]
    LabelOutOfRange {
        index: usize,
        label: u8,
        num_classes: usize,
    },

    #[error("parameter grid has no candidates")]
    EmptyGrid,

    #[error("model factory failed for {params}")]
    Factory {
        params: String,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Umbrella error for library callers
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

pub type Result<T> = std::result::Result<T, Error>;
