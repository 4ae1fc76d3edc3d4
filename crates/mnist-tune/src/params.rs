//! 定数類

pub const IMAGE_ROWS: usize = 28;
pub const IMAGE_COLS: usize = 28;
pub const INPUT_DIM: usize = IMAGE_ROWS * IMAGE_COLS;
pub const NUM_CLASSES: usize = 10;
pub const PIXEL_SCALE: f32 = 255.0;

pub const IDX_LABELS_MAGIC: u32 = 0x0000_0801;
pub const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;
pub const IDX_LABELS_HEADER_BYTES: usize = 8;
pub const IDX_IMAGES_HEADER_BYTES: usize = 16;

pub const TRAIN_IMAGES_FILE: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS_FILE: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES_FILE: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS_FILE: &str = "t10k-labels-idx1-ubyte";

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CV_FOLDS: usize = 3;
pub const DEFAULT_EPOCHS: usize = 1;
pub const DEFAULT_BATCH_SIZE: usize = 32;

pub const DEFAULT_NEURONS_PER_LAYER: usize = 64;
pub const DEFAULT_DROPOUT_RATE: f32 = 0.2;
pub const DEFAULT_WEIGHT_DECAY: f32 = 0.001;

pub const ADAM_LEARNING_RATE: f32 = 0.001;
pub const ADAM_BETA1: f32 = 0.9;
pub const ADAM_BETA2: f32 = 0.999;
pub const ADAM_EPSILON: f32 = 1e-7;

/// log(0) 回避用の確率下限
pub const PROB_EPS: f32 = 1e-7;

pub const KEY_NEURONS_PER_LAYER: &str = "neurons_per_layer";
pub const KEY_ACTIVATION_FUNCTION: &str = "activation_function";
pub const KEY_DROPOUT_RATE: &str = "dropout_rate";
pub const KEY_WEIGHT_DECAY: &str = "weight_decay";
