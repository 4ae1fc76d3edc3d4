//! 順伝播型ニューラルネットワーク（分類器）
//!
//! Dense(入力 → h, 活性化) → Dropout → Dense(h → 10, softmax)。
//! カーネル重みには L2 正則化をかける（バイアスは対象外）。

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::ModelError;
use crate::grid::{ParamSet, ParamValue};
use crate::params::{
    DEFAULT_DROPOUT_RATE, DEFAULT_NEURONS_PER_LAYER, DEFAULT_WEIGHT_DECAY, INPUT_DIM,
    KEY_ACTIVATION_FUNCTION, KEY_DROPOUT_RATE, KEY_NEURONS_PER_LAYER, KEY_WEIGHT_DECAY,
    NUM_CLASSES, PROB_EPS,
};

/// 隠れ層の活性化関数
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub const ALL: [Activation; 3] = [Activation::Relu, Activation::Tanh, Activation::Sigmoid];

    pub fn name(self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
        }
    }

    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// 活性化前の値 `x` と活性化後の値 `y` から微分を求める
    #[inline]
    pub fn derivative(self, x: f32, y: f32) -> f32 {
        match self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - y * y,
            Activation::Sigmoid => y * (1.0 - y),
        }
    }
}

impl FromStr for Activation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Activation::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::UnknownActivation(s.to_string()))
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// モデル構築パラメータ
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub neurons_per_layer: usize,
    pub activation_function: Activation,
    pub dropout_rate: f32,
    pub weight_decay: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            neurons_per_layer: DEFAULT_NEURONS_PER_LAYER,
            activation_function: Activation::Relu,
            dropout_rate: DEFAULT_DROPOUT_RATE,
            weight_decay: DEFAULT_WEIGHT_DECAY,
        }
    }
}

impl ModelConfig {
    /// グリッドの 1 点から構築する。指定のないキーは既定値のまま
    pub fn from_params(params: &ParamSet) -> Result<Self, ModelError> {
        let mut cfg = Self::default();
        for (name, value) in params.iter() {
            match name.as_str() {
                KEY_NEURONS_PER_LAYER => {
                    cfg.neurons_per_layer = value
                        .as_i64()
                        .and_then(|v| usize::try_from(v).ok())
                        .ok_or_else(|| type_error(name, "a non-negative int", value))?;
                }
                KEY_ACTIVATION_FUNCTION => {
                    cfg.activation_function = value
                        .as_str()
                        .ok_or_else(|| type_error(name, "a string", value))?
                        .parse()?;
                }
                KEY_DROPOUT_RATE => {
                    cfg.dropout_rate = value
                        .as_f64()
                        .ok_or_else(|| type_error(name, "a number", value))?
                        as f32;
                }
                KEY_WEIGHT_DECAY => {
                    cfg.weight_decay = value
                        .as_f64()
                        .ok_or_else(|| type_error(name, "a number", value))?
                        as f32;
                }
                other => return Err(ModelError::UnknownParam(other.to_string())),
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.neurons_per_layer == 0 {
            return Err(ModelError::ZeroWidth);
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ModelError::InvalidDropout(self.dropout_rate));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(ModelError::InvalidWeightDecay(self.weight_decay));
        }
        Ok(())
    }
}

fn type_error(name: &str, expected: &'static str, found: &ParamValue) -> ModelError {
    ModelError::ParamType {
        name: name.to_string(),
        expected,
        found: format!("{} {found}", found.type_name()),
    }
}

/// 勾配バッファ（パラメータと同じ形状）
#[derive(Clone, Debug)]
pub struct Gradients {
    w1: Vec<f32>,
    b1: Vec<f32>,
    w2: Vec<f32>,
    b2: Vec<f32>,
}

impl Gradients {
    pub fn zeros_like(model: &Classifier) -> Self {
        let [w1, b1, w2, b2] = model.tensor_sizes();
        Self {
            w1: vec![0.0; w1],
            b1: vec![0.0; b1],
            w2: vec![0.0; w2],
            b2: vec![0.0; b2],
        }
    }

    pub fn clear(&mut self) {
        for t in [&mut self.w1, &mut self.b1, &mut self.w2, &mut self.b2] {
            t.fill(0.0);
        }
    }

    pub(crate) fn tensors(&self) -> [&[f32]; 4] {
        [&self.w1, &self.b1, &self.w2, &self.b2]
    }

    #[cfg(test)]
    pub(crate) fn tensors_mut(&mut self) -> [&mut [f32]; 4] {
        [&mut self.w1, &mut self.b1, &mut self.w2, &mut self.b2]
    }
}

/// ミニバッチの集計値
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchStats {
    /// 交差エントロピーの合計（正則化項を含まない）
    pub loss_sum: f32,
    pub correct: usize,
    pub samples: usize,
}

/// 2 層の全結合分類器
#[derive(Clone, Debug)]
pub struct Classifier {
    config: ModelConfig,
    input_dim: usize,
    /// [input_dim][hidden]
    w1: Vec<f32>,
    b1: Vec<f32>,
    /// [hidden][NUM_CLASSES]
    w2: Vec<f32>,
    b2: Vec<f32>,
}

impl Classifier {
    /// Glorot uniform で重みを、ゼロでバイアスを初期化する
    pub fn new<R: Rng>(
        config: ModelConfig,
        input_dim: usize,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let hidden = config.neurons_per_layer;
        let w1 = glorot_uniform(input_dim, hidden, rng);
        let w2 = glorot_uniform(hidden, NUM_CLASSES, rng);
        Ok(Self {
            config,
            input_dim,
            w1,
            b1: vec![0.0; hidden],
            w2,
            b2: vec![0.0; NUM_CLASSES],
        })
    }

    pub fn from_params<R: Rng>(
        params: &ParamSet,
        input_dim: usize,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        Self::new(ModelConfig::from_params(params)?, input_dim, rng)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn hidden(&self) -> usize {
        self.config.neurons_per_layer
    }

    pub fn tensor_sizes(&self) -> [usize; 4] {
        [self.w1.len(), self.b1.len(), self.w2.len(), self.b2.len()]
    }

    /// 学習対象パラメータ数
    pub fn param_count(&self) -> usize {
        self.tensor_sizes().iter().sum()
    }

    pub(crate) fn tensors_mut(&mut self) -> [&mut [f32]; 4] {
        [&mut self.w1, &mut self.b1, &mut self.w2, &mut self.b2]
    }

    #[cfg(test)]
    pub(crate) fn tensors(&self) -> [&[f32]; 4] {
        [&self.w1, &self.b1, &self.w2, &self.b2]
    }

    pub fn check_input(&self, data: &Dataset) -> Result<(), ModelError> {
        if data.dim() != self.input_dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.input_dim,
                actual: data.dim(),
            });
        }
        Ok(())
    }

    /// z1 = b1 + x · W1（画素 0 の行は飛ばす）
    fn hidden_pre(&self, x: &[f32], z1: &mut [f32]) {
        let h = self.hidden();
        z1.copy_from_slice(&self.b1);
        for (i, &xi) in x.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            let row = &self.w1[i * h..(i + 1) * h];
            for (z, &w) in z1.iter_mut().zip(row) {
                *z += xi * w;
            }
        }
    }

    fn logits(&self, hidden: &[f32]) -> [f32; NUM_CLASSES] {
        let mut z2 = [0.0f32; NUM_CLASSES];
        z2.copy_from_slice(&self.b2);
        for (j, &hj) in hidden.iter().enumerate() {
            if hj == 0.0 {
                continue;
            }
            let row = &self.w2[j * NUM_CLASSES..(j + 1) * NUM_CLASSES];
            for (z, &w) in z2.iter_mut().zip(row) {
                *z += hj * w;
            }
        }
        z2
    }

    /// 推論時のクラス確率（Dropout は無効）
    pub fn predict_proba_row(&self, x: &[f32]) -> [f32; NUM_CLASSES] {
        let act = self.config.activation_function;
        let mut hidden = vec![0.0f32; self.hidden()];
        self.hidden_pre(x, &mut hidden);
        for v in hidden.iter_mut() {
            *v = act.apply(*v);
        }
        let mut p = self.logits(&hidden);
        softmax_in_place(&mut p);
        p
    }

    pub fn predict_row(&self, x: &[f32]) -> u8 {
        argmax(&self.predict_proba_row(x)) as u8
    }

    pub fn predict(&self, data: &Dataset) -> Vec<u8> {
        (0..data.len()).map(|i| self.predict_row(data.row(i))).collect()
    }

    /// 正解率
    pub fn score(&self, data: &Dataset) -> f64 {
        let indices: Vec<usize> = (0..data.len()).collect();
        self.score_on(data, &indices)
    }

    /// 指定サンプルに対する正解率（空なら 0）
    pub fn score_on(&self, data: &Dataset, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let correct = indices
            .iter()
            .filter(|&&i| self.predict_row(data.row(i)) == data.label(i))
            .count();
        correct as f64 / indices.len() as f64
    }

    /// L2 正則化項 `weight_decay * Σw²`（カーネルのみ）
    pub fn l2_penalty(&self) -> f32 {
        let wd = self.config.weight_decay;
        if wd == 0.0 {
            return 0.0;
        }
        let sq: f32 = self.w1.iter().chain(&self.w2).map(|w| w * w).sum();
        wd * sq
    }

    pub(crate) fn add_l2_gradient(&self, grads: &mut Gradients) {
        let wd2 = 2.0 * self.config.weight_decay;
        if wd2 == 0.0 {
            return;
        }
        for (g, &w) in grads.w1.iter_mut().zip(&self.w1) {
            *g += wd2 * w;
        }
        for (g, &w) in grads.w2.iter_mut().zip(&self.w2) {
            *g += wd2 * w;
        }
    }

    /// バッチの交差エントロピー勾配を `grads` に累積する（バッチ平均）
    pub fn accumulate_gradients<R: Rng>(
        &self,
        data: &Dataset,
        batch: &[usize],
        grads: &mut Gradients,
        rng: &mut R,
    ) -> BatchStats {
        let mut stats = BatchStats::default();
        if batch.is_empty() {
            return stats;
        }

        let h = self.hidden();
        let act = self.config.activation_function;
        let rate = self.config.dropout_rate;
        let keep = 1.0 - rate;
        let scale = 1.0 / batch.len() as f32;

        let mut z1 = vec![0.0f32; h];
        let mut a1 = vec![0.0f32; h];
        let mut mask = vec![1.0f32; h];
        let mut d1 = vec![0.0f32; h];
        let mut dz1 = vec![0.0f32; h];

        for &idx in batch {
            let x = data.row(idx);
            let y = usize::from(data.label(idx));

            // 順伝播
            self.hidden_pre(x, &mut z1);
            for j in 0..h {
                a1[j] = act.apply(z1[j]);
                if rate > 0.0 {
                    mask[j] = if rng.random::<f32>() < keep { 1.0 / keep } else { 0.0 };
                }
                d1[j] = a1[j] * mask[j];
            }
            let mut p = self.logits(&d1);
            softmax_in_place(&mut p);

            stats.loss_sum -= p[y].max(PROB_EPS).ln();
            if argmax(&p) == y {
                stats.correct += 1;
            }
            stats.samples += 1;

            // 逆伝播: softmax + 交差エントロピー
            let mut dz2 = p;
            dz2[y] -= 1.0;
            for v in dz2.iter_mut() {
                *v *= scale;
            }
            for (g, &d) in grads.b2.iter_mut().zip(&dz2) {
                *g += d;
            }

            for j in 0..h {
                let row = &self.w2[j * NUM_CLASSES..(j + 1) * NUM_CLASSES];
                let grow = &mut grads.w2[j * NUM_CLASSES..(j + 1) * NUM_CLASSES];
                let mut back = 0.0f32;
                for k in 0..NUM_CLASSES {
                    grow[k] += d1[j] * dz2[k];
                    back += row[k] * dz2[k];
                }
                dz1[j] = back * mask[j] * act.derivative(z1[j], a1[j]);
            }

            for (g, &d) in grads.b1.iter_mut().zip(&dz1) {
                *g += d;
            }
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let grow = &mut grads.w1[i * h..(i + 1) * h];
                for (g, &d) in grow.iter_mut().zip(&dz1) {
                    *g += xi * d;
                }
            }
        }

        stats
    }
}

/// 28x28 入力の分類器を作るモデルファクトリ
pub fn create_model<R: Rng>(params: &ParamSet, rng: &mut R) -> Result<Classifier, ModelError> {
    Classifier::from_params(params, INPUT_DIM, rng)
}

fn glorot_uniform<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Vec<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    (0..fan_in * fan_out)
        .map(|_| rng.random_range(-limit..limit))
        .collect()
}

/// 数値安定版 softmax
pub fn softmax_in_place(z: &mut [f32]) {
    let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in z.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in z.iter_mut() {
        *v /= sum;
    }
}

/// 最大値の添字（同値なら先頭）
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
