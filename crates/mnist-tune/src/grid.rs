//! ハイパーパラメータグリッド
//!
//! 名前 → 候補値リストの対応を保持し、直積で候補を列挙する。
//! キーは名前順、最後のキーが最も速く変化する。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::params::{
    KEY_ACTIVATION_FUNCTION, KEY_DROPOUT_RATE, KEY_NEURONS_PER_LAYER, KEY_WEIGHT_DECAY,
};

/// ハイパーパラメータの値
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// 整数も浮動小数として受け付ける
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Int(v) => Some(v as f64),
            ParamValue::Float(v) => Some(v),
            ParamValue::Str(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "str",
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

// 'relu', 0.2, 64, 1.0 のような repr 風表記
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(s) => write!(f, "'{s}'"),
        }
    }
}

/// グリッド上の 1 点（名前順に並ぶ）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{name}': {value}")?;
        }
        f.write_str("}")
    }
}

/// パラメータグリッド
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// 軸を追加（同名の軸は置き換える）
    pub fn insert<V: Into<ParamValue>>(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), GridError> {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(GridError::EmptyValues(name));
        }
        self.axes.insert(name, values);
        Ok(())
    }

    /// 設定ファイル等から直接作られたグリッドの検証
    pub fn validate(&self) -> Result<(), GridError> {
        match self.axes.iter().find(|(_, values)| values.is_empty()) {
            Some((name, _)) => Err(GridError::EmptyValues(name.clone())),
            None => Ok(()),
        }
    }

    /// 指定した軸の候補値
    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.axes.get(name).map(Vec::as_slice)
    }

    /// 候補数（各軸の候補数の積）
    pub fn len(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全候補を列挙
    pub fn candidates(&self) -> Vec<ParamSet> {
        let total = self.len();
        let mut out = Vec::with_capacity(total);
        for flat in 0..total {
            let mut rem = flat;
            let mut set = ParamSet::new();
            for (name, values) in self.axes.iter().rev() {
                set.insert(name.clone(), values[rem % values.len()].clone());
                rem /= values.len();
            }
            out.push(set);
        }
        out
    }

    /// 既定の探索範囲（3 x 3 x 3 x 2 = 54 候補）
    pub fn default_mnist() -> Self {
        let mut grid = Self::new();
        let axes: [(&str, Vec<ParamValue>); 4] = [
            (KEY_NEURONS_PER_LAYER, vec![64i64.into(), 128i64.into(), 256i64.into()]),
            (KEY_ACTIVATION_FUNCTION, vec!["relu".into(), "tanh".into(), "sigmoid".into()]),
            (KEY_DROPOUT_RATE, vec![0.2f64.into(), 0.3f64.into(), 0.4f64.into()]),
            (KEY_WEIGHT_DECAY, vec![0.001f64.into(), 0.0001f64.into()]),
        ];
        for (name, values) in axes {
            grid.axes.insert(name.to_string(), values);
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_size_and_uniqueness() {
        let grid = ParamGrid::default_mnist();
        let candidates = grid.candidates();
        assert_eq!(grid.len(), 54);
        assert_eq!(candidates.len(), 54);
        for (i, a) in candidates.iter().enumerate() {
            assert_eq!(a.len(), 4);
            for b in &candidates[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_last_key_varies_fastest() {
        let grid = ParamGrid::default_mnist();
        let c = grid.candidates();
        // keys sorted: activation_function, dropout_rate, neurons_per_layer, weight_decay
        assert_eq!(
            c[0].to_string(),
            "{'activation_function': 'relu', 'dropout_rate': 0.2, 'neurons_per_layer': 64, 'weight_decay': 0.001}"
        );
        assert_eq!(c[1].get(KEY_WEIGHT_DECAY), Some(&ParamValue::Float(0.0001)));
        assert_eq!(c[1].get(KEY_NEURONS_PER_LAYER), Some(&ParamValue::Int(64)));
        assert_eq!(c[2].get(KEY_NEURONS_PER_LAYER), Some(&ParamValue::Int(128)));
        assert_eq!(c[18].get(KEY_ACTIVATION_FUNCTION), Some(&ParamValue::from("tanh")));
        assert_eq!(c[53].get(KEY_ACTIVATION_FUNCTION), Some(&ParamValue::from("sigmoid")));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let mut grid = ParamGrid::new();
        let err = grid.insert(KEY_DROPOUT_RATE, Vec::<f64>::new()).unwrap_err();
        assert_eq!(err, GridError::EmptyValues(KEY_DROPOUT_RATE.to_string()));
    }

    #[test]
    fn test_empty_grid_has_single_empty_candidate() {
        let grid = ParamGrid::new();
        assert_eq!(grid.len(), 1);
        let c = grid.candidates();
        assert_eq!(c.len(), 1);
        assert!(c[0].is_empty());
        assert_eq!(c[0].to_string(), "{}");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ParamValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ParamValue::Float(0.0001).to_string(), "0.0001");
        assert_eq!(ParamValue::Int(256).to_string(), "256");
        assert_eq!(ParamValue::from("tanh").to_string(), "'tanh'");
    }
}
