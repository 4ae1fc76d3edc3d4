//! 実行設定
//!
//! TOML ファイル（任意）を読み込み、CLI で指定された値で上書きする。
//!
//! ```toml
//! [grid]
//! neurons_per_layer = [64, 128]
//! activation_function = ["relu", "tanh"]
//!
//! [schedule]
//! initial_lr = 0.001
//! decay_factor = 0.1
//! step_epochs = 10
//!
//! [fit]
//! epochs = 1
//! batch_size = 32
//!
//! [search]
//! cv = 3
//! seed = 42
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use mnist_tune::params::{DEFAULT_CV_FOLDS, DEFAULT_SEED};
use mnist_tune::{FitConfig, ParamGrid, StepDecay};
use serde::{Deserialize, Serialize};

/// `[search]` テーブル
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSettings {
    /// 交差検証の分割数
    pub cv: usize,
    pub seed: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cv: DEFAULT_CV_FOLDS,
            seed: DEFAULT_SEED,
        }
    }
}

/// 設定ファイル全体
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// 省略時は既定の 54 候補
    pub grid: Option<ParamGrid>,
    pub schedule: StepDecay,
    pub fit: FitConfig,
    pub search: SearchSettings,
}

/// CLI から渡される上書き値（None は設定ファイルの値を使う）
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub cv: Option<usize>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
    pub initial_lr: Option<f32>,
    pub decay_factor: Option<f32>,
    pub step_epochs: Option<usize>,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid config")?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// 設定ファイル（任意）を読み、上書きを適用して検証する
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, o: &Overrides) {
        if let Some(v) = o.cv {
            self.search.cv = v;
        }
        if let Some(v) = o.seed {
            self.search.seed = v;
        }
        if let Some(v) = o.epochs {
            self.fit.epochs = v;
        }
        if let Some(v) = o.batch_size {
            self.fit.batch_size = v;
        }
        if let Some(v) = o.initial_lr {
            self.schedule.initial_lr = v;
        }
        if let Some(v) = o.decay_factor {
            self.schedule.decay_factor = v;
        }
        if let Some(v) = o.step_epochs {
            self.schedule.step_epochs = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.cv < 2 {
            bail!("cv must be >= 2 (got {})", self.search.cv);
        }
        if self.fit.batch_size == 0 {
            bail!("batch_size must be >= 1");
        }
        let StepDecay {
            initial_lr,
            decay_factor,
            ..
        } = self.schedule;
        if initial_lr.is_nan() || initial_lr <= 0.0 {
            bail!("initial_lr must be positive (got {initial_lr})");
        }
        if decay_factor.is_nan() || decay_factor <= 0.0 || decay_factor > 1.0 {
            bail!("decay_factor must be in (0, 1] (got {decay_factor})");
        }
        if let Some(grid) = &self.grid {
            grid.validate()?;
        }
        Ok(())
    }

    /// 探索対象のグリッド
    pub fn grid(&self) -> ParamGrid {
        self.grid.clone().unwrap_or_else(ParamGrid::default_mnist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnist_tune::ParamValue;

    #[test]
    fn test_defaults_without_file() {
        let config = RunConfig::resolve(None, &Overrides::default()).unwrap();
        assert_eq!(config.search.cv, 3);
        assert_eq!(config.search.seed, 42);
        assert_eq!(config.fit.epochs, 1);
        assert_eq!(config.fit.batch_size, 32);
        assert_eq!(config.schedule, StepDecay::default());
        assert_eq!(config.grid().len(), 54);
    }

    #[test]
    fn test_parse_toml() {
        let config = RunConfig::from_toml_str(
            r#"
            [grid]
            neurons_per_layer = [16, 32]
            activation_function = ["tanh"]
            dropout_rate = [0.1]

            [fit]
            epochs = 3

            [search]
            cv = 4
            "#,
        )
        .unwrap();
        let grid = config.grid();
        assert_eq!(grid.len(), 2);
        assert_eq!(
            grid.values("neurons_per_layer").unwrap(),
            &[ParamValue::Int(16), ParamValue::Int(32)]
        );
        assert_eq!(grid.values("dropout_rate").unwrap(), &[ParamValue::Float(0.1)]);
        assert_eq!(config.fit.epochs, 3);
        assert_eq!(config.fit.batch_size, 32);
        assert_eq!(config.search.cv, 4);
        assert_eq!(config.search.seed, 42);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(RunConfig::from_toml_str("[fit]\nepoch = 3\n").is_err());
        assert!(RunConfig::from_toml_str("[model]\nx = 1\n").is_err());
    }

    #[test]
    fn test_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[fit]\nepochs = 5\nbatch_size = 8\n").unwrap();
        let overrides = Overrides {
            epochs: Some(2),
            seed: Some(7),
            step_epochs: Some(3),
            ..Overrides::default()
        };
        let config = RunConfig::resolve(Some(&path), &overrides).unwrap();
        assert_eq!(config.fit.epochs, 2);
        assert_eq!(config.fit.batch_size, 8);
        assert_eq!(config.search.seed, 7);
        assert_eq!(config.schedule.step_epochs, 3);
    }

    #[test]
    fn test_validation() {
        let bad_cv = Overrides {
            cv: Some(1),
            ..Overrides::default()
        };
        assert!(RunConfig::resolve(None, &bad_cv).is_err());

        let empty_axis = RunConfig::from_toml_str("[grid]\nneurons_per_layer = []\n").unwrap();
        assert!(empty_axis.validate().is_err());
    }
}
