//! 試行結果の JSONL ログ
//!
//! 1 行 1 レコード。先頭に実行設定 (`meta`)、候補ごとに `trial`、最後に
//! `summary` を書く。

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use mnist_tune::{ParamSet, SearchOutcome};
use serde::Serialize;

use crate::config::RunConfig;

#[derive(Serialize)]
struct MetaLogEntry<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: String,
    data_dir: &'a str,
    train_samples: usize,
    test_samples: usize,
    candidates: usize,
    config: &'a RunConfig,
}

#[derive(Serialize)]
struct TrialLogEntry<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    index: usize,
    rank: usize,
    mean_test_score: f64,
    std_test_score: f64,
    split_test_scores: &'a [f64],
    params: &'a ParamSet,
}

#[derive(Serialize)]
struct SummaryLogEntry<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: String,
    best_index: usize,
    best_score: f64,
    best_params: &'a ParamSet,
    test_accuracy: f64,
    elapsed_sec: f64,
}

/// JSONL の書き出し先
pub struct TrialLogger {
    writer: Box<dyn Write>,
}

impl TrialLogger {
    /// `-` は標準出力
    pub fn create(path: &Path) -> Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(Self::from_writer(Box::new(io::stdout())));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create trial log {}", path.display()))?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn from_writer(writer: Box<dyn Write>) -> Self {
        Self {
            writer: Box::new(BufWriter::new(writer)),
        }
    }

    fn write_json(&mut self, value: &impl Serialize) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn log_meta(
        &mut self,
        config: &RunConfig,
        data_dir: &str,
        train_samples: usize,
        test_samples: usize,
    ) -> Result<()> {
        self.write_json(&MetaLogEntry {
            kind: "meta",
            timestamp: Local::now().to_rfc3339(),
            data_dir,
            train_samples,
            test_samples,
            candidates: config.grid().len(),
            config,
        })
    }

    /// 候補ごとの結果（候補番号順）
    pub fn log_trials(&mut self, outcome: &SearchOutcome) -> Result<()> {
        let cv = &outcome.cv_results;
        for index in 0..cv.len() {
            self.write_json(&TrialLogEntry {
                kind: "trial",
                index,
                rank: cv.rank_test_score[index],
                mean_test_score: cv.mean_test_score[index],
                std_test_score: cv.std_test_score[index],
                split_test_scores: &cv.split_test_scores[index],
                params: &cv.params[index],
            })?;
        }
        Ok(())
    }

    pub fn log_summary(
        &mut self,
        outcome: &SearchOutcome,
        test_accuracy: f64,
        elapsed_sec: f64,
    ) -> Result<()> {
        self.write_json(&SummaryLogEntry {
            kind: "summary",
            timestamp: Local::now().to_rfc3339(),
            best_index: outcome.best_index,
            best_score: outcome.best_score,
            best_params: &outcome.best_params,
            test_accuracy,
            elapsed_sec,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
