//! grid_search バイナリの共通部品
//!
//! - `config`: TOML 設定と CLI 上書きの統合
//! - `trial_log`: 試行結果の JSONL ログ

pub mod config;
pub mod trial_log;
