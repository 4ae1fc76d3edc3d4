//! 探索結果の集計とコンソール出力

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::grid::{ParamGrid, ParamSet, ParamValue};
use crate::params::KEY_ACTIVATION_FUNCTION;

/// 1 候補分の交差検証結果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrialResult {
    pub mean_score: f64,
    pub std_score: f64,
    pub params: ParamSet,
}

impl TrialResult {
    /// 活性化関数の値（文字列でなければ None）
    pub fn activation(&self) -> Option<&str> {
        self.params
            .get(KEY_ACTIVATION_FUNCTION)
            .and_then(ParamValue::as_str)
    }
}

impl fmt::Display for TrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6} ({:.6}) with: {}",
            self.mean_score, self.std_score, self.params
        )
    }
}

/// 添字の揃った 3 列を TrialResult の列にまとめる
pub fn zip_results(means: &[f64], stds: &[f64], params: &[ParamSet]) -> Vec<TrialResult> {
    debug_assert_eq!(means.len(), stds.len());
    debug_assert_eq!(means.len(), params.len());
    means
        .iter()
        .zip(stds)
        .zip(params)
        .map(|((&mean_score, &std_score), params)| TrialResult {
            mean_score,
            std_score,
            params: params.clone(),
        })
        .collect()
}

/// 活性化関数が `target` に一致する結果を元の順序のまま取り出す
pub fn filter_by_activation<'a>(results: &'a [TrialResult], target: &str) -> Vec<&'a TrialResult> {
    results
        .iter()
        .filter(|r| r.activation() == Some(target))
        .collect()
}

/// 出現順で重複なしの活性化関数一覧
pub fn distinct_activations(results: &[TrialResult]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for name in results.iter().filter_map(TrialResult::activation) {
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

/// `order` の順に活性化関数ごとの結果をまとめる
pub fn group_by_activation<'a, S: AsRef<str>>(
    results: &'a [TrialResult],
    order: &[S],
) -> Vec<(String, Vec<&'a TrialResult>)> {
    order
        .iter()
        .map(|name| {
            let name = name.as_ref();
            (name.to_string(), filter_by_activation(results, name))
        })
        .collect()
}

/// 先頭 1 文字を大文字、残りを小文字にする（"TANH" -> "Tanh"）
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

/// セクションの並び。グリッドに並んだ順を優先し、なければ出現順
pub fn section_order(grid: Option<&ParamGrid>, results: &[TrialResult]) -> Vec<String> {
    let from_grid: Option<Vec<String>> = grid
        .and_then(|g| g.values(KEY_ACTIVATION_FUNCTION))
        .map(|values| {
            values
                .iter()
                .filter_map(ParamValue::as_str)
                .map(str::to_string)
                .collect()
        });
    match from_grid {
        Some(order) if !order.is_empty() => order,
        _ => distinct_activations(results),
    }
}

/// コンソールに出すレポート一式
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub best_score: f64,
    pub best_params: ParamSet,
    pub results: Vec<TrialResult>,
    pub sections: Vec<String>,
    pub test_accuracy: f64,
}

impl SearchReport {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Overall Results:")?;
        writeln!(out, "Best: {:.6} using {}", self.best_score, self.best_params)?;
        for r in &self.results {
            writeln!(out, "{r}")?;
        }
        for (name, group) in group_by_activation(&self.results, &self.sections) {
            writeln!(out)?;
            writeln!(out, "Results for {} activation:", capitalize(&name))?;
            for r in group {
                writeln!(out, "{r}")?;
            }
        }
        writeln!(out)?;
        writeln!(out, "Test accuracy of the best model: {}", self.test_accuracy)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(mean: f64, activation: &str, neurons: i64) -> TrialResult {
        let mut params = ParamSet::new();
        params.insert(KEY_ACTIVATION_FUNCTION, activation);
        params.insert("neurons_per_layer", neurons);
        TrialResult {
            mean_score: mean,
            std_score: 0.01,
            params,
        }
    }

    fn sample() -> Vec<TrialResult> {
        vec![
            result(0.91, "relu", 64),
            result(0.88, "tanh", 64),
            result(0.93, "relu", 128),
            result(0.80, "sigmoid", 64),
            result(0.89, "tanh", 128),
        ]
    }

    #[test]
    fn test_filter_missing_value_is_empty() {
        let results = sample();
        assert!(filter_by_activation(&results, "elu").is_empty());
        assert!(filter_by_activation(&[], "relu").is_empty());
    }

    #[test]
    fn test_filter_preserves_order() {
        let results = sample();
        let relu = filter_by_activation(&results, "relu");
        assert_eq!(relu, vec![&results[0], &results[2]]);
    }

    #[test]
    fn test_groups_reconstruct_input() {
        let results = sample();
        let order = distinct_activations(&results);
        assert_eq!(order, vec!["relu", "tanh", "sigmoid"]);

        let groups = group_by_activation(&results, &order);
        let total: usize = groups.iter().map(|(_, g)| g.len()).sum();
        assert_eq!(total, results.len());
        for r in &results {
            let hits = groups
                .iter()
                .flat_map(|(_, g)| g.iter())
                .filter(|g| std::ptr::eq(**g, r))
                .count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn test_zip_results() {
        let params = vec![ParamSet::new(), ParamSet::new()];
        let zipped = zip_results(&[0.5, 0.6], &[0.1, 0.2], &params);
        assert_eq!(zipped.len(), 2);
        assert_eq!(zipped[1].mean_score, 0.6);
        assert_eq!(zipped[1].std_score, 0.2);
    }

    #[test]
    fn test_trial_line_format() {
        let r = result(0.9123456789, "relu", 64);
        assert_eq!(
            r.to_string(),
            "0.912346 (0.010000) with: {'activation_function': 'relu', 'neurons_per_layer': 64}"
        );
        assert_eq!(capitalize("sigmoid"), "Sigmoid");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("TANH"), "Tanh");
        assert_eq!(capitalize("reLU"), "Relu");
    }

    #[test]
    fn test_section_order_follows_grid() {
        let results = sample();
        let mut grid = ParamGrid::new();
        grid.insert(KEY_ACTIVATION_FUNCTION, ["sigmoid", "relu"]).unwrap();
        assert_eq!(section_order(Some(&grid), &results), vec!["sigmoid", "relu"]);
        assert_eq!(section_order(None, &results), vec!["relu", "tanh", "sigmoid"]);
    }

    #[test]
    fn test_write_report() {
        let results = sample();
        let report = SearchReport {
            best_score: 0.93,
            best_params: results[2].params.clone(),
            sections: vec!["relu".into(), "elu".into()],
            results,
            test_accuracy: 0.95,
        };
        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Overall Results:");
        assert_eq!(
            lines[1],
            "Best: 0.930000 using {'activation_function': 'relu', 'neurons_per_layer': 128}"
        );
        assert_eq!(lines[7], "");
        assert_eq!(lines[8], "Results for Relu activation:");
        assert!(lines[9].starts_with("0.910000 (0.010000)"));
        assert!(lines[10].starts_with("0.930000 (0.010000)"));
        // 該当なしのセクションは見出しだけ
        assert_eq!(lines[12], "Results for Elu activation:");
        assert_eq!(lines[14], "Test accuracy of the best model: 0.95");
    }
}
