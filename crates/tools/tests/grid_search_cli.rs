use assert_cmd::prelude::*;
use mnist_tune::dataset::{encode_idx_images, encode_idx_labels};
use mnist_tune::params::{TEST_IMAGES_FILE, TEST_LABELS_FILE, TRAIN_IMAGES_FILE, TRAIN_LABELS_FILE};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// 2x2 画像。偶数番目はクラス 0（左列）、奇数番目はクラス 1（右列）
fn write_split(dir: &Path, images: &str, labels: &str, n: usize) {
    let mut pixels = Vec::new();
    let mut ys = Vec::new();
    for i in 0..n {
        let y = (i % 2) as u8;
        let row: [u8; 4] = if y == 0 { [255, 0, 255, 0] } else { [0, 255, 0, 255] };
        pixels.extend_from_slice(&row);
        ys.push(y);
    }
    fs::write(dir.join(images), encode_idx_images(&pixels, n, 2, 2)).expect("write images");
    fs::write(dir.join(labels), encode_idx_labels(&ys)).expect("write labels");
}

fn make_dataset(tmp: &TempDir) -> std::path::PathBuf {
    let dir = tmp.path().join("mnist");
    fs::create_dir_all(&dir).unwrap();
    write_split(&dir, TRAIN_IMAGES_FILE, TRAIN_LABELS_FILE, 24);
    write_split(&dir, TEST_IMAGES_FILE, TEST_LABELS_FILE, 8);
    dir
}

fn grid_search() -> Command {
    Command::cargo_bin("grid_search").expect("binary exists")
}

#[test]
fn help_lists_flags() {
    grid_search()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--data-dir"))
        .stdout(predicate::str::contains("--log-json"));
}

#[test]
fn unknown_flag_is_usage_error() {
    grid_search().arg("--no-such-flag").assert().code(2);
}

#[test]
fn missing_data_dir_fails() {
    let tmp = TempDir::new().unwrap();
    let absent = tmp.path().join("absent").to_string_lossy().into_owned();
    grid_search()
        .args(["--data-dir", absent.as_str(), "--no-progress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load MNIST"));
}

#[test]
fn end_to_end_report_and_json_log() {
    let tmp = TempDir::new().unwrap();
    let data_dir = make_dataset(&tmp);
    let config = tmp.path().join("grid.toml");
    fs::write(
        &config,
        r#"
[grid]
neurons_per_layer = [8]
activation_function = ["relu", "tanh"]
dropout_rate = [0.0]

[schedule]
initial_lr = 0.05
"#,
    )
    .unwrap();
    let log = tmp.path().join("out/run.jsonl");
    let data_dir = data_dir.to_string_lossy().into_owned();
    let config = config.to_string_lossy().into_owned();
    let log_path = log.to_string_lossy().into_owned();

    grid_search()
        .args([
            "--data-dir",
            data_dir.as_str(),
            "--config",
            config.as_str(),
            "--epochs",
            "5",
            "--batch-size",
            "4",
            "--threads",
            "2",
            "--log-json",
            log_path.as_str(),
            "--no-progress",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Overall Results:\nBest: "))
        .stdout(predicate::str::contains("Results for Relu activation:"))
        .stdout(predicate::str::contains("Results for Tanh activation:"))
        .stdout(predicate::str::contains("Test accuracy of the best model: "));

    let text = fs::read_to_string(&log).expect("trial log exists");
    let kinds: Vec<String> = text
        .lines()
        .map(|line| {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            v["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["meta", "trial", "trial", "summary"]);
}
