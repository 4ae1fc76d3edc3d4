//! MNIST 分類器のハイパーパラメータをグリッドサーチで探索する
//!
//! 各候補を層化 k 分割交差検証で評価し、最良候補を学習データ全体で
//! 再学習してテストデータの正解率を報告する。
//!
//! ```bash
//! cargo run --release -p tools --bin grid_search -- \
//!   --data-dir data/mnist --config grid.toml --epochs 5 --log-json out/run.jsonl
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use mnist_tune::report::section_order;
use mnist_tune::{
    Classifier, FitRng, GridSearch, LearningRateScheduler, Mnist, ParamSet, SearchReport,
    TrainCallback,
};
use tools::config::{Overrides, RunConfig};
use tools::trial_log::TrialLogger;

#[derive(Parser, Debug)]
#[command(
    name = "grid_search",
    about = "Cross-validated hyperparameter grid search for an MNIST MLP"
)]
struct Cli {
    /// Directory containing the four MNIST IDX files (plain or .gz)
    #[arg(long, default_value = "data/mnist")]
    data_dir: PathBuf,

    /// TOML config with [grid], [schedule], [fit] and [search] tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of cross-validation folds [default: 3]
    #[arg(long)]
    cv: Option<usize>,

    /// Epochs per fit [default: 1]
    #[arg(long)]
    epochs: Option<usize>,

    /// Minibatch size [default: 32]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Random seed [default: 42]
    #[arg(long)]
    seed: Option<u64>,

    /// Initial learning rate of the step-decay schedule [default: 0.001]
    #[arg(long)]
    initial_lr: Option<f32>,

    /// Learning rate multiplier applied every --decay-every epochs [default: 0.1]
    #[arg(long)]
    decay_factor: Option<f32>,

    /// Decay interval in epochs, 0 disables decay [default: 10]
    #[arg(long)]
    decay_every: Option<usize>,

    /// Worker threads (0 = rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Use only the first N training samples
    #[arg(long)]
    train_limit: Option<usize>,

    /// Use only the first N test samples
    #[arg(long)]
    test_limit: Option<usize>,

    /// Write per-trial JSONL records to this path ("-" for stdout)
    #[arg(long)]
    log_json: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            cv: self.cv,
            epochs: self.epochs,
            batch_size: self.batch_size,
            seed: self.seed,
            initial_lr: self.initial_lr,
            decay_factor: self.decay_factor,
            step_epochs: self.decay_every,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = RunConfig::resolve(cli.config.as_deref(), &cli.overrides())?;

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("failed to configure rayon thread pool")?;
    }

    let mut mnist = Mnist::load(&cli.data_dir)
        .with_context(|| format!("failed to load MNIST from {}", cli.data_dir.display()))?;
    if let Some(n) = cli.train_limit {
        mnist.train = mnist.train.take(n);
    }
    if let Some(n) = cli.test_limit {
        mnist.test = mnist.test.take(n);
    }
    log::info!(
        "train={} test={} class_counts={:?}",
        mnist.train.len(),
        mnist.test.len(),
        mnist.train.class_counts()
    );

    let mut trial_log = cli.log_json.as_deref().map(TrialLogger::create).transpose()?;
    if let Some(logger) = trial_log.as_mut() {
        logger.log_meta(
            &config,
            &cli.data_dir.display().to_string(),
            mnist.train.len(),
            mnist.test.len(),
        )?;
    }

    let grid = config.grid();
    log::info!("Searching {} candidates with {}-fold CV", grid.len(), config.search.cv);

    let dim = mnist.train.dim();
    let schedule = config.schedule;
    let search = GridSearch::new(
        move |params: &ParamSet, rng: &mut FitRng| Classifier::from_params(params, dim, rng),
        grid.clone(),
    )
    .cv(config.search.cv)
    .seed(config.search.seed)
    .fit_config(config.fit.clone())
    .callbacks(move || {
        vec![Box::new(LearningRateScheduler::new(move |epoch| schedule.lr_at(epoch)))
            as Box<dyn TrainCallback>]
    })
    .progress(!cli.no_progress);

    let start = Instant::now();
    let outcome = search.fit(&mnist.train).context("grid search failed")?;
    let test_accuracy = outcome.score(&mnist.test);
    let elapsed = start.elapsed().as_secs_f64();
    log::info!("Search finished in {elapsed:.1}s");

    let results = outcome.results();
    let report = SearchReport {
        best_score: outcome.best_score,
        best_params: outcome.best_params.clone(),
        sections: section_order(Some(&grid), &results),
        results,
        test_accuracy,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    report.write_to(&mut out)?;
    out.flush()?;
    drop(out);

    if let Some(logger) = trial_log.as_mut() {
        logger.log_trials(&outcome)?;
        logger.log_summary(&outcome, test_accuracy, elapsed)?;
        logger.flush()?;
    }

    Ok(())
}
