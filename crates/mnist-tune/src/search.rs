//! 交差検証付きグリッドサーチ
//!
//! 全候補 x 全分割の学習・評価を rayon で並列に実行し、分割ごとの正解率から
//! 平均・標準偏差・順位を求める。最良候補は学習データ全体で再学習する。

use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::callbacks::TrainCallback;
use crate::cv::{Fold, StratifiedKFold};
use crate::dataset::Dataset;
use crate::error::{ModelError, SearchError};
use crate::grid::{ParamGrid, ParamSet};
use crate::model::Classifier;
use crate::params::{DEFAULT_CV_FOLDS, DEFAULT_SEED};
use crate::report::{TrialResult, zip_results};
use crate::trainer::{FitConfig, Trainer};

/// 1 回の学習に渡す乱数生成器
pub type FitRng = rand_chacha::ChaCha8Rng;

type CallbackFactory = Box<dyn Fn() -> Vec<Box<dyn TrainCallback>> + Send + Sync>;

/// 候補ごとの交差検証結果（添字は候補番号で揃っている）
#[derive(Clone, Debug, Default, Serialize)]
pub struct CvResults {
    pub params: Vec<ParamSet>,
    /// [候補][分割]
    pub split_test_scores: Vec<Vec<f64>>,
    pub mean_test_score: Vec<f64>,
    pub std_test_score: Vec<f64>,
    /// 1 始まり。同点は小さい方の順位を共有する
    pub rank_test_score: Vec<usize>,
}

impl CvResults {
    fn from_split_scores(params: Vec<ParamSet>, split_test_scores: Vec<Vec<f64>>) -> Self {
        let mean_test_score: Vec<f64> = split_test_scores.iter().map(|s| mean(s)).collect();
        let std_test_score = split_test_scores.iter().map(|s| std_dev(s)).collect();
        let rank_test_score = rank_min(&mean_test_score);
        Self {
            params,
            split_test_scores,
            mean_test_score,
            std_test_score,
            rank_test_score,
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// 平均スコア最大の候補（同点なら先頭）
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &m) in self.mean_test_score.iter().enumerate() {
            if best.is_none_or(|b| m > self.mean_test_score[b]) {
                best = Some(i);
            }
        }
        best
    }

    /// (mean, std, params) の組に変換する
    pub fn trial_results(&self) -> Vec<TrialResult> {
        zip_results(&self.mean_test_score, &self.std_test_score, &self.params)
    }
}

/// グリッドサーチの結果
#[derive(Debug)]
pub struct SearchOutcome {
    pub best_index: usize,
    pub best_score: f64,
    pub best_params: ParamSet,
    pub cv_results: CvResults,
    /// 最良候補を学習データ全体で再学習したモデル
    pub best_model: Classifier,
}

impl SearchOutcome {
    /// 再学習済みモデルの正解率
    pub fn score(&self, data: &Dataset) -> f64 {
        self.best_model.score(data)
    }

    pub fn results(&self) -> Vec<TrialResult> {
        self.cv_results.trial_results()
    }
}

/// 交差検証付きグリッドサーチ
pub struct GridSearch<F> {
    factory: F,
    grid: ParamGrid,
    cv: usize,
    fit_config: FitConfig,
    seed: u64,
    callbacks: CallbackFactory,
    show_progress: bool,
}

impl<F> GridSearch<F>
where
    F: Fn(&ParamSet, &mut FitRng) -> Result<Classifier, ModelError> + Sync,
{
    /// `factory` は候補パラメータから未学習のモデルを作る
    pub fn new(factory: F, grid: ParamGrid) -> Self {
        Self {
            factory,
            grid,
            cv: DEFAULT_CV_FOLDS,
            fit_config: FitConfig::default(),
            seed: DEFAULT_SEED,
            callbacks: Box::new(Vec::new),
            show_progress: false,
        }
    }

    pub fn cv(mut self, n_splits: usize) -> Self {
        self.cv = n_splits;
        self
    }

    pub fn fit_config(mut self, config: FitConfig) -> Self {
        self.fit_config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 学習 1 回ごとに新しいコールバック列を作る関数を登録
    pub fn callbacks<C>(mut self, make: C) -> Self
    where
        C: Fn() -> Vec<Box<dyn TrainCallback>> + Send + Sync + 'static,
    {
        self.callbacks = Box::new(make);
        self
    }

    pub fn progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// 全候補を交差検証で評価し、最良候補を再学習する
    pub fn fit(&self, train: &Dataset) -> Result<SearchOutcome, SearchError> {
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(SearchError::EmptyGrid);
        }
        let folds = StratifiedKFold::new(self.cv).split(train.labels())?;
        let n_folds = folds.len();

        let jobs: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();
        log::info!(
            "Fitting {} folds for each of {} candidates, totalling {} fits",
            n_folds,
            candidates.len(),
            jobs.len()
        );

        let progress = self.progress_bar(jobs.len() as u64);
        let scores = jobs
            .par_iter()
            .enumerate()
            .map(|(job, &(ci, fi))| {
                let score = self.fit_and_score(
                    job as u64,
                    &candidates[ci],
                    &folds[fi],
                    train,
                )?;
                log::info!(
                    "[CV {}/{}] END {} ; score={:.3}",
                    fi + 1,
                    n_folds,
                    candidates[ci],
                    score
                );
                progress.inc(1);
                Ok(score)
            })
            .collect::<Result<Vec<f64>, SearchError>>()?;
        progress.finish_and_clear();

        let split_test_scores: Vec<Vec<f64>> =
            scores.chunks(n_folds).map(<[f64]>::to_vec).collect();
        let cv_results = CvResults::from_split_scores(candidates, split_test_scores);
        let best_index = cv_results.best_index().ok_or(SearchError::EmptyGrid)?;
        let best_params = cv_results.params[best_index].clone();
        let best_score = cv_results.mean_test_score[best_index];
        log::info!("Best candidate #{best_index}: {best_score:.6} using {best_params}");

        // 再学習には全分割ジョブの後ろのストリームを使う
        let mut rng = fit_rng(self.seed, jobs.len() as u64);
        let mut best_model = self.build(&best_params, &mut rng)?;
        let mut trainer = Trainer::new(self.fit_config.clone(), &best_model, rng)
            .with_callbacks((self.callbacks)());
        trainer.train_all(&mut best_model, train)?;
        log::info!("Refitted best candidate on {} samples", train.len());

        Ok(SearchOutcome {
            best_index,
            best_score,
            best_params,
            cv_results,
            best_model,
        })
    }

    fn build(&self, params: &ParamSet, rng: &mut FitRng) -> Result<Classifier, SearchError> {
        (self.factory)(params, rng).map_err(|source| SearchError::Factory {
            params: params.to_string(),
            source,
        })
    }

    fn fit_and_score(
        &self,
        stream: u64,
        params: &ParamSet,
        fold: &Fold,
        data: &Dataset,
    ) -> Result<f64, SearchError> {
        let mut rng = fit_rng(self.seed, stream);
        let mut model = self.build(params, &mut rng)?;
        let mut trainer =
            Trainer::new(self.fit_config.clone(), &model, rng).with_callbacks((self.callbacks)());
        trainer.train(&mut model, data, &fold.train)?;
        Ok(model.score_on(data, &fold.test))
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} fits (eta {eta})")
        {
            progress.set_style(style);
        }
        progress
    }
}

/// 同じシードから学習ごとに独立したストリームを切り出す
fn fit_rng(seed: u64, stream: u64) -> FitRng {
    let mut rng = FitRng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 母標準偏差
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// 降順の順位（同点は最小順位）
fn rank_min(scores: &[f64]) -> Vec<usize> {
    scores
        .iter()
        .map(|&s| 1 + scores.iter().filter(|&&o| o > s).count())
        .collect()
}
