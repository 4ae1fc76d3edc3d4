//! 層化 k 分割交差検証
//!
//! シャッフルなし。各クラスのサンプルを出現順に k 個の連続した塊へ
//! ほぼ均等に切り分け、k 番目の塊をまとめたものを k 番目の検証集合とする。

use crate::error::SearchError;
use crate::params::NUM_CLASSES;

/// 1 分割分の学習・検証インデックス（どちらも昇順）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Clone, Copy, Debug)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, labels: &[u8]) -> Result<Vec<Fold>, SearchError> {
        let k = self.n_splits;
        let n = labels.len();
        if k < 2 || k > n {
            return Err(SearchError::InvalidSplits {
                n_splits: k,
                n_samples: n,
            });
        }

        let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); NUM_CLASSES];
        for (index, &label) in labels.iter().enumerate() {
            let members = by_class.get_mut(usize::from(label)).ok_or(
                SearchError::LabelOutOfRange {
                    index,
                    label,
                    num_classes: NUM_CLASSES,
                },
            )?;
            members.push(index);
        }
        let largest = by_class.iter().map(Vec::len).max().unwrap_or(0);
        if largest < k {
            return Err(SearchError::ClassesTooSmall { n_splits: k });
        }
        for (class, members) in by_class.iter().enumerate() {
            if !members.is_empty() && members.len() < k {
                log::warn!(
                    "class {class} has only {} members, fewer than n_splits={k}",
                    members.len()
                );
            }
        }

        let mut fold_of = vec![0usize; n];
        for members in &by_class {
            let m = members.len();
            let mut start = 0;
            for fold in 0..k {
                let size = m / k + usize::from(fold < m % k);
                for &i in &members[start..start + size] {
                    fold_of[i] = fold;
                }
                start += size;
            }
        }

        Ok((0..k)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&i| fold_of[i] == fold);
                Fold { train, test }
            })
            .collect())
    }
}
