//! MNIST データセット
//!
//! IDX 形式（非圧縮 / gzip）の画像・ラベルを読み込み、画素を [0, 1] に
//! 正規化して 1 行 = 1 画像のフラットな特徴量にする。

use std::path::Path;

use crate::error::DatasetError;
use crate::io::{read_all, resolve_plain_or_gz};
use crate::params::{
    IDX_IMAGES_HEADER_BYTES, IDX_IMAGES_MAGIC, IDX_LABELS_HEADER_BYTES, IDX_LABELS_MAGIC,
    NUM_CLASSES, PIXEL_SCALE, TEST_IMAGES_FILE, TEST_LABELS_FILE, TRAIN_IMAGES_FILE,
    TRAIN_LABELS_FILE,
};

/// 特徴量（行優先）とラベルの組
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    features: Vec<f32>,
    labels: Vec<u8>,
    dim: usize,
}

impl Dataset {
    pub fn new(features: Vec<f32>, labels: Vec<u8>, dim: usize) -> Result<Self, DatasetError> {
        if dim == 0 || features.len() % dim != 0 {
            return Err(DatasetError::RaggedFeatures {
                len: features.len(),
                dim,
            });
        }
        let rows = features.len() / dim;
        if rows != labels.len() {
            return Err(DatasetError::CountMismatch {
                images: rows,
                labels: labels.len(),
            });
        }
        if let Some((index, &label)) =
            labels.iter().enumerate().find(|&(_, &l)| usize::from(l) >= NUM_CLASSES)
        {
            return Err(DatasetError::LabelOutOfRange {
                index,
                label,
                num_classes: NUM_CLASSES,
            });
        }
        Ok(Self {
            features,
            labels,
            dim,
        })
    }

    /// サンプル数
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 1 サンプルの特徴量次元
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn label(&self, i: usize) -> u8 {
        self.labels[i]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.features[i * self.dim..(i + 1) * self.dim]
    }

    /// 指定インデックスのサンプルだけを取り出した新しいデータセット
    pub fn subset(&self, indices: &[usize]) -> Self {
        let mut features = Vec::with_capacity(indices.len() * self.dim);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            features.extend_from_slice(self.row(i));
            labels.push(self.labels[i]);
        }
        Self {
            features,
            labels,
            dim: self.dim,
        }
    }

    /// 先頭 n 件（n がサンプル数以上なら全件）
    pub fn take(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            features: self.features[..n * self.dim].to_vec(),
            labels: self.labels[..n].to_vec(),
            dim: self.dim,
        }
    }

    /// クラスごとのサンプル数
    pub fn class_counts(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for &l in &self.labels {
            counts[usize::from(l)] += 1;
        }
        counts
    }
}

/// 学習用・テスト用の組
#[derive(Clone, Debug)]
pub struct Mnist {
    pub train: Dataset,
    pub test: Dataset,
}

impl Mnist {
    /// ディレクトリから標準ファイル名（`.gz` 可）の 4 ファイルを読み込む
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let train = load_split(dir, TRAIN_IMAGES_FILE, TRAIN_LABELS_FILE)?;
        let test = load_split(dir, TEST_IMAGES_FILE, TEST_LABELS_FILE)?;
        log::info!(
            "Loaded MNIST from {}: train={} test={} dim={}",
            dir.display(),
            train.len(),
            test.len(),
            train.dim()
        );
        Ok(Self { train, test })
    }
}

fn load_split(dir: &Path, images_stem: &str, labels_stem: &str) -> Result<Dataset, DatasetError> {
    let images_path = resolve_plain_or_gz(dir, images_stem)
        .ok_or_else(|| DatasetError::NotFound(dir.join(images_stem)))?;
    let labels_path = resolve_plain_or_gz(dir, labels_stem)
        .ok_or_else(|| DatasetError::NotFound(dir.join(labels_stem)))?;

    let image_bytes = read_all(&images_path).map_err(|source| DatasetError::Io {
        path: images_path.clone(),
        source,
    })?;
    let label_bytes = read_all(&labels_path).map_err(|source| DatasetError::Io {
        path: labels_path.clone(),
        source,
    })?;

    let (features, dim) = parse_idx_images(&image_bytes, &images_path.display().to_string())?;
    let labels = parse_idx_labels(&label_bytes, &labels_path.display().to_string())?;
    Dataset::new(features, labels, dim)
}

fn read_be_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn check_header(
    buf: &[u8],
    header_bytes: usize,
    magic: u32,
    source_name: &str,
) -> Result<(), DatasetError> {
    if buf.len() < header_bytes {
        return Err(DatasetError::Truncated {
            source_name: source_name.to_string(),
            needed: header_bytes,
            available: buf.len(),
        });
    }
    let found = read_be_u32(buf, 0).unwrap_or_default();
    if found != magic {
        return Err(DatasetError::BadMagic {
            source_name: source_name.to_string(),
            expected: magic,
            found,
        });
    }
    Ok(())
}

/// IDX 画像を正規化済みのフラットな特徴量に変換する。戻り値は (特徴量, 行幅)
pub fn parse_idx_images(buf: &[u8], source_name: &str) -> Result<(Vec<f32>, usize), DatasetError> {
    check_header(buf, IDX_IMAGES_HEADER_BYTES, IDX_IMAGES_MAGIC, source_name)?;
    let count = read_be_u32(buf, 4).unwrap_or_default() as usize;
    let rows = read_be_u32(buf, 8).unwrap_or_default() as usize;
    let cols = read_be_u32(buf, 12).unwrap_or_default() as usize;
    // ヘッダ値は信用しない。桁あふれは不足扱い
    let sizes = rows.checked_mul(cols).and_then(|dim| {
        let needed = count.checked_mul(dim)?.checked_add(IDX_IMAGES_HEADER_BYTES)?;
        Some((dim, needed))
    });
    let Some((dim, needed)) = sizes else {
        return Err(DatasetError::Truncated {
            source_name: source_name.to_string(),
            needed: usize::MAX,
            available: buf.len(),
        });
    };
    if buf.len() < needed {
        return Err(DatasetError::Truncated {
            source_name: source_name.to_string(),
            needed,
            available: buf.len(),
        });
    }

    let features = buf[IDX_IMAGES_HEADER_BYTES..needed]
        .iter()
        .map(|&px| f32::from(px) / PIXEL_SCALE)
        .collect();
    Ok((features, dim))
}

/// IDX ラベルを読み込む
pub fn parse_idx_labels(buf: &[u8], source_name: &str) -> Result<Vec<u8>, DatasetError> {
    check_header(buf, IDX_LABELS_HEADER_BYTES, IDX_LABELS_MAGIC, source_name)?;
    let count = read_be_u32(buf, 4).unwrap_or_default() as usize;
    let needed = count.saturating_add(IDX_LABELS_HEADER_BYTES);
    if buf.len() < needed {
        return Err(DatasetError::Truncated {
            source_name: source_name.to_string(),
            needed,
            available: buf.len(),
        });
    }
    Ok(buf[IDX_LABELS_HEADER_BYTES..needed].to_vec())
}

/// IDX 画像ファイルのバイト列を組み立てる（テスト・ツール用）
pub fn encode_idx_images(pixels: &[u8], count: usize, rows: usize, cols: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(IDX_IMAGES_HEADER_BYTES + pixels.len());
    out.extend_from_slice(&IDX_IMAGES_MAGIC.to_be_bytes());
    for v in [count, rows, cols] {
        out.extend_from_slice(&(v as u32).to_be_bytes());
    }
    out.extend_from_slice(pixels);
    out
}

/// IDX ラベルファイルのバイト列を組み立てる（テスト・ツール用）
pub fn encode_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(IDX_LABELS_HEADER_BYTES + labels.len());
    out.extend_from_slice(&IDX_LABELS_MAGIC.to_be_bytes());
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_images_normalizes_and_flattens() {
        let bytes = encode_idx_images(&[0, 255, 51, 102, 0, 0, 0, 255], 2, 2, 2);
        let (features, dim) = parse_idx_images(&bytes, "mem").unwrap();
        assert_eq!(dim, 4);
        assert_eq!(features.len(), 8);
        assert_eq!(features[0], 0.0);
        assert_eq!(features[1], 1.0);
        assert!((features[2] - 0.2).abs() < 1e-6);
        assert!((features[3] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_labels() {
        let bytes = encode_idx_labels(&[7, 2, 1]);
        assert_eq!(parse_idx_labels(&bytes, "mem").unwrap(), vec![7, 2, 1]);
    }

    #[test]
    fn test_bad_magic() {
        let bytes = encode_idx_labels(&[1]);
        let err = parse_idx_images(&bytes, "labels-as-images").unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Truncated { .. } | DatasetError::BadMagic { .. }
        ));

        let mut bytes = encode_idx_images(&[0; 4], 1, 2, 2);
        bytes[3] = 0x01;
        let err = parse_idx_images(&bytes, "mem").unwrap_err();
        assert!(matches!(err, DatasetError::BadMagic { found: 0x0801, .. }));
    }

    #[test]
    fn test_oversized_header_counts_are_truncation() {
        let mut bytes = IDX_IMAGES_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF; 12]);
        bytes.extend_from_slice(&[0; 8]);
        let err = parse_idx_images(&bytes, "mem").unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Truncated {
                available: 24,
                ..
            }
        ));

        let mut bytes = IDX_LABELS_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF; 4]);
        let err = parse_idx_labels(&bytes, "mem").unwrap_err();
        assert!(matches!(err, DatasetError::Truncated { available: 8, .. }));
    }

    #[test]
    fn test_truncated_payload() {
        let mut bytes = encode_idx_images(&[0; 8], 2, 2, 2);
        bytes.truncate(bytes.len() - 1);
        let err = parse_idx_images(&bytes, "mem").unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Truncated {
                needed: 24,
                available: 23,
                ..
            }
        ));
    }

    #[test]
    fn test_dataset_validation() {
        assert!(matches!(
            Dataset::new(vec![0.0; 5], vec![0, 1], 2),
            Err(DatasetError::RaggedFeatures { .. })
        ));
        assert!(matches!(
            Dataset::new(vec![0.0; 6], vec![0, 1], 2),
            Err(DatasetError::CountMismatch {
                images: 3,
                labels: 2
            })
        ));
        assert!(matches!(
            Dataset::new(vec![0.0; 4], vec![0, 10], 2),
            Err(DatasetError::LabelOutOfRange { index: 1, label: 10, .. })
        ));
    }

    #[test]
    fn test_subset_take_and_counts() {
        let ds = Dataset::new(vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1], vec![3, 4, 3], 2).unwrap();
        let sub = ds.subset(&[2, 0]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.row(0), &[2.0, 2.1]);
        assert_eq!(sub.labels(), &[3, 3]);

        let head = ds.take(10);
        assert_eq!(head, ds);
        assert_eq!(ds.take(1).labels(), &[3]);

        let counts = ds.class_counts();
        assert_eq!(counts[3], 2);
        assert_eq!(counts[4], 1);
    }

    #[test]
    fn test_load_from_directory_with_gz() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let write_gz = |name: &str, bytes: &[u8]| {
            let f = std::fs::File::create(dir.path().join(format!("{name}.gz"))).unwrap();
            let mut enc = GzEncoder::new(f, Compression::default());
            enc.write_all(bytes).unwrap();
            enc.finish().unwrap();
        };
        write_gz(TRAIN_IMAGES_FILE, &encode_idx_images(&[255; 12], 3, 2, 2));
        write_gz(TRAIN_LABELS_FILE, &encode_idx_labels(&[0, 1, 2]));
        std::fs::write(
            dir.path().join(TEST_IMAGES_FILE),
            encode_idx_images(&[0; 4], 1, 2, 2),
        )
        .unwrap();
        std::fs::write(dir.path().join(TEST_LABELS_FILE), encode_idx_labels(&[9])).unwrap();

        let mnist = Mnist::load(dir.path()).unwrap();
        assert_eq!(mnist.train.len(), 3);
        assert_eq!(mnist.train.dim(), 4);
        assert_eq!(mnist.train.row(2), &[1.0; 4]);
        assert_eq!(mnist.test.labels(), &[9]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Mnist::load(dir.path()), Err(DatasetError::NotFound(_))));
    }
}
