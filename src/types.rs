//! データセット定義とラベル表

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// データセットの1エントリ（画像ファイルとラベル）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// 画像ファイルのパス（データセットルートからの相対パス）
    pub file_name: String,
    /// クラスラベル
    pub label: String,
}

impl DatasetEntry {
    pub fn new(file_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            label: label.into(),
        }
    }

    /// データセットルートを基準に画像パスを解決
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let path = Path::new(&self.file_name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

/// 組み込みのデータセット（この順序がクラスIDになる）
pub fn default_dataset() -> Vec<DatasetEntry> {
    vec![
        DatasetEntry::new("./dataset/wave2.jpeg", "Wave 2"),
        DatasetEntry::new("./dataset/wave3.png", "Wave 3"),
        DatasetEntry::new("./dataset/wave4.jpeg", "Wave 4"),
    ]
}

/// クラスID <-> ラベルの対応表
///
/// クラスIDはデータセット内の位置そのもの。学習時と推論時で同じ表を使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// データセットから対応表を作成
    pub fn from_entries(entries: &[DatasetEntry]) -> Result<Self> {
        Self::from_labels(entries.iter().map(|e| e.label.clone()).collect())
    }

    /// ラベル列から対応表を作成（空・重複はエラー）
    pub fn from_labels(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            anyhow::bail!("dataset is empty: at least one labeled image is required");
        }

        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                anyhow::bail!("duplicate label in dataset: {:?}", label);
            }
        }

        Ok(Self { labels })
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dataset_order() {
        let table = LabelTable::from_entries(&default_dataset()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.index_of("Wave 2"), Some(0));
        assert_eq!(table.index_of("Wave 4"), Some(2));
        assert_eq!(table.label_at(1), Some("Wave 3"));
        assert_eq!(table.label_at(3), None);
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(LabelTable::from_entries(&[]).is_err());

        let entries = vec![
            DatasetEntry::new("a.png", "Wave 2"),
            DatasetEntry::new("b.png", "Wave 2"),
        ];
        let err = LabelTable::from_entries(&entries).unwrap_err();
        assert!(err.to_string().contains("duplicate label"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let root = Path::new("/data/root");
        let entry = DatasetEntry::new("./dataset/wave2.jpeg", "Wave 2");
        assert_eq!(entry.resolve(root), root.join("./dataset/wave2.jpeg"));

        let abs = DatasetEntry::new("/tmp/x.png", "X");
        assert_eq!(abs.resolve(root), PathBuf::from("/tmp/x.png"));
    }
}
