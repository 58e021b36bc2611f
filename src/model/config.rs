//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、データセット、学習設定などをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::{TrainingOptions, HIDDEN_UNITS, IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::types::{default_dataset, DatasetEntry};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// シャッフル用シード
    pub seed: u64,
    /// 入力画像の高さ
    pub image_height: usize,
    /// 入力画像の幅
    pub image_width: usize,
    /// 隠れ層のユニット数
    pub hidden_units: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 10,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 42,
            image_height: IMAGE_HEIGHT,
            image_width: IMAGE_WIDTH,
            hidden_units: HIDDEN_UNITS,
        }
    }
}

impl TrainingSettings {
    pub fn to_options(&self) -> TrainingOptions {
        TrainingOptions {
            num_epochs: self.num_epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            shuffle_seed: self.seed,
            image_height: self.image_height,
            image_width: self.image_width,
            hidden_units: self.hidden_units,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// データセットの画像パスの基準ディレクトリ
    pub dataset_root: PathBuf,
    /// 学習データ（この順序がクラスIDになる）
    pub dataset: Vec<DatasetEntry>,
    /// モデルの保存先（.tar.gz）
    pub model_path: PathBuf,
    /// トレーニング設定
    pub training: TrainingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            dataset_root: PathBuf::from("."),
            dataset: default_dataset(),
            model_path: PathBuf::from("saved-model/model.tar.gz"),
            training: TrainingSettings::default(),
        }
    }
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない・読めない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::info!(
                "設定ファイルが存在しません ({})。デフォルト設定を使用します",
                path.display()
            );
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        tracing::info!("計算デバイス: {}", self.device_type);
        tracing::info!("データセット: {} 件 (root: {})", self.dataset.len(), self.dataset_root.display());
        for (i, entry) in self.dataset.iter().enumerate() {
            tracing::debug!("  クラス {}: {} <- {}", i, entry.label, entry.file_name);
        }
        tracing::info!("モデルパス: {}", self.model_path.display());
        tracing::info!(
            "エポック数: {}, バッチサイズ: {}, 学習率: {}",
            self.training.num_epochs,
            self.training.batch_size,
            self.training.learning_rate
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.dataset.len(), 3);
        assert_eq!(config.training.num_epochs, 10);
        assert_eq!(config.training.image_height, 100);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.device_type = DeviceType::Cpu;
        config.training.num_epochs = 3;
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or_default(&path);
        assert_eq!(loaded.device_type, DeviceType::Cpu);
        assert_eq!(loaded.training.num_epochs, 3);
        assert_eq!(loaded.dataset, config.dataset);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "device_type": "cpu", "training": { "num_epochs": 2 } }"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.training.num_epochs, 2);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.dataset.len(), 3);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let config = AppConfig::load_or_default(&path);
        assert_eq!(config.training.num_epochs, 10);
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
