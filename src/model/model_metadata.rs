//! モデルメタデータの定義
//!
//! 推論時にモデルを再構築するための情報（クラスラベル、入力サイズ、
//! 隠れ層サイズ）と学習結果を保持します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::{ClassifierConfig, NUM_CHANNELS};
use crate::types::LabelTable;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラスラベル（データセット順、インデックス = クラスID）
    /// 例: ["Wave 2", "Wave 3", "Wave 4"]
    pub class_labels: Vec<String>,

    /// モデル入力画像の高さ
    pub image_height: u32,

    /// モデル入力画像の幅
    pub image_width: u32,

    /// 入力チャネル数
    #[serde(default = "default_num_channels")]
    pub num_channels: u32,

    /// 隠れ層のユニット数
    pub hidden_units: u32,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 学習率
    pub learning_rate: f64,

    /// 最終エポックの損失
    pub final_loss: f64,

    /// 最終エポックの正解率
    pub final_accuracy: f64,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

fn default_num_channels() -> u32 {
    NUM_CHANNELS as u32
}

impl ModelMetadata {
    /// 新しいメタデータを作成（学習時刻は現在時刻）
    pub fn new(
        class_labels: Vec<String>,
        config: &ClassifierConfig,
        num_epochs: u32,
        learning_rate: f64,
        final_loss: f64,
        final_accuracy: f64,
    ) -> Self {
        Self {
            class_labels,
            image_height: config.image_height as u32,
            image_width: config.image_width as u32,
            num_channels: NUM_CHANNELS as u32,
            hidden_units: config.hidden_units as u32,
            num_epochs,
            learning_rate,
            final_loss,
            final_accuracy,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// 保存時と同じ構成のモデル設定を復元
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::new(self.class_labels.len())
            .with_hidden_units(self.hidden_units as usize)
            .with_image_height(self.image_height as usize)
            .with_image_width(self.image_width as usize)
    }

    pub fn to_label_table(&self) -> Result<LabelTable> {
        LabelTable::from_labels(self.class_labels.clone())
            .context("model metadata contains an invalid label table")
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        let metadata: Self =
            serde_json::from_str(json).context("Failed to deserialize metadata from JSON")?;

        metadata.validate()?;
        Ok(metadata)
    }

    /// モデルを再構築できる値かを検証
    pub fn validate(&self) -> Result<()> {
        if self.num_channels as usize != NUM_CHANNELS {
            anyhow::bail!(
                "unsupported channel count in metadata: {} (expected {})",
                self.num_channels,
                NUM_CHANNELS
            );
        }
        if self.image_height == 0 || self.image_width == 0 {
            anyhow::bail!(
                "invalid image size in metadata: {}x{}",
                self.image_height,
                self.image_width
            );
        }
        if self.hidden_units == 0 {
            anyhow::bail!("hidden_units in metadata must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelMetadata {
        let config = ClassifierConfig::new(3).with_hidden_units(64);
        ModelMetadata::new(
            vec!["Wave 2".into(), "Wave 3".into(), "Wave 4".into()],
            &config,
            10,
            1e-3,
            0.25,
            1.0,
        )
    }

    #[test]
    fn test_json_roundtrip_and_config() {
        let metadata = sample();
        let json = metadata.to_json_string().unwrap();
        let restored = ModelMetadata::from_json_string(&json).unwrap();
        assert_eq!(metadata, restored);

        let config = restored.classifier_config();
        assert_eq!(config.num_classes, 3);
        assert_eq!(config.hidden_units, 64);
        assert_eq!(config.image_height, 100);

        let table = restored.to_label_table().unwrap();
        assert_eq!(table.label_at(2), Some("Wave 4"));
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let mut metadata = sample();
        metadata.num_channels = 4;
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(ModelMetadata::from_json_string(&json).is_err());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let mut metadata = sample();
        metadata.image_height = 0;
        let json = serde_json::to_string(&metadata).unwrap();
        let err = ModelMetadata::from_json_string(&json).unwrap_err();
        assert!(err.to_string().contains("invalid image size"));

        let mut metadata = sample();
        metadata.hidden_units = 0;
        assert!(metadata.validate().is_err());
        assert!(sample().validate().is_ok());
    }
}
