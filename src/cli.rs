//! コマンドライン引数
//!
//! 設定ファイルを読み込んだ上で、指定された引数だけを上書きする。

use clap::Parser;
use std::path::PathBuf;

use crate::model::{AppConfig, DeviceType};

/// 学習用の引数
#[derive(Parser, Debug)]
#[command(
    name = "train_model",
    version,
    about = "Train the image classifier on the configured dataset and save it."
)]
pub struct TrainArgs {
    /// 設定ファイル（存在しなければデフォルト設定）
    #[arg(long, default_value_os_t = AppConfig::default_path())]
    pub config: PathBuf,

    /// データセットの画像パスの基準ディレクトリ
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,

    /// モデルの保存先
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// エポック数
    #[arg(long)]
    pub epochs: Option<usize>,

    /// バッチサイズ
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// 学習率
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// 計算デバイス
    #[arg(long, value_enum)]
    pub device: Option<DeviceType>,
}

impl TrainArgs {
    /// 設定ファイルを読み込み、引数で上書きする
    pub fn resolve_config(&self) -> AppConfig {
        let mut config = AppConfig::load_or_default(&self.config);
        self.apply_to(&mut config);
        config
    }

    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(root) = &self.dataset_root {
            config.dataset_root = root.clone();
        }
        if let Some(path) = &self.model_path {
            config.model_path = path.clone();
        }
        if let Some(epochs) = self.epochs {
            config.training.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(device) = self.device {
            config.device_type = device;
        }
    }
}

/// 推論用の引数
#[derive(Parser, Debug)]
#[command(
    name = "predict_label",
    version,
    about = "Load the saved classifier and predict the label of an image."
)]
pub struct PredictArgs {
    /// 分類する画像
    #[arg(default_value = "./samples/wave2.jpeg")]
    pub image: PathBuf,

    /// 設定ファイル（存在しなければデフォルト設定）
    #[arg(long, default_value_os_t = AppConfig::default_path())]
    pub config: PathBuf,

    /// 読み込むモデル
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// 計算デバイス
    #[arg(long, value_enum)]
    pub device: Option<DeviceType>,
}

impl PredictArgs {
    pub fn resolve_config(&self) -> AppConfig {
        let mut config = AppConfig::load_or_default(&self.config);
        self.apply_to(&mut config);
        config
    }

    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(path) = &self.model_path {
            config.model_path = path.clone();
        }
        if let Some(device) = self.device {
            config.device_type = device;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_overrides() {
        let args = TrainArgs::try_parse_from([
            "train_model",
            "--epochs",
            "3",
            "--device",
            "cpu",
            "--model-path",
            "out/model",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.training.num_epochs, 3);
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.model_path, PathBuf::from("out/model"));
        // 指定していない値はそのまま
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(args.config, AppConfig::default_path());
    }

    #[test]
    fn test_predict_defaults() {
        let args = PredictArgs::try_parse_from(["predict_label"]).unwrap();
        assert_eq!(args.image, PathBuf::from("./samples/wave2.jpeg"));
        assert_eq!(args.config, AppConfig::default_path());
        assert_eq!(args.config, PathBuf::from("config.json"));

        let mut config = AppConfig::default();
        args.apply_to(&mut config);
        assert_eq!(config.model_path, PathBuf::from("saved-model/model.tar.gz"));
    }

    #[test]
    fn test_rejects_unknown_device() {
        assert!(PredictArgs::try_parse_from(["predict_label", "--device", "tpu"]).is_err());
    }
}
