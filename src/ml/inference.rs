//! モデル推論機能

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};

use crate::ml::{load_and_preprocess_image, ClassifierConfig, ImageClassifier, NUM_CHANNELS};
use crate::model::{load_model_with_metadata, log_metadata_info, ModelMetadata};
use crate::types::LabelTable;

/// 推論結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// 予測クラスID
    pub class_index: usize,
    /// 予測ラベル
    pub label: String,
    /// クラスごとの確率（データセット順）
    pub probabilities: Vec<(String, f32)>,
}

impl Prediction {
    /// 予測クラスの確率
    pub fn confidence(&self) -> f32 {
        self.probabilities
            .get(self.class_index)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: ImageClassifier<B>,
    config: ClassifierConfig,
    labels: LabelTable,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: &B::Device) -> Result<Self> {
        let model_path = model_path.as_ref();

        let (metadata, model_binary) = match load_model_with_metadata(model_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!("モデルの読み込みに失敗しました: {:#}", e);
                return Err(e);
            }
        };
        log_metadata_info(&metadata);

        let labels = metadata.to_label_table()?;
        let config = metadata.classifier_config();
        let model = config.init::<B>(device);

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, device)
            .map_err(|e| anyhow::anyhow!("Failed to load model weights: {:?}", e))?;
        let model = model.load_record(record);

        if let Err(e) = model.check_config(&config) {
            tracing::error!("モデルの重みとメタデータが一致しません: {:#}", e);
            return Err(e);
        }

        tracing::info!("モデルを読み込みました: {}", model_path.display());

        Ok(Self {
            model,
            config,
            labels,
            metadata,
            device: device.clone(),
        })
    }

    /// 単一画像を分類
    pub fn predict<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction> {
        let image_path = image_path.as_ref();
        let (height, width) = (self.config.image_height, self.config.image_width);

        let pixels = match load_and_preprocess_image(image_path, height, width) {
            Ok(pixels) => pixels,
            Err(e) => {
                tracing::error!("画像の読み込みに失敗しました: {:#}", e);
                return Err(e);
            }
        };

        // バッチ次元を追加 [1, 3, H, W]
        let tensor = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [1, NUM_CHANNELS, height, width]),
            &self.device,
        );

        let (predictions, probabilities) = self.model.predict(tensor);
        let class_index = predictions
            .into_data()
            .iter::<i64>()
            .next()
            .context("model produced no prediction")?;
        let probabilities: Vec<f32> = probabilities.into_data().iter::<f32>().collect();

        self.to_prediction(class_index as usize, &probabilities)
    }

    /// 予測クラスIDをラベルに変換
    fn to_prediction(&self, class_index: usize, probabilities: &[f32]) -> Result<Prediction> {
        let label = self
            .labels
            .label_at(class_index)
            .ok_or_else(|| anyhow::anyhow!("class index {} is out of range", class_index))?
            .to_string();

        tracing::debug!(
            "予測: クラス {} ({}) p={:.4}",
            class_index,
            label,
            probabilities.get(class_index).copied().unwrap_or_default()
        );

        Ok(Prediction {
            class_index,
            label,
            probabilities: self
                .labels
                .labels()
                .iter()
                .cloned()
                .zip(probabilities.iter().copied())
                .collect(),
        })
    }

    /// 単一画像を分類してラベルだけを返す
    pub fn predict_label<P: AsRef<Path>>(&self, image_path: P) -> Result<String> {
        Ok(self.predict(image_path)?.label)
    }

    /// 複数画像を分類
    pub fn predict_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<Prediction>> {
        image_paths.iter().map(|path| self.predict(path)).collect()
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
