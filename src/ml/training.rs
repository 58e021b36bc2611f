//! モデル学習

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use burn_dataset::InMemDataset;

use crate::ml::{load_and_preprocess_image, ClassifierConfig, ImageClassifier, NUM_CHANNELS};
use crate::ml::{HIDDEN_UNITS, IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::model::{save_model_with_metadata, ModelMetadata};
use crate::types::{DatasetEntry, LabelTable};

/// 学習パラメータ
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub shuffle_seed: u64,
    pub image_height: usize,
    pub image_width: usize,
    pub hidden_units: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            num_epochs: 10,
            batch_size: 32,
            learning_rate: 1e-3,
            shuffle_seed: 42,
            image_height: IMAGE_HEIGHT,
            image_width: IMAGE_WIDTH,
            hidden_units: HIDDEN_UNITS,
        }
    }
}

impl TrainingOptions {
    fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            anyhow::bail!("num_epochs must be at least 1");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.image_height == 0 || self.image_width == 0 {
            anyhow::bail!(
                "invalid image size: {}x{}",
                self.image_height,
                self.image_width
            );
        }
        if self.hidden_units == 0 {
            anyhow::bail!("hidden_units must be at least 1");
        }
        Ok(())
    }

    pub fn classifier_config(&self, num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(num_classes)
            .with_hidden_units(self.hidden_units)
            .with_image_height(self.image_height)
            .with_image_width(self.image_width)
    }
}

/// データセットアイテム（前処理済みの画素とクラスID）
#[derive(Clone, Debug)]
pub struct WaveItem {
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// 学習データセット
///
/// 画像はロード時に一度だけデコード・前処理する。
pub struct WaveDataset {
    items: InMemDataset<WaveItem>,
    labels: LabelTable,
}

impl WaveDataset {
    /// データセット定義から画像を読み込む
    ///
    /// 1枚でも読み込めなければエラー。
    pub fn load(entries: &[DatasetEntry], root: &Path, height: usize, width: usize) -> Result<Self> {
        let labels = LabelTable::from_entries(entries)?;
        let mut items = Vec::with_capacity(entries.len());

        for entry in entries {
            let path = entry.resolve(root);
            let pixels = match load_and_preprocess_image(&path, height, width) {
                Ok(pixels) => pixels,
                Err(e) => {
                    tracing::error!("画像の読み込みに失敗しました {}: {:#}", path.display(), e);
                    return Err(e);
                }
            };

            // from_entries で検証済みなので必ず見つかる
            let label = labels
                .index_of(&entry.label)
                .with_context(|| format!("label {:?} missing from label table", entry.label))?;

            tracing::debug!("  {} -> クラス {} ({})", path.display(), label, entry.label);
            items.push(WaveItem { pixels, label });
        }

        tracing::info!("{} 枚の画像を {} クラスで読み込みました", items.len(), labels.len());

        Ok(Self {
            items: InMemDataset::new(items),
            labels,
        })
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }
}

impl Dataset<WaveItem> for WaveDataset {
    fn get(&self, index: usize) -> Option<WaveItem> {
        self.items.get(index)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct WaveBatcher<B: Backend> {
    device: B::Device,
    image_height: usize,
    image_width: usize,
}

impl<B: Backend> WaveBatcher<B> {
    pub fn new(device: B::Device, image_height: usize, image_width: usize) -> Self {
        Self {
            device,
            image_height,
            image_width,
        }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct WaveBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, WaveItem, WaveBatch<B>> for WaveBatcher<B> {
    fn batch(&self, items: Vec<WaveItem>, _device: &B::Device) -> WaveBatch<B> {
        let batch_size = items.len();
        let (height, width) = (self.image_height, self.image_width);

        let mut all_pixels = Vec::with_capacity(batch_size * NUM_CHANNELS * height * width);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend_from_slice(&item.pixels);
            targets.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(all_pixels, [batch_size, NUM_CHANNELS, height, width]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), &self.device);

        WaveBatch { images, targets }
    }
}

/// 1エポック分の集計
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub num_epochs: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// 学習済みモデル（推論モード）とラベル表
pub struct TrainedModel<B: Backend> {
    pub model: ImageClassifier<B>,
    pub config: ClassifierConfig,
    pub labels: LabelTable,
    pub options: TrainingOptions,
    pub summary: EpochSummary,
}

/// モデル学習を実行
///
/// エポックごとに `progress` を呼ぶ。`cancel_flag` はエポックの区切りで確認する。
pub fn train_model<B, F>(
    entries: &[DatasetEntry],
    dataset_root: &Path,
    options: &TrainingOptions,
    device: &B::Device,
    cancel_flag: &AtomicBool,
    mut progress: F,
) -> Result<TrainedModel<B::InnerBackend>>
where
    B: AutodiffBackend,
    F: FnMut(&EpochSummary),
{
    options.validate()?;

    let dataset = WaveDataset::load(entries, dataset_root, options.image_height, options.image_width)?;
    let labels = dataset.labels().clone();
    let num_samples = dataset.len();

    let config = options.classifier_config(dataset.num_classes());
    let mut model: ImageClassifier<B> = config.init(device);
    let mut optim = AdamConfig::new().init();

    tracing::info!(
        "モデル設定: {} クラス, 入力サイズ: {}x{}, 隠れ層: {}",
        config.num_classes,
        config.image_height,
        config.image_width,
        config.hidden_units
    );
    tracing::info!(
        "エポック数: {}, バッチサイズ: {}, 学習率: {}",
        options.num_epochs,
        options.batch_size,
        options.learning_rate
    );

    let batcher = WaveBatcher::<B>::new(device.clone(), options.image_height, options.image_width);
    let dataloader = DataLoaderBuilder::new(batcher)
        .batch_size(options.batch_size)
        .shuffle(options.shuffle_seed)
        .build(dataset);

    let mut last_summary = None;

    for epoch in 1..=options.num_epochs {
        if cancel_flag.load(Ordering::Relaxed) {
            tracing::warn!("学習がキャンセルされました (エポック {})", epoch);
            anyhow::bail!("training cancelled before epoch {}", epoch);
        }

        let mut loss_sum = 0.0f64;
        let mut num_batches = 0usize;
        let mut correct = 0usize;
        let mut total = 0usize;

        for batch in dataloader.iter() {
            let output = model.forward_classification(batch.images, batch.targets);

            loss_sum += output.loss.clone().into_scalar().elem::<f64>();
            num_batches += 1;

            // argmax(1) は [batch, 1] なので [batch] に揃える
            let predictions = output.output.clone().argmax(1).flatten::<1>(0, 1);
            total += output.targets.dims()[0];
            let batch_correct: i64 = predictions
                .equal(output.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;

            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(options.learning_rate, model, grads);
        }

        let summary = EpochSummary {
            epoch,
            num_epochs: options.num_epochs,
            loss: if num_batches > 0 { loss_sum / num_batches as f64 } else { f64::NAN },
            accuracy: if total > 0 { correct as f64 / total as f64 } else { 0.0 },
        };

        tracing::info!(
            "Epoch {:>3}/{} | loss={:.4} | acc={:.1}%",
            summary.epoch,
            summary.num_epochs,
            summary.loss,
            summary.accuracy * 100.0
        );
        progress(&summary);
        last_summary = Some(summary);
    }

    let summary = last_summary.context("training ran no epochs")?;
    tracing::info!("学習完了: {} サンプル, 最終損失 {:.4}", num_samples, summary.loss);

    Ok(TrainedModel {
        model: model.valid(),
        config,
        labels,
        options: options.clone(),
        summary,
    })
}

/// 学習済みモデルをメタデータと共に保存
///
/// 実際に書き込んだパスを返す。
pub fn save_trained_model<B: Backend>(trained: &TrainedModel<B>, output_path: &Path) -> Result<PathBuf> {
    // CompactRecorderはf16で保存するためFullPrecisionを使う
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let model_binary = recorder
        .record(trained.model.clone().into_record(), ())
        .map_err(|e| anyhow::anyhow!("Failed to serialize model weights: {:?}", e))?;

    let metadata = ModelMetadata::new(
        trained.labels.labels().to_vec(),
        &trained.config,
        trained.options.num_epochs as u32,
        trained.options.learning_rate,
        trained.summary.loss,
        trained.summary.accuracy,
    );

    save_model_with_metadata(output_path, &metadata, &model_binary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{Rgb, RgbImage};

    pub type TestBackend = NdArray<f32>;
    pub type TestAutodiffBackend = Autodiff<TestBackend>;

    /// 色の異なる3枚の小さな画像を作成
    pub fn write_dataset(root: &Path) -> Vec<DatasetEntry> {
        let dir = root.join("dataset");
        std::fs::create_dir_all(&dir).unwrap();

        let specs = [
            ("wave2.png", "Wave 2", [220u8, 20, 20]),
            ("wave3.png", "Wave 3", [20, 220, 20]),
            ("wave4.png", "Wave 4", [20, 20, 220]),
        ];

        specs
            .iter()
            .map(|(file, label, color)| {
                // 入力サイズと異なるサイズで保存してリサイズを通す
                RgbImage::from_pixel(12, 10, Rgb(*color))
                    .save(dir.join(file))
                    .unwrap();
                DatasetEntry::new(format!("./dataset/{}", file), *label)
            })
            .collect()
    }

    pub fn small_options() -> TrainingOptions {
        TrainingOptions {
            num_epochs: 30,
            batch_size: 32,
            learning_rate: 1e-2,
            shuffle_seed: 42,
            image_height: 8,
            image_width: 8,
            hidden_units: 16,
        }
    }

    #[test]
    fn test_dataset_load() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_dataset(dir.path());

        let dataset = WaveDataset::load(&entries, dir.path(), 8, 8).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.num_classes(), 3);

        let item = dataset.get(2).unwrap();
        assert_eq!(item.label, 2);
        assert_eq!(item.pixels.len(), 3 * 8 * 8);
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn test_batcher_shapes() {
        let device = NdArrayDevice::Cpu;
        let batcher = WaveBatcher::<TestBackend>::new(device.clone(), 4, 5);
        let items = vec![
            WaveItem { pixels: vec![0.5; 60], label: 1 },
            WaveItem { pixels: vec![0.0; 60], label: 0 },
        ];

        let batch = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 4, 5]);

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![1, 0]);
    }

    #[test]
    fn test_train_reduces_loss() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_dataset(dir.path());
        let device = NdArrayDevice::Cpu;
        let cancel = AtomicBool::new(false);

        let mut losses = Vec::new();
        let trained = train_model::<TestAutodiffBackend, _>(
            &entries,
            dir.path(),
            &small_options(),
            &device,
            &cancel,
            |summary| losses.push(summary.loss),
        )
        .unwrap();

        assert_eq!(losses.len(), 30);
        assert!(losses.iter().all(|l| l.is_finite()));
        assert!(losses.last().unwrap() < losses.first().unwrap());
        assert_eq!(trained.summary.epoch, 30);
        assert_eq!(trained.labels.labels(), &["Wave 2", "Wave 3", "Wave 4"]);

        let saved = save_trained_model(&trained, &dir.path().join("saved-model/model")).unwrap();
        let metadata = crate::model::load_metadata(&saved).unwrap();
        assert_eq!(metadata.class_labels.len(), 3);
        assert_eq!(metadata.image_height, 8);
        assert_eq!(metadata.hidden_units, 16);
        assert_eq!(metadata.num_epochs, 30);
    }

    #[test]
    fn test_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = write_dataset(dir.path());
        entries.push(DatasetEntry::new("./dataset/missing.jpeg", "Wave 5"));

        let cancel = AtomicBool::new(false);
        let result = train_model::<TestAutodiffBackend, _>(
            &entries,
            dir.path(),
            &small_options(),
            &NdArrayDevice::Cpu,
            &cancel,
            |_| {},
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cancelled_training() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_dataset(dir.path());
        let cancel = AtomicBool::new(true);

        let err = train_model::<TestAutodiffBackend, _>(
            &entries,
            dir.path(),
            &small_options(),
            &NdArrayDevice::Cpu,
            &cancel,
            |_| {},
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_invalid_options() {
        let options = TrainingOptions {
            num_epochs: 0,
            ..TrainingOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(TrainingOptions::default().validate().is_ok());
    }
}
