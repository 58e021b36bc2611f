//! 学習・推論コマンド
//!
//! burnの処理は同期的なので、`spawn_blocking` 上でバックエンドを選んで実行する。

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task;

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
#[cfg(feature = "wgpu")]
use burn_wgpu::{Wgpu, WgpuDevice};

use crate::ml::{save_trained_model, train_model, EpochSummary, InferenceEngine, Prediction};
use crate::model::{AppConfig, DeviceType};

/// 進捗情報のペイロード
#[derive(Clone, Debug, Serialize)]
pub struct TrainingProgress {
    pub current_epoch: usize,
    pub total_epochs: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub message: String,
}

impl From<&EpochSummary> for TrainingProgress {
    fn from(summary: &EpochSummary) -> Self {
        Self {
            current_epoch: summary.epoch,
            total_epochs: summary.num_epochs,
            train_loss: summary.loss,
            train_accuracy: summary.accuracy,
            message: format!("Epoch {}/{}", summary.epoch, summary.num_epochs),
        }
    }
}

/// 学習結果
#[derive(Clone, Debug, Serialize)]
pub struct TrainReport {
    pub model_path: PathBuf,
    pub class_labels: Vec<String>,
    pub final_loss: f64,
    pub final_accuracy: f64,
}

/// モデル学習コマンド（非同期）
///
/// 学習後、`config.model_path` にモデルを保存する。
pub async fn train_command<F>(
    config: AppConfig,
    cancel_flag: Arc<AtomicBool>,
    on_progress: F,
) -> Result<TrainReport>
where
    F: FnMut(TrainingProgress) + Send + 'static,
{
    task::spawn_blocking(move || run_training(&config, &cancel_flag, on_progress))
        .await
        .context("training thread panicked")?
}

/// 推論コマンド（非同期）
pub async fn predict_command(config: AppConfig, image_path: PathBuf) -> Result<Prediction> {
    task::spawn_blocking(move || run_prediction(&config, &image_path))
        .await
        .context("prediction thread panicked")?
}

fn run_training<F>(config: &AppConfig, cancel_flag: &AtomicBool, on_progress: F) -> Result<TrainReport>
where
    F: FnMut(TrainingProgress),
{
    match config.device_type {
        DeviceType::Cpu => {
            train_on::<Autodiff<NdArray>, F>(config, &NdArrayDevice::Cpu, cancel_flag, on_progress)
        }
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => {
            train_on::<Autodiff<Wgpu>, F>(config, &WgpuDevice::default(), cancel_flag, on_progress)
        }
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => anyhow::bail!("built without the `wgpu` feature; use the cpu device"),
    }
}

fn train_on<B, F>(
    config: &AppConfig,
    device: &B::Device,
    cancel_flag: &AtomicBool,
    mut on_progress: F,
) -> Result<TrainReport>
where
    B: AutodiffBackend,
    F: FnMut(TrainingProgress),
{
    tracing::info!("{} で学習を開始します", config.device_type);

    let options = config.training.to_options();
    let trained = train_model::<B, _>(
        &config.dataset,
        &config.dataset_root,
        &options,
        device,
        cancel_flag,
        |summary| on_progress(TrainingProgress::from(summary)),
    )?;

    let model_path = save_trained_model(&trained, &config.model_path)?;

    Ok(TrainReport {
        model_path,
        class_labels: trained.labels.labels().to_vec(),
        final_loss: trained.summary.loss,
        final_accuracy: trained.summary.accuracy,
    })
}

fn run_prediction(config: &AppConfig, image_path: &Path) -> Result<Prediction> {
    match config.device_type {
        DeviceType::Cpu => predict_on::<NdArray>(config, &NdArrayDevice::Cpu, image_path),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => predict_on::<Wgpu>(config, &WgpuDevice::default(), image_path),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => anyhow::bail!("built without the `wgpu` feature; use the cpu device"),
    }
}

fn predict_on<B: Backend>(config: &AppConfig, device: &B::Device, image_path: &Path) -> Result<Prediction> {
    let model_path = crate::model::model_storage::archive_path(&config.model_path);
    let engine = InferenceEngine::<B>::load(&model_path, device)?;

    // 設定ファイルのデータセット順と学習時の順序が違うとラベルがずれる
    let configured: Vec<&str> = config.dataset.iter().map(|e| e.label.as_str()).collect();
    if configured != engine.labels().labels() {
        tracing::warn!(
            "設定のラベル順 [{}] とモデルのラベル順 [{}] が異なります。モデル側を使用します",
            configured.join(", "),
            engine.labels().labels().join(", ")
        );
    }

    engine.predict(image_path)
}
