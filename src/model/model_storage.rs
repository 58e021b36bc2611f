//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラスラベル、入力サイズなど）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先パスを正規化（.tar.gz で終わっていなければ付与）
pub fn archive_path(output_path: &Path) -> PathBuf {
    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_file_name(format!("{}.tar.gz", name))
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 実際に書き込んだパスを返す。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = archive_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    // tar -> gzip の順で閉じる
    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?;
    encoder.finish().context("Failed to finalize gzip stream")?;

    tracing::info!(
        "モデルを保存しました: {} ({} bytes)",
        tar_gz_path.display(),
        model_binary.len()
    );

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .with_context(|| format!("Failed to add {} to tar", name))
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open model archive: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// アーカイブから指定エントリのバイト列を取り出す
fn read_entry(tar_gz_path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(name) {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
    }

    Err(anyhow::anyhow!("{} not found in {:?}", name, tar_gz_path))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let bytes = read_entry(tar_gz_path, METADATA_ENTRY)?;
    let json_str = String::from_utf8(bytes).context("metadata.json is not valid UTF-8")?;
    ModelMetadata::from_json_string(&json_str)
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    read_entry(tar_gz_path, MODEL_ENTRY)
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();

        match path.as_str() {
            METADATA_ENTRY => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            MODEL_ENTRY => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("{} not found in {:?}", METADATA_ENTRY, tar_gz_path)),
        (_, None) => Err(anyhow::anyhow!("{} not found in {:?}", MODEL_ENTRY, tar_gz_path)),
    }
}

/// メタデータをログに出力
pub fn log_metadata_info(metadata: &ModelMetadata) {
    tracing::info!("クラスラベル: {}", metadata.class_labels.join(", "));
    tracing::info!(
        "入力サイズ: {}x{}x{}, 隠れ層: {}",
        metadata.num_channels,
        metadata.image_height,
        metadata.image_width,
        metadata.hidden_units
    );
    tracing::info!(
        "学習: {} エポック, 学習率 {}, 最終損失 {:.4}, 正解率 {:.1}%",
        metadata.num_epochs,
        metadata.learning_rate,
        metadata.final_loss,
        metadata.final_accuracy * 100.0
    );
    tracing::info!("学習日時: {}", metadata.trained_at);
}
