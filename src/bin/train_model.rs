//! データセットで分類モデルを学習して保存する

use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wave_classifier::cli::TrainArgs;
use wave_classifier::logging::init_logging;
use wave_classifier::train_command;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args = TrainArgs::parse();
    let config = args.resolve_config();
    config.log_summary();

    // Ctrl-C で次のエポックの前に中断する
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_on_signal = cancel_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("中断要求を受け付けました。現在のエポック終了後に停止します");
            cancel_on_signal.store(true, Ordering::Relaxed);
        }
    });

    let result = train_command(config, cancel_flag, |progress| {
        tracing::debug!(
            "{} loss={:.4} acc={:.3}",
            progress.message,
            progress.train_loss,
            progress.train_accuracy
        );
    })
    .await;

    match result {
        Ok(report) => {
            tracing::info!("保存先: {}", report.model_path.display());
            println!("Model trained and saved.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("学習に失敗しました: {:#}", e);
            println!("Failed to train model.");
            ExitCode::FAILURE
        }
    }
}
