//! 保存済みモデルで画像のラベルを予測する

use clap::Parser;
use std::process::ExitCode;

use wave_classifier::cli::PredictArgs;
use wave_classifier::logging::init_logging;
use wave_classifier::predict_command;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args = PredictArgs::parse();
    let config = args.resolve_config();

    match predict_command(config, args.image.clone()).await {
        Ok(prediction) => {
            for (label, p) in &prediction.probabilities {
                tracing::info!("  {}: {:.4}", label, p);
            }
            println!("Predicted label: {}", prediction.label);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}: {:#}", args.image.display(), e);
            println!("Failed to predict label.");
            ExitCode::FAILURE
        }
    }
}
