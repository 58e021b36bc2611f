//! ログ出力の初期化

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "wave_classifier=info";

/// `RUST_LOG` があればそれを使い、なければ crate の info 以上を出力する
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    // 二重初期化（テストなど）は無視する
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
