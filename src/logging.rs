//! ログ初期化
//!
//! 画面向けの出力は `println!`、診断ログは `tracing` に分ける。

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` が無ければ verbose に応じて既定レベルを決める
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pill_id_rust={}", default_level)));

    // 二重初期化（テスト等）は無視
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
