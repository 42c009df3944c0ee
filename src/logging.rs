use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// 安装全局 subscriber。`RUST_LOG` 优先，否则用命令行给的级别
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("logging already initialised: {e}");
    }
}
