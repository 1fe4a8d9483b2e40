//! rtkbridge entry point.

mod app;
mod config;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use config::BridgeConfig;

fn main() -> ExitCode {
    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting rtkbridge");

    let config = match BridgeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        mode = %config.mode,
        caster = %config.caster_endpoint(),
        receiver = %config.receiver_endpoint(),
        "configuration loaded"
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(app::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; `LOG_LEVEL` is honored for deployments that only set a
/// bare level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL")
                .map_err(|e| e.to_string())
                .and_then(|level| EnvFilter::try_new(level.to_lowercase()).map_err(|e| e.to_string()))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
