//! Mode dispatch: stream relay or one-shot provisioning.

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use rtkbridge_caster::CasterSession;
use rtkbridge_provisioning::ConfigurationController;
use rtkbridge_receiver::{DataOutputConfig, ReceiverLink};
use rtkbridge_relay::RelayEngine;

use crate::config::{BridgeConfig, OperationMode};

pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    match config.mode {
        OperationMode::Stream => stream(&config).await,
        OperationMode::Config => provision(&config).await,
    }
}

async fn stream(config: &BridgeConfig) -> anyhow::Result<()> {
    let endpoint = config.receiver_endpoint();
    let mut link = ReceiverLink::open(&endpoint)
        .await
        .with_context(|| format!("opening receiver link {endpoint}"))?;

    let prepared = async {
        link.enter_command_mode().await?;
        link.enter_data_mode(&DataOutputConfig::default()).await
    }
    .await;
    if let Err(e) = prepared {
        link.close().await;
        return Err(e).context("switching receiver link to data mode");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let session = CasterSession::new(config.caster_endpoint());
    let mut engine = RelayEngine::new(session, link, config.relay_config());
    let stats = engine.run(cancel).await.context("relay stopped")?;

    tracing::info!(
        bytes_forwarded = stats.bytes_forwarded,
        positions_sent = stats.positions_sent,
        reconnects = stats.reconnects,
        "stream mode finished"
    );
    Ok(())
}

async fn provision(config: &BridgeConfig) -> anyhow::Result<()> {
    let endpoint = config.receiver_endpoint();
    let mut link = ReceiverLink::open(&endpoint)
        .await
        .with_context(|| format!("opening receiver link {endpoint}"))?;

    let controller = ConfigurationController::new(config.provisioning_config());
    let result = controller.run(&mut link).await;
    link.close().await;

    let report = result.context("receiver provisioning failed")?;
    for (step, outcome) in &report.steps {
        tracing::debug!(%step, ?outcome, "provisioning step summary");
    }
    if report.fully_confirmed() {
        tracing::info!("receiver provisioned");
    } else {
        tracing::warn!("receiver provisioned, some steps were not confirmed");
    }
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, shutting down");
        }
    }
    cancel.cancel();
}
