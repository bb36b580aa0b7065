use anyhow::Context;
use mt_tuner::{Tuner, TunerConfig, ZmqConnector};
use std::io::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = TunerConfig::load().context("load tuner configuration")?;
    info!(
        endpoint = %config.endpoint,
        results = %config.results_dir.display(),
        strategy = ?config.strategy,
        protocol = ?config.protocol,
        seed = config.seed,
        "memtune starting"
    );

    let connector = ZmqConnector::new(
        config.endpoint.clone(),
        config.connect_attempts,
        config.connect_backoff(),
    );
    let tuner = Tuner::new(connector, config);

    // the running session exports before the runner returns
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing the current session");
            interrupt.cancel();
        }
    });

    let summary = tuner.run(&cancel).await.context("tuning loop stopped")?;
    info!(
        sessions = summary.sessions,
        failed = summary.failed_sessions,
        trials = summary.trials,
        "memtune finished"
    );
    Ok(())
}
