//! Top-level loop: connect, run a session, start over.

use mt_types::{TunerError, TunerResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::TunerConfig;
use crate::session::{session_name, Session, SessionEnd, SessionSettings};
use crate::transport::Connector;

/// Totals across every session the tuner ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sessions: usize,
    pub failed_sessions: usize,
    pub trials: usize,
}

/// Runs sessions back to back against whatever `C` connects to.
///
/// Every session gets a fresh oracle and history. A failed session is
/// logged and, after `connect_backoff`, followed by a new one. A failed
/// connect or handshake ends the run, as does cancellation (after the
/// current session has exported).
#[derive(Debug)]
pub struct Tuner<C: Connector> {
    connector: C,
    config: TunerConfig,
}

impl<C: Connector> Tuner<C> {
    pub fn new(connector: C, config: TunerConfig) -> Self {
        Self { connector, config }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> TunerResult<RunSummary> {
        let mut summary = RunSummary::default();
        let settings = SessionSettings::from(&self.config);

        loop {
            if let Some(max) = self.config.max_sessions {
                if summary.sessions >= max {
                    info!(sessions = summary.sessions, "session limit reached");
                    return Ok(summary);
                }
            }

            let mut transport = tokio::select! {
                transport = self.connector.connect() => transport?,
                _ = cancel.cancelled() => return Ok(summary),
            };

            let oracle = self.config.build_oracle(summary.sessions as u64);
            let mut session = Session::new(
                session_name(),
                oracle,
                settings.clone(),
                &self.config.results_dir,
            )?;
            let report = session.run(&mut transport, cancel).await?;

            summary.sessions += 1;
            summary.trials += report.scored + report.abandoned;
            match report.end {
                SessionEnd::EngineShutdown => {}
                SessionEnd::Cancelled => return Ok(summary),
                SessionEnd::Failed(TunerError::Handshake(e)) => {
                    summary.failed_sessions += 1;
                    error!(session = %report.name, error = %e, "engine rejected the handshake, stopping");
                    return Err(e.into());
                }
                SessionEnd::Failed(e) => {
                    summary.failed_sessions += 1;
                    warn!(
                        session = %report.name,
                        error = %e,
                        backoff_ms = self.config.connect_backoff_ms,
                        "restarting after failed session"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.connect_backoff()) => {}
                        _ = cancel.cancelled() => return Ok(summary),
                    }
                }
            }
        }
    }
}
