//! Session controller: handshake, ask/apply/observe/tell loop, termination.
//!
//! ```text
//! Handshaking --syn/ack--> Running --termination token or fatal error--> Terminated
//! ```
//!
//! Every way out of `Running`, including cancellation, abandons the
//! in-flight trial (the oracle is never told about it), exports the session
//! and closes the transport.

use chrono::Utc;
use mt_optimizer::{build_space, OptimizerDriver, SearchOracle, SpaceBounds, Trial};
use mt_types::wire::{self, Message};
use mt_types::{HandshakeError, SizeEncoding, TunerError, TunerResult, Workload};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ProtocolVariant, TunerConfig};
use crate::store::ResultStore;
use crate::transport::Transport;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Handshaking,
    Running,
    Terminated,
}

/// Why a session reached `Terminated`.
#[derive(Debug)]
pub enum SessionEnd {
    /// The engine sent a termination token.
    EngineShutdown,
    /// The tuner was asked to stop.
    Cancelled,
    /// A session-fatal error; the runner starts a fresh session.
    Failed(TunerError),
}

impl SessionEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionEnd::EngineShutdown)
    }
}

/// Summary handed back to the runner once a session is over.
#[derive(Debug)]
pub struct SessionReport {
    pub name: String,
    pub end: SessionEnd,
    pub scored: usize,
    pub abandoned: usize,
    pub best: Option<Trial>,
    pub export_path: PathBuf,
}

/// Per-session knobs taken from [`TunerConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub bounds: SpaceBounds,
    pub encoding: SizeEncoding,
    pub protocol: ProtocolVariant,
}

impl From<&TunerConfig> for SessionSettings {
    fn from(config: &TunerConfig) -> Self {
        Self {
            bounds: config.space_bounds(),
            encoding: config.size_encoding,
            protocol: config.protocol,
        }
    }
}

/// One continuous run of the tuning loop over one connection.
#[derive(Debug)]
pub struct Session {
    name: String,
    state: SessionState,
    driver: OptimizerDriver,
    store: ResultStore,
    settings: SessionSettings,
}

/// A fresh, unique session name.
pub fn session_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &id[..8])
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        oracle: Box<dyn SearchOracle>,
        settings: SessionSettings,
        results_dir: impl AsRef<Path>,
    ) -> TunerResult<Self> {
        let name = name.into();
        let store = ResultStore::open(results_dir, &name)?;
        let driver = OptimizerDriver::new(oracle, settings.encoding);
        Ok(Self {
            name,
            state: SessionState::Handshaking,
            driver,
            store,
            settings,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn trials(&self) -> &[Trial] {
        self.driver.history()
    }

    /// Run the session to completion over `transport`.
    ///
    /// Session-fatal errors are reported through [`SessionReport::end`];
    /// only a failure to export the results is returned as `Err`.
    pub async fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        cancel: &CancellationToken,
    ) -> TunerResult<SessionReport> {
        info!(session = %self.name, endpoint = transport.endpoint(), oracle = self.driver.oracle_name(), "session started");

        let outcome = tokio::select! {
            outcome = self.drive(transport) => outcome.map(|()| SessionEnd::EngineShutdown),
            _ = cancel.cancelled() => {
                info!(session = %self.name, "session cancelled");
                Ok(SessionEnd::Cancelled)
            }
        };
        self.terminate(transport, outcome).await
    }

    async fn drive<T: Transport + ?Sized>(&mut self, transport: &mut T) -> TunerResult<()> {
        self.handshake(transport).await?;
        self.state = SessionState::Running;

        let mut workload = match self.observe(transport).await? {
            Some(workload) => workload,
            None => return Ok(()),
        };

        loop {
            let space = build_space(&workload, &self.settings.bounds)?;
            let (handle, configuration) = self.driver.ask(&space)?;
            info!(session = %self.name, trial = handle.number(), %configuration, "applying configuration");

            transport.send(&wire::encode_configuration(&configuration)).await?;

            let next = match self.observe(transport).await? {
                Some(next) => next,
                None => return Ok(()),
            };

            let trial = self.driver.tell(handle, next.total_latency() as f64)?;
            self.store.append(trial)?;
            workload = next;
        }
    }

    async fn handshake<T: Transport + ?Sized>(&mut self, transport: &mut T) -> TunerResult<()> {
        let first = transport.recv().await?;
        if first != wire::SYN {
            let err = if wire::is_termination(&first) {
                HandshakeError::Terminated { token: first }
            } else {
                HandshakeError::UnexpectedToken {
                    expected: wire::SYN.to_string(),
                    received: first,
                }
            };
            return Err(err.into());
        }
        transport.send(wire::ACK).await?;
        debug!(session = %self.name, "handshake complete");
        Ok(())
    }

    /// Wait for the engine's next report. `None` means it asked to stop.
    async fn observe<T: Transport + ?Sized>(&mut self, transport: &mut T) -> TunerResult<Option<Workload>> {
        if self.settings.protocol == ProtocolVariant::FlushNotice {
            let notice = transport.recv().await?;
            if wire::is_termination(&notice) {
                return Ok(None);
            }
            let flushed_at_ns = wire::decode_flush_notice(&notice)?;
            debug!(session = %self.name, flushed_at_ns, "memtable flushed");
        }

        let message = transport.recv().await?;
        match wire::decode(&message)? {
            Message::Telemetry(workload) => {
                debug!(
                    session = %self.name,
                    total_ops = workload.total_ops(),
                    samples = workload.sample_count(),
                    total_latency = workload.total_latency(),
                    "telemetry"
                );
                Ok(Some(workload))
            }
            Message::Terminate => {
                info!(session = %self.name, token = %message, "engine requested shutdown");
                Ok(None)
            }
        }
    }

    async fn terminate<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        outcome: TunerResult<SessionEnd>,
    ) -> TunerResult<SessionReport> {
        self.driver.abandon_in_flight();
        self.state = SessionState::Terminated;

        let export = self.store.export(self.driver.history());

        if let Err(e) = transport.close().await {
            warn!(session = %self.name, error = %e, "closing transport failed");
        }

        let end = match outcome {
            Ok(end) => end,
            Err(e) => {
                error!(session = %self.name, error = %e, "session failed");
                SessionEnd::Failed(e)
            }
        };

        let export_path = export?;
        let history = self.driver.history();
        let report = SessionReport {
            name: self.name.clone(),
            end,
            scored: history.iter().filter(|t| !t.is_abandoned()).count(),
            abandoned: history.iter().filter(|t| t.is_abandoned()).count(),
            best: self.driver.best().cloned(),
            export_path,
        };

        info!(
            session = %report.name,
            scored = report.scored,
            abandoned = report.abandoned,
            best = ?report.best.as_ref().map(|t| t.configuration.to_string()),
            clean = report.end.is_clean(),
            "session terminated"
        );
        Ok(report)
    }
}
