//! # mt-tuner
//!
//! Drives a storage engine's memtable configuration online. The engine
//! reports its workload after every memtable flush; the tuner scores the
//! configuration it applied last, asks the optimizer for the next one and
//! sends it back. Each connection is one session with its own oracle,
//! trial log and CSV export.

pub mod config;
pub mod memory;
pub mod runner;
pub mod session;
pub mod store;
pub mod transport;

pub use config::{ProtocolVariant, StrategyKind, TunerConfig};
pub use memory::{MemoryConnector, MemoryTransport};
pub use runner::{RunSummary, Tuner};
pub use session::{Session, SessionEnd, SessionReport, SessionSettings, SessionState};
pub use store::{read_export, ResultStore, TrialRecord};
pub use transport::{Connector, Transport, ZmqConnector, ZmqTransport};
