//! Tuner configuration.
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables. Every field has a default, so an empty file (or none) works.
//!
//! Example:
//! ```json
//! {
//!   "endpoint": "ipc:///tmp/rocksdb-memtable-switching-ipc",
//!   "strategy": "bayesian",
//!   "seed": 7,
//!   "variants": ["vector", "skiplist", "hash-skiplist"],
//!   "min_size_exp": 16,
//!   "max_size_exp": 24,
//!   "protocol": "flush_notice"
//! }
//! ```

use mt_optimizer::{
    BayesianSearch, GridSearch, ObjectiveDirection, RandomSearch, SearchOracle, SpaceBounds,
};
use mt_types::{config_error, MemtableVariant, SizeEncoding, TunerResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Names the JSON config file.
pub const CONFIG_ENV: &str = "MEMTUNE_CONFIG";
pub const ENDPOINT_ENV: &str = "MEMTUNE_ENDPOINT";
pub const RESULTS_DIR_ENV: &str = "MEMTUNE_RESULTS_DIR";
pub const SEED_ENV: &str = "MEMTUNE_SEED";
pub const MAX_SESSIONS_ENV: &str = "MEMTUNE_MAX_SESSIONS";

/// Where the engine binds its PAIR socket.
pub const DEFAULT_ENDPOINT: &str = "ipc:///tmp/rocksdb-memtable-switching-ipc";

/// Which search oracle drives each session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Grid,
    Random,
    #[default]
    Bayesian,
}

/// Message sequence the engine uses while reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// Each reply is a single telemetry message.
    #[default]
    Plain,
    /// Each telemetry message is preceded by a flush notice carrying the
    /// flush time in nanoseconds.
    FlushNotice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// ZeroMQ endpoint the engine's PAIR socket is bound to.
    pub endpoint: String,

    /// Where trial logs and per-session exports are written.
    pub results_dir: PathBuf,

    pub strategy: StrategyKind,

    /// Base oracle seed; session `n` uses `seed + n`.
    pub seed: u64,

    /// Exploration weight for Bayesian search (ignored otherwise).
    pub exploration_weight: f64,

    /// Number of steps per continuous dimension for grid search.
    pub grid_steps: usize,

    /// Memtable variants the oracle may choose from.
    pub variants: Vec<MemtableVariant>,

    /// Size exponent range for sized variants, inclusive.
    pub min_size_exp: u32,
    pub max_size_exp: u32,

    pub size_encoding: SizeEncoding,

    pub protocol: ProtocolVariant,

    /// Stop after this many sessions. `None` runs until interrupted.
    pub max_sessions: Option<usize>,

    /// Connection attempts per session, `0` meaning forever.
    pub connect_attempts: u32,

    /// Pause between connection attempts, and before reconnecting after a
    /// failed session.
    pub connect_backoff_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        let bounds = SpaceBounds::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            results_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("memtune"),
            strategy: StrategyKind::default(),
            seed: 0,
            exploration_weight: 0.3,
            grid_steps: 5,
            variants: bounds.variants,
            min_size_exp: bounds.min_exp,
            max_size_exp: bounds.max_exp,
            size_encoding: SizeEncoding::default(),
            protocol: ProtocolVariant::default(),
            max_sessions: None,
            connect_attempts: 0,
            connect_backoff_ms: 1000,
        }
    }
}

impl TunerConfig {
    /// Read a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> TunerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// File named by `MEMTUNE_CONFIG` (if set), then env overrides, validated.
    pub fn load() -> TunerResult<Self> {
        let base = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        let config = base.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> TunerResult<Self> {
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            self.endpoint = endpoint;
        }
        if let Some(dir) = lookup(RESULTS_DIR_ENV) {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup(SEED_ENV) {
            self.seed = seed
                .parse()
                .map_err(|_| config_error!("{SEED_ENV} must be an unsigned integer, got {seed:?}"))?;
        }
        if let Some(max) = lookup(MAX_SESSIONS_ENV) {
            let max: usize = max
                .parse()
                .map_err(|_| config_error!("{MAX_SESSIONS_ENV} must be an unsigned integer, got {max:?}"))?;
            self.max_sessions = Some(max);
        }
        Ok(self)
    }

    pub fn validate(&self) -> TunerResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(config_error!("endpoint must not be empty"));
        }
        if self.variants.is_empty() {
            return Err(config_error!("at least one memtable variant is required"));
        }
        if self.min_size_exp > self.max_size_exp {
            return Err(config_error!(
                "min_size_exp {} exceeds max_size_exp {}",
                self.min_size_exp,
                self.max_size_exp
            ));
        }
        if self.size_encoding == SizeEncoding::Bytes && self.max_size_exp >= 64 {
            return Err(config_error!("max_size_exp {} does not fit in 64-bit bytes", self.max_size_exp));
        }
        if !(0.0..=1.0).contains(&self.exploration_weight) {
            return Err(config_error!(
                "exploration_weight must lie in [0, 1], got {}",
                self.exploration_weight
            ));
        }
        if self.grid_steps == 0 {
            return Err(config_error!("grid_steps must be positive"));
        }
        Ok(())
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    pub fn with_variants(mut self, variants: Vec<MemtableVariant>) -> Self {
        self.variants = variants;
        self
    }

    pub fn space_bounds(&self) -> SpaceBounds {
        SpaceBounds {
            variants: self.variants.clone(),
            min_exp: self.min_size_exp,
            max_exp: self.max_size_exp,
        }
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    /// Fresh oracle for the `session_index`-th session.
    pub fn build_oracle(&self, session_index: u64) -> Box<dyn SearchOracle> {
        let seed = self.seed.wrapping_add(session_index);
        match self.strategy {
            StrategyKind::Grid => Box::new(GridSearch::new(self.grid_steps)),
            StrategyKind::Random => Box::new(RandomSearch::new(seed)),
            StrategyKind::Bayesian => Box::new(BayesianSearch::new(
                seed,
                self.exploration_weight,
                ObjectiveDirection::Minimize,
            )),
        }
    }
}
