use thiserror::Error;

/// Main error type for the memtune system
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Workload error: {0}")]
    Workload(#[from] WorkloadError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire messages from the engine that cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Malformed telemetry: expected {expected} {segment}, found {found} in {message:?}")]
    FieldCount {
        segment: &'static str,
        expected: usize,
        found: usize,
        message: String,
    },

    #[error("Malformed telemetry: invalid {field} value {value:?}")]
    InvalidNumber { field: String, value: String },

    #[error("Malformed configuration message: {message:?}")]
    InvalidConfiguration { message: String },

    #[error("Malformed flush notice: {message:?}")]
    InvalidFlushNotice { message: String },
}

/// Workload-derived quantities that are not defined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("Undefined workload: operation mix is empty (total ops = 0)")]
    Undefined,
}

/// Failures of the point-to-point link to the engine.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {endpoint} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("peer closed the channel")]
    Closed,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("channel I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The engine did not open the session with the synchronize token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("expected {expected:?} from engine, received {received:?}")]
    UnexpectedToken { expected: String, received: String },

    #[error("engine terminated before the handshake completed ({token:?})")]
    Terminated { token: String },
}

/// Misuse of the optimizer driver or an unusable oracle proposal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptimizerError {
    #[error("trial {in_flight} is still in flight")]
    TrialInFlight { in_flight: usize },

    #[error("unknown or stale trial handle: {trial}")]
    UnknownTrial { trial: usize },

    #[error("search space has no candidates for parameter {parameter}")]
    EmptyDimension { parameter: String },

    #[error("oracle proposal is missing parameter {parameter}")]
    MissingParameter { parameter: String },

    #[error("oracle proposed invalid value for {parameter}: {value}")]
    InvalidProposal { parameter: String, value: String },
}

/// Result type alias for memtune operations
pub type TunerResult<T> = Result<T, TunerError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TunerError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TunerError::Config(format!($($arg)*))
    };
}
