//! Text wire format shared with the engine.
//!
//! Telemetry: `"<c1>,..,<c6>;<l1>:..:<l6>"` with counts and latency groups in
//! [`OpKind::WIRE_ORDER`]. Configuration: `"<variant>;<sizeOrEmpty>"`.

use crate::errors::TelemetryError;
use crate::memtable::{Configuration, MemtableVariant};
use crate::workload::{OpKind, Workload};

/// Sent by the engine to open a session.
pub const SYN: &str = "syn";
/// Tuner reply to [`SYN`].
pub const ACK: &str = "ack";
/// Sentinels the engine sends instead of telemetry when it is done.
pub const TERMINATION_TOKENS: [&str; 2] = ["shutdown", "end"];

const SEGMENT_SEPARATOR: char = ';';
const GROUP_SEPARATOR: char = ':';
const FIELD_SEPARATOR: char = ',';
const FIELDS: usize = 6;

/// A decoded engine message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Telemetry(Workload),
    Terminate,
}

pub fn is_termination(message: &str) -> bool {
    TERMINATION_TOKENS.contains(&message)
}

/// Decode one telemetry message.
pub fn decode(message: &str) -> Result<Message, TelemetryError> {
    if is_termination(message) {
        return Ok(Message::Terminate);
    }

    let segments: Vec<&str> = message.split(SEGMENT_SEPARATOR).collect();
    if segments.len() != 2 {
        return Err(field_count("segments", segments.len(), 2, message));
    }

    let count_fields: Vec<&str> = segments[0].split(FIELD_SEPARATOR).collect();
    if count_fields.len() != FIELDS {
        return Err(field_count("counts", count_fields.len(), FIELDS, message));
    }
    let mut counts = [0.0; FIELDS];
    for (i, field) in count_fields.iter().enumerate() {
        counts[i] = parse_count(OpKind::WIRE_ORDER[i], field)?;
    }

    let latencies = decode_latencies(segments[1], message)?;

    let workload = Workload::new(counts, latencies).ok_or_else(|| TelemetryError::InvalidNumber {
        field: "counts".to_string(),
        value: segments[0].to_string(),
    })?;
    Ok(Message::Telemetry(workload))
}

/// Latency groups are `:`-separated lists of samples. Older engines report a
/// single aggregate per op instead, as six `,`-separated fields with no `:`.
fn decode_latencies(segment: &str, message: &str) -> Result<[Vec<u64>; FIELDS], TelemetryError> {
    let mut latencies: [Vec<u64>; FIELDS] = Default::default();

    if !segment.contains(GROUP_SEPARATOR) {
        let fields: Vec<&str> = segment.split(FIELD_SEPARATOR).collect();
        if fields.len() != FIELDS {
            return Err(field_count("latency fields", fields.len(), FIELDS, message));
        }
        for (i, field) in fields.iter().enumerate() {
            if !field.is_empty() {
                latencies[i].push(parse_sample(OpKind::WIRE_ORDER[i], field)?);
            }
        }
        return Ok(latencies);
    }

    let groups: Vec<&str> = segment.split(GROUP_SEPARATOR).collect();
    if groups.len() != FIELDS {
        return Err(field_count("latency groups", groups.len(), FIELDS, message));
    }
    for (i, group) in groups.iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let op = OpKind::WIRE_ORDER[i];
        latencies[i] = group
            .split(FIELD_SEPARATOR)
            .map(|sample| parse_sample(op, sample))
            .collect::<Result<_, _>>()?;
    }
    Ok(latencies)
}

fn parse_count(op: OpKind, field: &str) -> Result<f64, TelemetryError> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| TelemetryError::InvalidNumber {
            field: format!("{op} count"),
            value: field.to_string(),
        })
}

fn parse_sample(op: OpKind, field: &str) -> Result<u64, TelemetryError> {
    field
        .trim()
        .parse::<u64>()
        .map_err(|_| TelemetryError::InvalidNumber {
            field: format!("{op} latency"),
            value: field.to_string(),
        })
}

fn field_count(segment: &'static str, found: usize, expected: usize, message: &str) -> TelemetryError {
    TelemetryError::FieldCount {
        segment,
        expected,
        found,
        message: message.to_string(),
    }
}

/// Render a configuration for the engine.
pub fn encode_configuration(config: &Configuration) -> String {
    match config.size {
        Some(size) => format!("{}{SEGMENT_SEPARATOR}{size}", config.variant),
        None => format!("{}{SEGMENT_SEPARATOR}", config.variant),
    }
}

/// Parse a configuration message as the engine reads it.
pub fn decode_configuration(message: &str) -> Result<Configuration, TelemetryError> {
    let invalid = || TelemetryError::InvalidConfiguration {
        message: message.to_string(),
    };

    let (variant, size) = message.split_once(SEGMENT_SEPARATOR).ok_or_else(invalid)?;
    let variant: MemtableVariant = variant.parse().map_err(|_| invalid())?;
    let size = if size.is_empty() {
        None
    } else {
        Some(size.parse::<u64>().map_err(|_| invalid())?)
    };

    Ok(Configuration { variant, size })
}

/// Parse a flush acknowledgment carrying the flush time in nanoseconds.
pub fn decode_flush_notice(message: &str) -> Result<u64, TelemetryError> {
    message
        .trim()
        .parse::<u64>()
        .map_err(|_| TelemetryError::InvalidFlushNotice {
            message: message.to_string(),
        })
}
