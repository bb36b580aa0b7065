//! Memtable variants and the configuration the tuner hands to the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// In-memory write buffer implementations the engine can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemtableVariant {
    Vector,
    Skiplist,
    HashLinklist,
    HashSkiplist,
}

impl MemtableVariant {
    pub const ALL: [MemtableVariant; 4] = [
        MemtableVariant::Vector,
        MemtableVariant::Skiplist,
        MemtableVariant::HashLinklist,
        MemtableVariant::HashSkiplist,
    ];

    /// Wire name understood by the engine.
    pub fn as_str(self) -> &'static str {
        match self {
            MemtableVariant::Vector => "vector",
            MemtableVariant::Skiplist => "skiplist",
            MemtableVariant::HashLinklist => "hash-linklist",
            MemtableVariant::HashSkiplist => "hash-skiplist",
        }
    }

    /// Whether the engine needs a size alongside this variant.
    pub fn requires_size(self) -> bool {
        matches!(self, MemtableVariant::Vector)
    }
}

impl fmt::Display for MemtableVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemtableVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemtableVariant::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown memtable variant: {s}"))
    }
}

/// How a searched size exponent is rendered for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeEncoding {
    /// Send the exponent `n`; the engine allocates `2^n` bytes.
    #[default]
    Exponent,
    /// Send `2^n` directly.
    Bytes,
}

impl SizeEncoding {
    /// Wire value for exponent `exp`, or `None` if it does not fit in a u64.
    pub fn render(self, exp: u32) -> Option<u64> {
        match self {
            SizeEncoding::Exponent => Some(u64::from(exp)),
            SizeEncoding::Bytes => 1u64.checked_shl(exp),
        }
    }
}

/// A memtable choice proposed for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub variant: MemtableVariant,
    /// Size value exactly as it goes on the wire.
    pub size: Option<u64>,
}

impl Configuration {
    pub fn new(variant: MemtableVariant) -> Self {
        Self {
            variant,
            size: None,
        }
    }

    pub fn sized(variant: MemtableVariant, size: u64) -> Self {
        Self {
            variant,
            size: Some(size),
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "{}({size})", self.variant),
            None => write!(f, "{}", self.variant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_parse_back() {
        for variant in MemtableVariant::ALL {
            assert_eq!(variant.as_str().parse::<MemtableVariant>(), Ok(variant));
        }
        assert!("btree".parse::<MemtableVariant>().is_err());
    }

    #[test]
    fn only_vector_is_sized() {
        let sized: Vec<_> = MemtableVariant::ALL
            .into_iter()
            .filter(|v| v.requires_size())
            .collect();
        assert_eq!(sized, vec![MemtableVariant::Vector]);
    }

    #[test]
    fn size_encoding_renders_exponent_or_bytes() {
        assert_eq!(SizeEncoding::Exponent.render(24), Some(24));
        assert_eq!(SizeEncoding::Bytes.render(24), Some(16_777_216));
        assert_eq!(SizeEncoding::Bytes.render(64), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&MemtableVariant::HashLinklist).unwrap();
        assert_eq!(json, "\"hash-linklist\"");
    }
}
