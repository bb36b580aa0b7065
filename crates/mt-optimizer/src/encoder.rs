//! Builds the per-trial search space from an observed workload.
//!
//! The operation mix is pinned (lower bound == upper bound) so the oracle
//! records it with every trial without being able to search over it. Only
//! the memtable variant and, for sized variants, the size exponent are free.

use mt_types::{
    Configuration, MemtableVariant, OpKind, OptimizerError, Percentages, SizeEncoding, Workload,
    WorkloadError,
};
use serde::{Deserialize, Serialize};

use crate::search::{ParameterValue, Params, SearchSpace};

/// Categorical parameter holding the memtable variant.
pub const MEMTABLE_PARAM: &str = "memtable";
/// Integer parameter holding the size exponent of sized variants.
pub const SIZE_EXP_PARAM: &str = "size_exp";

/// Fixed bounds of the free dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceBounds {
    pub variants: Vec<MemtableVariant>,
    pub min_exp: u32,
    pub max_exp: u32,
}

impl Default for SpaceBounds {
    fn default() -> Self {
        Self {
            variants: MemtableVariant::ALL.to_vec(),
            min_exp: 16,
            max_exp: 24,
        }
    }
}

/// Search space for the next trial under `workload`.
pub fn build_space(workload: &Workload, bounds: &SpaceBounds) -> Result<SearchSpace, WorkloadError> {
    let percentages = workload.percentages()?;

    let mut space = SearchSpace::new();
    for (op, share) in percentages.iter_space_order() {
        space = space.add_pinned(op.name(), share);
    }

    space = space.add_choice(
        MEMTABLE_PARAM,
        bounds.variants.iter().map(|v| serde_json::json!(v.as_str())).collect(),
    );

    let sized: Vec<serde_json::Value> = bounds
        .variants
        .iter()
        .filter(|v| v.requires_size())
        .map(|v| serde_json::json!(v.as_str()))
        .collect();
    if !sized.is_empty() {
        space = space
            .add_int(SIZE_EXP_PARAM, i64::from(bounds.min_exp), i64::from(bounds.max_exp))
            .only_when(MEMTABLE_PARAM, sized);
    }

    Ok(space)
}

/// Recover the pinned operation mix from a space built by [`build_space`].
pub fn pinned_percentages(space: &SearchSpace) -> Percentages {
    let mut pct = Percentages::default();
    for (name, value) in space.pinned_values() {
        if let Some(op) = OpKind::SPACE_ORDER.iter().find(|op| op.name() == name) {
            pct.set(*op, value);
        }
    }
    pct
}

/// Turn an oracle proposal into the configuration sent to the engine.
pub fn configuration_from(params: &Params, encoding: SizeEncoding) -> Result<Configuration, OptimizerError> {
    let variant = match params.get(MEMTABLE_PARAM) {
        Some(ParameterValue::Json(serde_json::Value::String(name))) => {
            name.parse::<MemtableVariant>()
                .map_err(|_| OptimizerError::InvalidProposal {
                    parameter: MEMTABLE_PARAM.to_string(),
                    value: name.clone(),
                })?
        }
        Some(other) => {
            return Err(OptimizerError::InvalidProposal {
                parameter: MEMTABLE_PARAM.to_string(),
                value: other.to_string(),
            })
        }
        None => {
            return Err(OptimizerError::MissingParameter {
                parameter: MEMTABLE_PARAM.to_string(),
            })
        }
    };

    if !variant.requires_size() {
        return Ok(Configuration::new(variant));
    }

    let exp = match params.get(SIZE_EXP_PARAM) {
        Some(ParameterValue::Int(exp)) => *exp,
        Some(other) => {
            return Err(OptimizerError::InvalidProposal {
                parameter: SIZE_EXP_PARAM.to_string(),
                value: other.to_string(),
            })
        }
        None => {
            return Err(OptimizerError::MissingParameter {
                parameter: SIZE_EXP_PARAM.to_string(),
            })
        }
    };

    let size = u32::try_from(exp)
        .ok()
        .and_then(|exp| encoding.render(exp))
        .ok_or_else(|| OptimizerError::InvalidProposal {
            parameter: SIZE_EXP_PARAM.to_string(),
            value: exp.to_string(),
        })?;

    Ok(Configuration::sized(variant, size))
}
