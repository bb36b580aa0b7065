//! # mt-optimizer
//!
//! Search-space encoding, search oracles and the ask/tell driver for memtune.
//!
//! The observed operation mix is pinned into every search space so each
//! trial carries its workload context, while the oracle only explores the
//! memtable variant and size. Oracles are seeded and reproducible.

mod driver;
mod encoder;
mod search;
mod trial;

pub use driver::OptimizerDriver;
pub use encoder::{
    build_space, configuration_from, pinned_percentages, SpaceBounds, MEMTABLE_PARAM,
    SIZE_EXP_PARAM,
};
pub use search::{
    BayesianSearch, Condition, GridSearch, ParameterDef, ParameterKind, ParameterValue, Params,
    RandomSearch, SearchOracle, SearchSpace,
};
pub use trial::{ObjectiveDirection, Trial, TrialHandle, TrialOutcome};
