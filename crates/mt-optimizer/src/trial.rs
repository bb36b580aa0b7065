//! Trial records: one propose-apply-observe cycle each.

use chrono::{DateTime, Utc};
use mt_types::{Configuration, Percentages};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::Params;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    /// Objectives are aggregate latencies, so lower wins.
    fn default() -> Self {
        Self::Minimize
    }
}

impl ObjectiveDirection {
    /// Whether `candidate` strictly improves on `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ObjectiveDirection::Maximize => candidate > incumbent,
            ObjectiveDirection::Minimize => candidate < incumbent,
        }
    }
}

/// Identifies the single trial currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialHandle(pub(crate) usize);

impl TrialHandle {
    pub fn number(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for TrialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// The engine reported the interval that followed the configuration.
    Scored { objective: f64 },
    /// The session ended before a result arrived; the oracle was not told.
    Abandoned,
}

/// A finished trial. Built once by the driver and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub number: usize,
    /// Workload mix the configuration was proposed under.
    pub pinned: Percentages,
    pub configuration: Configuration,
    /// Raw oracle proposal.
    pub parameters: Params,
    pub outcome: TrialOutcome,
    pub proposed_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Trial {
    pub fn objective(&self) -> Option<f64> {
        match self.outcome {
            TrialOutcome::Scored { objective } => Some(objective),
            TrialOutcome::Abandoned => None,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self.outcome, TrialOutcome::Abandoned)
    }
}

/// A proposal that has been handed out but not yet resolved.
#[derive(Debug, Clone)]
pub(crate) struct PendingTrial {
    pub number: usize,
    pub pinned: Percentages,
    pub configuration: Configuration,
    pub parameters: Params,
    pub proposed_at: DateTime<Utc>,
}

impl PendingTrial {
    pub fn finish(self, outcome: TrialOutcome) -> Trial {
        Trial {
            id: Uuid::new_v4(),
            number: self.number,
            pinned: self.pinned,
            configuration: self.configuration,
            parameters: self.parameters,
            outcome,
            proposed_at: self.proposed_at,
            finished_at: Utc::now(),
        }
    }
}
