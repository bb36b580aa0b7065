//! Observed operation mix and latency samples for one configuration interval.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::WorkloadError;

/// Kind of database operation the engine reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Insert,
    Update,
    PointDelete,
    RangeDelete,
    PointQuery,
    RangeQuery,
}

impl OpKind {
    /// Field order used by the engine's telemetry messages.
    pub const WIRE_ORDER: [OpKind; 6] = [
        OpKind::Insert,
        OpKind::Update,
        OpKind::PointDelete,
        OpKind::RangeDelete,
        OpKind::PointQuery,
        OpKind::RangeQuery,
    ];

    /// Order in which the pinned mix is declared in the search space.
    pub const SPACE_ORDER: [OpKind; 6] = [
        OpKind::Insert,
        OpKind::Update,
        OpKind::PointQuery,
        OpKind::RangeQuery,
        OpKind::PointDelete,
        OpKind::RangeDelete,
    ];

    /// Position of this op in wire order.
    pub fn index(self) -> usize {
        match self {
            OpKind::Insert => 0,
            OpKind::Update => 1,
            OpKind::PointDelete => 2,
            OpKind::RangeDelete => 3,
            OpKind::PointQuery => 4,
            OpKind::RangeQuery => 5,
        }
    }

    /// Name used for the pinned search parameter and export columns.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::PointDelete => "point_delete",
            OpKind::RangeDelete => "range_delete",
            OpKind::PointQuery => "point_query",
            OpKind::RangeQuery => "range_query",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Share of each operation in a workload, rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Percentages([f64; 6]);

impl Percentages {
    /// Build from values given in wire order.
    pub fn from_wire(values: [f64; 6]) -> Self {
        Self(values)
    }

    pub fn get(&self, op: OpKind) -> f64 {
        self.0[op.index()]
    }

    pub fn set(&mut self, op: OpKind, value: f64) {
        self.0[op.index()] = value;
    }

    /// Total of all shares, snapped to tenths so `0.3 * 3` reads as `0.9`.
    pub fn sum(&self) -> f64 {
        (self.0.iter().sum::<f64>() * 10.0).round() / 10.0
    }

    /// `(op, share)` pairs in search-space order.
    pub fn iter_space_order(&self) -> impl Iterator<Item = (OpKind, f64)> + '_ {
        OpKind::SPACE_ORDER.iter().map(move |op| (*op, self.get(*op)))
    }
}

/// Round every share to the nearest tenth. When that drifts the total
/// outside `[0.9, 1.1]` (a uniform six-way mix rounds to 1.2), the tenths are
/// split by largest remainder instead, ties going to the op that comes first
/// in wire order.
fn round_to_tenths(counts: &[f64; 6], total: f64) -> [f64; 6] {
    let exact = counts.map(|count| count / total * 10.0);
    let rounded = exact.map(|tenths| tenths.round() as u32);
    let sum: u32 = rounded.iter().sum();
    let tenths = if (9..=11).contains(&sum) {
        rounded
    } else {
        apportion_tenths(&exact)
    };
    tenths.map(|t| f64::from(t) / 10.0)
}

fn apportion_tenths(exact: &[f64; 6]) -> [u32; 6] {
    let mut tenths = [0u32; 6];
    let mut remainders = Vec::with_capacity(6);
    for (i, value) in exact.iter().enumerate() {
        let floor = value.floor();
        tenths[i] = floor as u32;
        remainders.push((value - floor, i));
    }

    let assigned: u32 = tenths.iter().sum();
    let missing = 10u32.saturating_sub(assigned) as usize;
    remainders.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    for (_, i) in remainders.into_iter().take(missing) {
        tenths[i] += 1;
    }
    tenths
}

/// One interval of engine telemetry: per-op counts and latency samples (ns).
///
/// Immutable once decoded; the next telemetry message produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    counts: [f64; 6],
    latencies: [Vec<u64>; 6],
}

impl Workload {
    /// Build a workload from wire-ordered counts and latency groups.
    ///
    /// Counts must be finite and non-negative.
    pub fn new(counts: [f64; 6], latencies: [Vec<u64>; 6]) -> Option<Self> {
        if counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return None;
        }
        Some(Self { counts, latencies })
    }

    pub fn count(&self, op: OpKind) -> f64 {
        self.counts[op.index()]
    }

    pub fn latencies(&self, op: OpKind) -> &[u64] {
        &self.latencies[op.index()]
    }

    pub fn total_ops(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Sum of every latency sample across all operations.
    pub fn total_latency(&self) -> u64 {
        self.latencies
            .iter()
            .flat_map(|samples| samples.iter())
            .fold(0u64, |acc, sample| acc.saturating_add(*sample))
    }

    pub fn sample_count(&self) -> usize {
        self.latencies.iter().map(Vec::len).sum()
    }

    /// Operation mix rounded to one decimal place.
    ///
    /// Undefined for an empty interval: pinning a guessed mix would poison
    /// every trial recorded afterwards.
    pub fn percentages(&self) -> Result<Percentages, WorkloadError> {
        let total = self.total_ops();
        if total <= 0.0 {
            return Err(WorkloadError::Undefined);
        }
        Ok(Percentages(round_to_tenths(&self.counts, total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(counts: [f64; 6]) -> Workload {
        Workload::new(counts, Default::default()).unwrap()
    }

    #[test]
    fn percentages_round_to_one_decimal() {
        let w = workload([1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        let pct = w.percentages().unwrap();
        assert_eq!(pct.get(OpKind::Insert), 0.3);
        assert_eq!(pct.get(OpKind::Update), 0.7);
    }

    #[test]
    fn percentages_sum_stays_near_one() {
        let mixes = [
            [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 0.0, 0.0, 0.0],
            [7.0, 3.0, 5.0, 11.0, 13.0, 2.0],
            [25.0, 25.0, 0.0, 0.0, 50.0, 0.0],
            [999.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            [0.05, 0.05, 0.05, 0.05, 0.05, 0.05],
        ];
        for counts in mixes {
            let sum = workload(counts).percentages().unwrap().sum();
            assert!((0.9..=1.1).contains(&sum), "sum {sum} out of bounds for {counts:?}");
        }
    }

    #[test]
    fn rounding_is_kept_when_the_sum_stays_in_bounds() {
        let pct = workload([34.0, 33.0, 33.0, 0.0, 0.0, 0.0]).percentages().unwrap();
        assert_eq!(pct.get(OpKind::Insert), 0.3);
        assert_eq!(pct.get(OpKind::Update), 0.3);
        assert_eq!(pct.get(OpKind::PointDelete), 0.3);
        assert!((pct.sum() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn uniform_mix_breaks_ties_in_wire_order() {
        let pct = workload([1.0; 6]).percentages().unwrap();
        assert_eq!(pct.get(OpKind::Insert), 0.2);
        assert_eq!(pct.get(OpKind::RangeDelete), 0.2);
        assert_eq!(pct.get(OpKind::PointQuery), 0.1);
        assert_eq!(pct.get(OpKind::RangeQuery), 0.1);
        assert!((pct.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_workload_has_no_percentages() {
        let w = workload([0.0; 6]);
        assert_eq!(w.percentages(), Err(WorkloadError::Undefined));
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(Workload::new([1.0, -1.0, 0.0, 0.0, 0.0, 0.0], Default::default()).is_none());
        assert!(Workload::new([f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0], Default::default()).is_none());
    }

    #[test]
    fn total_latency_spans_all_ops() {
        let w = Workload::new(
            [2.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [vec![10, 20], vec![], vec![], vec![], vec![5], vec![]],
        )
        .unwrap();
        assert_eq!(w.total_latency(), 35);
        assert_eq!(w.sample_count(), 3);
        assert_eq!(w.latencies(OpKind::PointQuery), &[5]);
    }

    #[test]
    fn space_order_differs_from_wire_order() {
        let pct = Percentages::from_wire([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let ordered: Vec<f64> = pct.iter_space_order().map(|(_, v)| v).collect();
        assert_eq!(ordered, vec![0.1, 0.2, 0.5, 0.6, 0.3, 0.4]);
    }
}
