//! Search space definitions and the oracles that sample from them.

use mt_types::OptimizerError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::trial::ObjectiveDirection;

/// One concrete point drawn from a [`SearchSpace`], keyed by parameter name.
pub type Params = HashMap<String, ParameterValue>;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name (e.g. "memtable").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
    /// Only sample this parameter when an earlier one took a listed value.
    pub condition: Option<Condition>,
}

impl ParameterDef {
    /// A float range whose bounds coincide carries context, not choice.
    pub fn pinned_value(&self) -> Option<f64> {
        match self.kind {
            ParameterKind::FloatRange { low, high } if low == high => Some(low),
            _ => None,
        }
    }

    /// Whether the condition (if any) holds for the values drawn so far.
    pub fn is_active(&self, drawn: &Params) -> bool {
        match &self.condition {
            None => true,
            Some(cond) => match drawn.get(&cond.parameter) {
                Some(ParameterValue::Json(v)) => cond.one_of.contains(v),
                _ => false,
            },
        }
    }
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// Gate on the value of a previously declared categorical parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub parameter: String,
    pub one_of: Vec<serde_json::Value>,
}

/// A concrete parameter value produced by a search oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
///
/// Order matters: a conditional parameter must come after the parameter its
/// condition refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    fn push(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind,
            condition: None,
        });
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.push(name, ParameterKind::FloatRange { low, high })
    }

    /// Declare a float whose lower and upper bound are both `value`.
    pub fn add_pinned(self, name: impl Into<String>, value: f64) -> Self {
        self.add_float(name, value, value)
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.push(name, ParameterKind::IntRange { low, high })
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.push(name, ParameterKind::Choice { values })
    }

    /// Make the most recently added parameter conditional.
    pub fn only_when(mut self, parameter: impl Into<String>, one_of: Vec<serde_json::Value>) -> Self {
        if let Some(last) = self.parameters.last_mut() {
            last.condition = Some(Condition {
                parameter: parameter.into(),
                one_of,
            });
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// `(name, value)` for every pinned parameter, in declaration order.
    pub fn pinned_values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.parameters
            .iter()
            .filter_map(|p| p.pinned_value().map(|v| (p.name.as_str(), v)))
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_param<R: Rng>(rng: &mut R, param: &ParameterDef) -> Result<ParameterValue, OptimizerError> {
    let empty = || OptimizerError::EmptyDimension {
        parameter: param.name.clone(),
    };
    let value = match &param.kind {
        ParameterKind::FloatRange { low, high } if low == high => ParameterValue::Float(*low),
        ParameterKind::FloatRange { low, high } => {
            if !(low < high) {
                return Err(empty());
            }
            ParameterValue::Float(rng.gen_range(*low..=*high))
        }
        ParameterKind::IntRange { low, high } => {
            if low > high {
                return Err(empty());
            }
            ParameterValue::Int(rng.gen_range(*low..=*high))
        }
        ParameterKind::Choice { values } => {
            if values.is_empty() {
                return Err(empty());
            }
            ParameterValue::Json(values[rng.gen_range(0..values.len())].clone())
        }
    };
    Ok(value)
}

/// Independent draw of every active parameter.
fn sample_space<R: Rng>(rng: &mut R, space: &SearchSpace) -> Result<Params, OptimizerError> {
    let mut params = Params::new();
    for param in &space.parameters {
        if param.is_active(&params) {
            let value = sample_param(rng, param)?;
            params.insert(param.name.clone(), value);
        }
    }
    Ok(params)
}

// ---------------------------------------------------------------------------
// Search oracles
// ---------------------------------------------------------------------------

/// Black-box parameter search: proposes points and learns from outcomes.
///
/// The space may change between calls (pinned context moves with the
/// observed workload); implementations must honor whatever space they are
/// handed.
pub trait SearchOracle: Send {
    /// Draw one point from `space`.
    fn ask(&mut self, space: &SearchSpace) -> Result<Params, OptimizerError>;

    /// Report the objective observed for a previously proposed point.
    fn tell(&mut self, _params: &Params, _objective: f64) {}

    /// Human-readable oracle name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// Exhaustive grid search over the free dimensions, cycling once exhausted.
#[derive(Debug, Clone)]
pub struct GridSearch {
    /// Number of steps for continuous dimensions.
    float_steps: usize,
    cursor: usize,
}

impl GridSearch {
    pub fn new(float_steps: usize) -> Self {
        Self {
            float_steps,
            cursor: 0,
        }
    }

    fn axis(param: &ParameterDef, float_steps: usize) -> Vec<ParameterValue> {
        match &param.kind {
            ParameterKind::FloatRange { low, high } if low == high => {
                vec![ParameterValue::Float(*low)]
            }
            ParameterKind::FloatRange { low, high } => {
                let steps = float_steps.max(2);
                (0..steps)
                    .map(|i| {
                        let t = i as f64 / (steps - 1) as f64;
                        ParameterValue::Float(low + t * (high - low))
                    })
                    .collect()
            }
            ParameterKind::IntRange { low, high } => (*low..=*high).map(ParameterValue::Int).collect(),
            ParameterKind::Choice { values } => values
                .iter()
                .map(|v| ParameterValue::Json(v.clone()))
                .collect(),
        }
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Result<Vec<Params>, OptimizerError> {
        let mut result: Vec<Params> = vec![Params::new()];
        for param in &space.parameters {
            let axis = Self::axis(param, float_steps);
            if axis.is_empty() {
                return Err(OptimizerError::EmptyDimension {
                    parameter: param.name.clone(),
                });
            }
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in result {
                if !param.is_active(&existing) {
                    next.push(existing);
                    continue;
                }
                for value in &axis {
                    let mut combo = existing.clone();
                    combo.insert(param.name.clone(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        Ok(result)
    }
}

impl SearchOracle for GridSearch {
    fn ask(&mut self, space: &SearchSpace) -> Result<Params, OptimizerError> {
        let mut grid = Self::build_grid(space, self.float_steps)?;
        let idx = self.cursor % grid.len();
        self.cursor += 1;
        Ok(grid.swap_remove(idx))
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent seeded sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SearchOracle for RandomSearch {
    fn ask(&mut self, space: &SearchSpace) -> Result<Params, OptimizerError> {
        sample_space(&mut self.rng, space)
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search (surrogate-model stub) ----

/// Bayesian-style optimization using a simple surrogate heuristic.
///
/// Tracks observed (params, objective) pairs. With probability
/// `exploration_weight` it samples uniformly; otherwise it perturbs the best
/// point observed under the pinned context closest to the current one, so a
/// memtable that won under a read-heavy mix is not blindly reused when the
/// mix turns write-heavy.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    rng: ChaCha8Rng,
    observations: Vec<(Params, f64)>,
    exploration_weight: f64,
    direction: ObjectiveDirection,
}

impl BayesianSearch {
    pub fn new(seed: u64, exploration_weight: f64, direction: ObjectiveDirection) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            observations: Vec::new(),
            exploration_weight,
            direction,
        }
    }

    pub fn observations(&self) -> usize {
        self.observations.len()
    }

    fn context_distance(space: &SearchSpace, params: &Params) -> f64 {
        space
            .pinned_values()
            .map(|(name, value)| match params.get(name) {
                Some(ParameterValue::Float(seen)) => (seen - value).abs(),
                _ => 1.0,
            })
            .sum()
    }

    /// Best observation among those recorded under the nearest context.
    fn best_base(&self, space: &SearchSpace) -> Option<&Params> {
        let distances: Vec<f64> = self
            .observations
            .iter()
            .map(|(params, _)| Self::context_distance(space, params))
            .collect();
        let nearest = distances.iter().copied().fold(f64::INFINITY, f64::min);

        self.observations
            .iter()
            .zip(distances.iter())
            .filter(|(_, d)| **d <= nearest + 1e-9)
            .map(|(obs, _)| obs)
            .fold(None::<&(Params, f64)>, |best, candidate| match best {
                Some(b) if !self.direction.is_better(candidate.1, b.1) => Some(b),
                _ => Some(candidate),
            })
            .map(|(params, _)| params)
    }

    /// Exploitation: perturb the best-known point for this context.
    fn exploit(&mut self, space: &SearchSpace) -> Result<Params, OptimizerError> {
        let base = match self.best_base(space) {
            Some(params) => params.clone(),
            None => return sample_space(&mut self.rng, space),
        };

        let mut perturbed = Params::new();
        for param in &space.parameters {
            if !param.is_active(&perturbed) {
                continue;
            }
            let value = match (&param.kind, base.get(&param.name)) {
                (ParameterKind::FloatRange { low, high }, _) if low == high => ParameterValue::Float(*low),
                (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                    let range = high - low;
                    let noise = self.rng.gen_range(-0.1..0.1) * range;
                    ParameterValue::Float((v + noise).clamp(*low, *high))
                }
                (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) if low <= high => {
                    let delta: i64 = self.rng.gen_range(-2..=2);
                    ParameterValue::Int((v + delta).clamp(*low, *high))
                }
                (ParameterKind::Choice { values }, Some(ParameterValue::Json(v))) if values.contains(v) => {
                    ParameterValue::Json(v.clone())
                }
                // Fall back to random for missing or out-of-space base values
                _ => sample_param(&mut self.rng, param)?,
            };
            perturbed.insert(param.name.clone(), value);
        }

        Ok(perturbed)
    }
}

impl SearchOracle for BayesianSearch {
    fn ask(&mut self, space: &SearchSpace) -> Result<Params, OptimizerError> {
        if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight {
            sample_space(&mut self.rng, space)
        } else {
            self.exploit(space)
        }
    }

    fn tell(&mut self, params: &Params, objective: f64) {
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_pinned("insert", 0.5)
            .add_pinned("point_query", 0.5)
            .add_choice("memtable", vec![json!("vector"), json!("skiplist")])
            .add_int("size_exp", 16, 20)
            .only_when("memtable", vec![json!("vector")])
    }

    fn memtable(params: &Params) -> &str {
        match params.get("memtable") {
            Some(ParameterValue::Json(v)) => v.as_str().unwrap(),
            other => panic!("unexpected memtable value: {other:?}"),
        }
    }

    #[test]
    fn pinned_parameters_always_take_their_value() {
        let space = sample_space();
        let mut rs = RandomSearch::new(7);
        for _ in 0..50 {
            let params = rs.ask(&space).unwrap();
            assert_eq!(params.get("insert"), Some(&ParameterValue::Float(0.5)));
            assert_eq!(params.get("point_query"), Some(&ParameterValue::Float(0.5)));
        }
    }

    #[test]
    fn conditional_parameter_follows_its_gate() {
        let space = sample_space();
        let mut rs = RandomSearch::new(11);
        let mut saw_vector = false;
        let mut saw_skiplist = false;
        for _ in 0..100 {
            let params = rs.ask(&space).unwrap();
            match memtable(&params) {
                "vector" => {
                    saw_vector = true;
                    match params.get("size_exp") {
                        Some(ParameterValue::Int(v)) => assert!((16..=20).contains(v)),
                        other => panic!("unexpected size_exp value: {other:?}"),
                    }
                }
                "skiplist" => {
                    saw_skiplist = true;
                    assert!(params.get("size_exp").is_none());
                }
                other => panic!("unexpected memtable {other}"),
            }
        }
        assert!(saw_vector && saw_skiplist);
    }

    #[test]
    fn random_search_is_reproducible_for_a_seed() {
        let space = sample_space();
        let mut a = RandomSearch::new(42);
        let mut b = RandomSearch::new(42);
        for _ in 0..20 {
            assert_eq!(a.ask(&space).unwrap(), b.ask(&space).unwrap());
        }
    }

    #[test]
    fn grid_search_cycles_over_free_dimensions() {
        let space = sample_space();
        // vector x 5 sizes + skiplist
        let mut gs = GridSearch::new(5);
        let first: Vec<Params> = (0..6).map(|_| gs.ask(&space).unwrap()).collect();
        let vectors = first.iter().filter(|p| memtable(p) == "vector").count();
        assert_eq!(vectors, 5);
        assert_eq!(first.len() - vectors, 1);

        let seventh = gs.ask(&space).unwrap();
        assert_eq!(seventh, first[0]);
    }

    #[test]
    fn empty_choice_is_an_error() {
        let space = SearchSpace::new().add_choice("memtable", vec![]);
        assert!(matches!(
            RandomSearch::new(1).ask(&space),
            Err(OptimizerError::EmptyDimension { .. })
        ));
        assert!(matches!(
            GridSearch::new(2).ask(&space),
            Err(OptimizerError::EmptyDimension { .. })
        ));
    }

    #[test]
    fn bayesian_search_starts_with_exploration() {
        let space = sample_space();
        let mut bs = BayesianSearch::new(3, 0.3, ObjectiveDirection::Minimize);
        let params = bs.ask(&space).unwrap();
        assert!(params.contains_key("memtable"));
        assert_eq!(bs.observations(), 0);
    }

    #[test]
    fn bayesian_search_exploits_the_lowest_objective() {
        let space = sample_space();
        // exploration_weight=0 -> always exploit after a report
        let mut bs = BayesianSearch::new(5, 0.0, ObjectiveDirection::Minimize);

        let mut good = Params::new();
        good.insert("insert".into(), ParameterValue::Float(0.5));
        good.insert("point_query".into(), ParameterValue::Float(0.5));
        good.insert("memtable".into(), ParameterValue::Json(json!("skiplist")));
        let mut bad = good.clone();
        bad.insert("memtable".into(), ParameterValue::Json(json!("vector")));
        bad.insert("size_exp".into(), ParameterValue::Int(18));

        bs.tell(&good, 100.0);
        bs.tell(&bad, 900.0);

        for _ in 0..20 {
            let params = bs.ask(&space).unwrap();
            assert_eq!(memtable(&params), "skiplist");
        }
    }

    #[test]
    fn bayesian_search_prefers_the_nearest_context() {
        let mut bs = BayesianSearch::new(9, 0.0, ObjectiveDirection::Minimize);

        let mut write_heavy = Params::new();
        write_heavy.insert("insert".into(), ParameterValue::Float(0.9));
        write_heavy.insert("point_query".into(), ParameterValue::Float(0.1));
        write_heavy.insert("memtable".into(), ParameterValue::Json(json!("vector")));
        write_heavy.insert("size_exp".into(), ParameterValue::Int(20));

        let mut read_heavy = Params::new();
        read_heavy.insert("insert".into(), ParameterValue::Float(0.1));
        read_heavy.insert("point_query".into(), ParameterValue::Float(0.9));
        read_heavy.insert("memtable".into(), ParameterValue::Json(json!("skiplist")));

        bs.tell(&write_heavy, 50.0);
        bs.tell(&read_heavy, 500.0);

        let space = SearchSpace::new()
            .add_pinned("insert", 0.1)
            .add_pinned("point_query", 0.9)
            .add_choice("memtable", vec![json!("vector"), json!("skiplist")])
            .add_int("size_exp", 16, 20)
            .only_when("memtable", vec![json!("vector")]);

        let params = bs.ask(&space).unwrap();
        assert_eq!(memtable(&params), "skiplist");
    }

    #[test]
    fn pinned_values_in_declaration_order() {
        let space = sample_space();
        let pinned: Vec<_> = space.pinned_values().collect();
        assert_eq!(pinned, vec![("insert", 0.5), ("point_query", 0.5)]);
    }
}
