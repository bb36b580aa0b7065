//! Ask/tell driver around a [`SearchOracle`], owning the trial history.

use chrono::Utc;
use mt_types::{Configuration, OptimizerError, SizeEncoding};
use tracing::{debug, info};

use crate::encoder::{configuration_from, pinned_percentages};
use crate::search::{SearchOracle, SearchSpace};
use crate::trial::{ObjectiveDirection, PendingTrial, Trial, TrialHandle, TrialOutcome};

/// Drives one oracle through a strictly sequential ask/tell cycle.
///
/// At most one trial is in flight; the engine applies a configuration and
/// reports back before the next one may be proposed.
pub struct OptimizerDriver {
    oracle: Box<dyn SearchOracle>,
    encoding: SizeEncoding,
    direction: ObjectiveDirection,
    history: Vec<Trial>,
    in_flight: Option<PendingTrial>,
    next_number: usize,
}

impl OptimizerDriver {
    pub fn new(oracle: Box<dyn SearchOracle>, encoding: SizeEncoding) -> Self {
        Self {
            oracle,
            encoding,
            direction: ObjectiveDirection::Minimize,
            history: Vec::new(),
            in_flight: None,
            next_number: 0,
        }
    }

    /// Propose the next configuration to try under `space`.
    pub fn ask(&mut self, space: &SearchSpace) -> Result<(TrialHandle, Configuration), OptimizerError> {
        if let Some(pending) = &self.in_flight {
            return Err(OptimizerError::TrialInFlight {
                in_flight: pending.number,
            });
        }

        let parameters = self.oracle.ask(space)?;
        let configuration = configuration_from(&parameters, self.encoding)?;
        let number = self.next_number;
        self.next_number += 1;

        debug!(trial = number, oracle = self.oracle.name(), ?parameters, "oracle proposal");

        self.in_flight = Some(PendingTrial {
            number,
            pinned: pinned_percentages(space),
            configuration,
            parameters,
            proposed_at: Utc::now(),
        });

        Ok((TrialHandle(number), configuration))
    }

    /// Record the objective for the in-flight trial and inform the oracle.
    pub fn tell(&mut self, handle: TrialHandle, objective: f64) -> Result<&Trial, OptimizerError> {
        let pending = self.take_pending(handle)?;
        self.oracle.tell(&pending.parameters, objective);

        let trial = pending.finish(TrialOutcome::Scored { objective });
        info!(
            trial = trial.number,
            configuration = %trial.configuration,
            objective,
            "trial scored"
        );
        self.history.push(trial);
        Ok(self.last())
    }

    /// Close out the in-flight trial without a result. The oracle never
    /// hears about it.
    pub fn abandon_in_flight(&mut self) -> Option<&Trial> {
        let pending = self.in_flight.take()?;
        let trial = pending.finish(TrialOutcome::Abandoned);
        info!(trial = trial.number, configuration = %trial.configuration, "trial abandoned");
        self.history.push(trial);
        Some(self.last())
    }

    fn take_pending(&mut self, handle: TrialHandle) -> Result<PendingTrial, OptimizerError> {
        match &self.in_flight {
            Some(pending) if pending.number == handle.0 => {}
            _ => return Err(OptimizerError::UnknownTrial { trial: handle.0 }),
        }
        self.in_flight
            .take()
            .ok_or(OptimizerError::UnknownTrial { trial: handle.0 })
    }

    fn last(&self) -> &Trial {
        &self.history[self.history.len() - 1]
    }

    pub fn in_flight(&self) -> Option<TrialHandle> {
        self.in_flight.as_ref().map(|p| TrialHandle(p.number))
    }

    /// Every finished trial in proposal order.
    pub fn history(&self) -> &[Trial] {
        &self.history
    }

    /// Best scored trial so far.
    pub fn best(&self) -> Option<&Trial> {
        self.history
            .iter()
            .filter_map(|t| t.objective().map(|o| (t, o)))
            .fold(None::<(&Trial, f64)>, |best, (trial, objective)| match best {
                Some((_, b)) if !self.direction.is_better(objective, b) => best,
                _ => Some((trial, objective)),
            })
            .map(|(trial, _)| trial)
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }
}

impl std::fmt::Debug for OptimizerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerDriver")
            .field("oracle", &self.oracle.name())
            .field("encoding", &self.encoding)
            .field("trials", &self.history.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{build_space, SpaceBounds};
    use crate::search::{BayesianSearch, GridSearch, RandomSearch};
    use mt_types::wire::{self, Message};
    use mt_types::{MemtableVariant, Workload};

    fn workload(message: &str) -> Workload {
        match wire::decode(message).unwrap() {
            Message::Telemetry(w) => w,
            Message::Terminate => panic!("unexpected termination"),
        }
    }

    fn space(message: &str) -> SearchSpace {
        build_space(&workload(message), &SpaceBounds::default()).unwrap()
    }

    #[test]
    fn ask_then_tell_appends_a_scored_trial() {
        let mut driver = OptimizerDriver::new(Box::new(RandomSearch::new(1)), SizeEncoding::Exponent);
        let (handle, config) = driver.ask(&space("10,0,0,0,10,0;100,,,,200,")).unwrap();
        assert_eq!(driver.in_flight(), Some(handle));

        let trial = driver.tell(handle, 300.0).unwrap();
        assert_eq!(trial.configuration, config);
        assert_eq!(trial.objective(), Some(300.0));
        assert_eq!(driver.in_flight(), None);
        assert_eq!(driver.history().len(), 1);
    }

    #[test]
    fn only_one_trial_in_flight() {
        let mut driver = OptimizerDriver::new(Box::new(RandomSearch::new(1)), SizeEncoding::Exponent);
        let s = space("1,0,0,0,0,0;:::::");
        let (handle, _) = driver.ask(&s).unwrap();
        assert_eq!(
            driver.ask(&s).unwrap_err(),
            OptimizerError::TrialInFlight { in_flight: handle.number() }
        );
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut driver = OptimizerDriver::new(Box::new(RandomSearch::new(1)), SizeEncoding::Exponent);
        let s = space("1,0,0,0,0,0;:::::");
        let (first, _) = driver.ask(&s).unwrap();
        driver.tell(first, 10.0).unwrap();

        assert!(matches!(driver.tell(first, 10.0), Err(OptimizerError::UnknownTrial { .. })));
        let (second, _) = driver.ask(&s).unwrap();
        assert_ne!(first, second);
        assert!(matches!(driver.tell(first, 10.0), Err(OptimizerError::UnknownTrial { .. })));
        assert_eq!(driver.in_flight(), Some(second));
    }

    #[test]
    fn trial_records_the_mix_it_was_proposed_under() {
        let mut driver = OptimizerDriver::new(Box::new(GridSearch::new(2)), SizeEncoding::Exponent);
        let observed = ["10,0,0,0,10,0;:::::", "0,4,0,0,0,6;:::::", "1,1,1,1,1,5;:::::"];
        for message in observed {
            let (handle, _) = driver.ask(&space(message)).unwrap();
            driver.tell(handle, 1.0).unwrap();
        }
        for (trial, message) in driver.history().iter().zip(observed) {
            assert_eq!(trial.pinned, workload(message).percentages().unwrap());
        }
    }

    #[test]
    fn abandoned_trial_is_not_told_to_the_oracle() {
        let mut driver = OptimizerDriver::new(
            Box::new(BayesianSearch::new(4, 0.0, ObjectiveDirection::Minimize)),
            SizeEncoding::Exponent,
        );
        let s = space("1,0,0,0,0,0;:::::");
        driver.ask(&s).unwrap();
        let trial = driver.abandon_in_flight().unwrap();
        assert!(trial.is_abandoned());
        assert!(driver.abandon_in_flight().is_none());
        assert!(driver.best().is_none());
    }

    #[test]
    fn best_is_the_lowest_objective() {
        let mut driver = OptimizerDriver::new(Box::new(RandomSearch::new(8)), SizeEncoding::Exponent);
        let s = space("1,0,0,0,0,0;:::::");
        for objective in [500.0, 120.0, 900.0] {
            let (handle, _) = driver.ask(&s).unwrap();
            driver.tell(handle, objective).unwrap();
        }
        assert_eq!(driver.best().unwrap().objective(), Some(120.0));
    }

    #[test]
    fn seeded_drivers_propose_the_same_sequence() {
        let run = || {
            let mut driver = OptimizerDriver::new(
                Box::new(BayesianSearch::new(77, 0.3, ObjectiveDirection::Minimize)),
                SizeEncoding::Exponent,
            );
            let mut proposals = Vec::new();
            for (i, message) in ["9,1,0,0,0,0;:::::", "5,0,0,0,5,0;:::::", "1,0,0,0,9,0;:::::"]
                .iter()
                .cycle()
                .take(12)
                .enumerate()
            {
                let (handle, config) = driver.ask(&space(message)).unwrap();
                driver.tell(handle, (i * 37 % 11) as f64).unwrap();
                proposals.push(config);
            }
            proposals
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn sized_proposals_carry_a_size() {
        let mut driver = OptimizerDriver::new(Box::new(RandomSearch::new(2)), SizeEncoding::Bytes);
        let s = space("1,0,0,0,0,0;:::::");
        for _ in 0..30 {
            let (handle, config) = driver.ask(&s).unwrap();
            if config.variant == MemtableVariant::Vector {
                let size = config.size.unwrap();
                assert!(size.is_power_of_two());
                assert!((1u64 << 16..=1u64 << 24).contains(&size));
            } else {
                assert!(config.size.is_none());
            }
            driver.tell(handle, 1.0).unwrap();
        }
    }
}
