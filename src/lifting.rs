//! Lifting schemes: pick the next active unit among the units taking part in a confirmed event.
//!
//! Every participating unit enters with its factor derivative. Units with a negative derivative
//! can receive the activity, the active unit must have a positive one.

use crate::core::StateId;
use crate::error::{Error, Result};
use rand::Rng;

/// Selects the next active identifier from a table of factor derivatives.
pub trait Lifting {
    /// Forget all inserted derivatives.
    fn reset(&mut self);

    /// Append the factor derivative of `identifier`. At most one entry may be `active`.
    fn insert(&mut self, derivative: f64, identifier: StateId, active: bool) -> Result<()>;

    /// Draw the next active identifier.
    ///
    /// Errors: `Error::Contract` if no active entry with a positive derivative was inserted or no
    /// entry can take over the activity.
    fn next_active_identifier<R: Rng>(&self, rng: &mut R) -> Result<StateId>;
}

/// Inside-first lifting: the positive derivatives in front of the active entry first use up the
/// negative derivatives in insertion order; the active entry lifts to what remains.
#[derive(Debug, Default, Clone)]
pub struct InsideFirstLifting {
    entries: Vec<(f64, StateId)>,
    active: Option<usize>,
}

impl InsideFirstLifting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifting rates of the active entry, in insertion order, omitting exhausted entries.
    pub fn lifting_rates(&self) -> Result<Vec<(&StateId, f64)>> {
        let active = self
            .active
            .ok_or_else(|| Error::Contract("lifting table without an active entry".into()))?;
        let mut inflow: f64 = self.entries[..active]
            .iter()
            .map(|(d, _)| d.max(0.0))
            .sum();
        let mut rates = Vec::new();
        for (derivative, identifier) in &self.entries {
            if *derivative >= 0.0 {
                continue;
            }
            let capacity = -derivative;
            let used = capacity.min(inflow);
            inflow -= used;
            if capacity > used {
                rates.push((identifier, capacity - used));
            }
        }
        Ok(rates)
    }

    /// Identifier whose cumulative lifting rate first reaches `position`.
    ///
    /// `position` lies in `[0, derivative of the active entry]`.
    pub fn select(&self, position: f64) -> Result<StateId> {
        let rates = self.lifting_rates()?;
        let mut summed = 0.0;
        for &(identifier, rate) in &rates {
            summed += rate;
            if position <= summed {
                return Ok(identifier.clone());
            }
        }
        rates
            .last()
            .map(|(identifier, _)| (*identifier).clone())
            .ok_or_else(|| Error::Contract("no unit can take over the activity".into()))
    }

    fn active_derivative(&self) -> Result<f64> {
        let derivative = self
            .active
            .map(|i| self.entries[i].0)
            .ok_or_else(|| Error::Contract("lifting table without an active entry".into()))?;
        if derivative <= 0.0 {
            return Err(Error::Contract(format!(
                "active factor derivative must be positive, got {derivative}"
            )));
        }
        Ok(derivative)
    }
}

impl Lifting for InsideFirstLifting {
    fn reset(&mut self) {
        self.entries.clear();
        self.active = None;
    }

    fn insert(&mut self, derivative: f64, identifier: StateId, active: bool) -> Result<()> {
        if active {
            if self.active.is_some() {
                return Err(Error::Contract("lifting table with two active entries".into()));
            }
            self.active = Some(self.entries.len());
        }
        self.entries.push((derivative, identifier));
        Ok(())
    }

    fn next_active_identifier<R: Rng>(&self, rng: &mut R) -> Result<StateId> {
        let position = rng.random::<f64>() * self.active_derivative()?;
        self.select(position)
    }
}
