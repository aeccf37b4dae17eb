//! Start-of-run event: sets the initial lifting.

use crate::core::{activate, Branch, StateId, Time};
use crate::error::{Error, Result};
use crate::event_handler::{EventHandler, HandlerPhase};
use crate::setting::Setting;
use std::sync::Arc;
use tracing::debug;

/// Activates the initially active leaf unit at time zero, moving with `speed` in the positive
/// `initial_direction`.
#[derive(Debug)]
pub struct InitialChainStartOfRunEventHandler {
    setting: Arc<Setting>,
    initial_velocity: Vec<f64>,
    initial_active_identifier: StateId,
    phase: HandlerPhase,
}

impl InitialChainStartOfRunEventHandler {
    /// Errors: `Error::Configuration` if `initial_direction` is not below the dimension or `speed`
    /// is not positive.
    pub fn new(
        setting: Arc<Setting>,
        initial_direction: usize,
        speed: f64,
        initial_active_identifier: StateId,
    ) -> Result<Self> {
        debug!(
            initial_direction,
            speed,
            %initial_active_identifier,
            "creating InitialChainStartOfRunEventHandler"
        );
        if initial_direction >= setting.dimension() {
            return Err(Error::Configuration(format!(
                "initial direction {initial_direction} must be smaller than the dimension {}",
                setting.dimension()
            )));
        }
        if !speed.is_finite() || speed <= 0.0 {
            return Err(Error::Configuration("initial speed must be > 0".into()));
        }
        let mut initial_velocity = vec![0.0; setting.dimension()];
        initial_velocity[initial_direction] = speed;
        Ok(Self {
            setting,
            initial_velocity,
            initial_active_identifier,
            phase: HandlerPhase::Idle,
        })
    }
}

impl EventHandler for InitialChainStartOfRunEventHandler {
    type Request = StateId;
    /// Branch containing the initially active unit.
    type Confirmation = Branch;

    fn number_send_event_time_arguments(&self) -> usize {
        0
    }

    fn number_send_out_state_arguments(&self) -> usize {
        1
    }

    /// Candidate time zero; the request is the initially active identifier. The active state is
    /// ignored.
    fn send_event_time(&mut self, _active: &[Branch]) -> Result<(Time, StateId)> {
        self.phase.begin(Time::ZERO);
        Ok((Time::ZERO, self.initial_active_identifier.clone()))
    }

    /// Activate every leaf of `branch`. `active` must be empty at the start of a run.
    fn send_out_state(&mut self, active: Vec<Branch>, mut branch: Branch) -> Result<Vec<Branch>> {
        let time = self.phase.finish("InitialChainStartOfRunEventHandler")?;
        if !active.is_empty() {
            return Err(Error::Contract("start of run with an already active state".into()));
        }
        let leaves: Vec<_> = branch.leaves().collect();
        for leaf in leaves {
            activate(&self.setting, &mut branch, leaf, &self.initial_velocity, time)?;
        }
        Ok(vec![branch])
    }
}
