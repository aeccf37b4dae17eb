//! End-of-run event at a fixed final time.

use crate::core::{advance, Branch, Time};
use crate::error::{Error, Result};
use crate::event_handler::{EventHandler, HandlerPhase};
use crate::setting::Setting;
use std::sync::Arc;
use tracing::debug;

/// Ends the run at `end_of_run_time`, bringing every active branch up to that time.
#[derive(Debug)]
pub struct FinalTimeEndOfRunEventHandler {
    setting: Arc<Setting>,
    event_time: Time,
    phase: HandlerPhase,
}

impl FinalTimeEndOfRunEventHandler {
    /// Errors: `Error::Configuration` unless `end_of_run_time > 0`.
    pub fn new(setting: Arc<Setting>, end_of_run_time: f64) -> Result<Self> {
        debug!(end_of_run_time, "creating FinalTimeEndOfRunEventHandler");
        if end_of_run_time.is_nan() || end_of_run_time <= 0.0 {
            return Err(Error::Configuration(format!(
                "end_of_run_time must be > 0, got {end_of_run_time}"
            )));
        }
        Ok(Self {
            setting,
            event_time: Time::from_float(end_of_run_time),
            phase: HandlerPhase::Idle,
        })
    }
}

impl EventHandler for FinalTimeEndOfRunEventHandler {
    type Request = ();
    type Confirmation = ();

    fn number_send_event_time_arguments(&self) -> usize {
        0
    }

    fn number_send_out_state_arguments(&self) -> usize {
        1
    }

    /// The constant end time; the active state is ignored.
    fn send_event_time(&mut self, _active: &[Branch]) -> Result<(Time, ())> {
        self.phase.begin(self.event_time);
        Ok((self.event_time, ()))
    }

    /// Advance every active branch to the end time. Velocities stay set so that a following run
    /// can continue the chain.
    fn send_out_state(&mut self, mut active: Vec<Branch>, _: ()) -> Result<Vec<Branch>> {
        let time = self.phase.finish("FinalTimeEndOfRunEventHandler")?;
        advance(&self.setting, &mut active, time)?;
        Ok(active)
    }
}
