//! Event handlers of the event-chain kernel.
//!
//! Every handler runs a two-step protocol: [`EventHandler::send_event_time`] inspects the active
//! branches and returns a candidate event time together with a request for further state; the
//! scheduler then calls [`EventHandler::send_out_state`] with the active branches (advanced or not)
//! and the confirmed request, receiving the out-state. Handlers keep the time slicing of composite
//! objects consistent with their leaf units.

pub mod cell_boundary;
pub mod cell_veto;
pub mod composite_cell_veto;
pub mod end_of_chain;
pub mod end_of_run;
pub mod start_of_run;
pub mod walker;

pub use cell_boundary::CellBoundaryEventHandler;
pub use cell_veto::{ChargeSelection, LeafUnitCellVetoEventHandler};
pub use composite_cell_veto::CompositeObjectCellVetoEventHandler;
pub use end_of_chain::{
    SameActivePeriodicDirectionEndOfChainEventHandler,
    SingleIndependentActivePeriodicDirectionEndOfChainEventHandler,
};
pub use end_of_run::FinalTimeEndOfRunEventHandler;
pub use start_of_run::InitialChainStartOfRunEventHandler;
pub use walker::WalkerTable;

use crate::core::{Branch, NodeIndex, Time, VELOCITY_EPS};
use crate::error::{Error, Result};
use tracing::warn;

/// Two-step event handler protocol.
pub trait EventHandler {
    /// Additional state the handler nominates alongside its candidate time.
    type Request;
    /// What the scheduler hands back to [`send_out_state`](EventHandler::send_out_state).
    type Confirmation;

    /// Number of branch sequences `send_event_time` consumes.
    fn number_send_event_time_arguments(&self) -> usize;

    /// Number of arguments `send_out_state` consumes (active branches plus confirmation).
    fn number_send_out_state_arguments(&self) -> usize;

    fn send_event_time(&mut self, active: &[Branch]) -> Result<(Time, Self::Request)>;

    fn send_out_state(
        &mut self,
        active: Vec<Branch>,
        confirmation: Self::Confirmation,
    ) -> Result<Vec<Branch>>;
}

/// Where a handler stands in its two-step protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerPhase {
    #[default]
    Idle,
    /// A candidate time was sent; the out-state is pending.
    AwaitingConfirmation(Time),
}

impl HandlerPhase {
    /// Record the candidate `time` sent by the handler.
    pub fn begin(&mut self, time: Time) {
        *self = HandlerPhase::AwaitingConfirmation(time);
    }

    /// Return to `Idle` and yield the candidate time of the pending event.
    ///
    /// Errors: `Error::Contract` if no candidate time was sent.
    pub fn finish(&mut self, handler: &str) -> Result<Time> {
        match std::mem::take(self) {
            HandlerPhase::AwaitingConfirmation(time) => Ok(time),
            HandlerPhase::Idle => Err(Error::Contract(format!(
                "{handler}: send_out_state called without a preceding send_event_time"
            ))),
        }
    }
}

/// Direction and signed speed of a velocity that is nonzero in exactly one component.
///
/// Errors: `Error::Contract` for a velocity at rest or moving along several axes.
pub fn analyse_velocity(velocity: &[f64]) -> Result<(usize, f64)> {
    let mut moving = velocity
        .iter()
        .enumerate()
        .filter(|(_, v)| v.abs() > VELOCITY_EPS);
    match (moving.next(), moving.next()) {
        (Some((direction, &speed)), None) => Ok((direction, speed)),
        _ => Err(Error::Contract(format!(
            "velocity {velocity:?} is not aligned with a single axis"
        ))),
    }
}

/// Position of the single active leaf unit in `branches` as `(branch index, node index)`.
///
/// Errors: `Error::Contract` if there is no active leaf or more than one.
pub fn single_active_leaf(branches: &[Branch]) -> Result<(usize, NodeIndex)> {
    let mut active = branches
        .iter()
        .enumerate()
        .flat_map(|(b, branch)| branch.active_leaves().map(move |n| (b, n)));
    match (active.next(), active.next()) {
        (Some(found), None) => Ok(found),
        (None, _) => Err(Error::Contract("no active leaf unit in the in-state".into())),
        _ => Err(Error::Contract("more than one active leaf unit in the in-state".into())),
    }
}

/// Log that a bounding derivative undershoots the real one.
pub fn bounding_potential_warning(handler: &str, real_derivative: f64, bounding_derivative: f64) {
    warn!(
        handler,
        real_derivative,
        bounding_derivative,
        "bounding event rate is smaller than the real event rate"
    );
}
