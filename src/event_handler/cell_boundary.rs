//! Cell-boundary events: stop the clock whenever the active unit on the cell level enters the next
//! cell, so the cell-occupancy index can follow it.

use crate::cells::PeriodicCells;
use crate::core::{advance, Branch, NodeIndex, Time};
use crate::error::{Error, Result};
use crate::event_handler::{analyse_velocity, EventHandler, HandlerPhase};
use crate::setting::Setting;
use std::sync::Arc;
use tracing::{debug, trace};

const HANDLER: &str = "CellBoundaryEventHandler";

#[derive(Debug, Clone, Copy)]
struct Crossing {
    node: NodeIndex,
    direction: usize,
    boundary: f64,
}

/// Proposes the time at which the active unit on `cell_level` reaches the lower boundary of the
/// neighbouring cell along its direction of motion.
#[derive(Debug)]
pub struct CellBoundaryEventHandler<C: PeriodicCells> {
    setting: Arc<Setting>,
    cells: Arc<C>,
    cell_level: usize,
    crossing: Option<Crossing>,
    phase: HandlerPhase,
}

impl<C: PeriodicCells> CellBoundaryEventHandler<C> {
    /// Errors: `Error::Configuration` if `cell_level` lies outside the tree.
    pub fn new(setting: Arc<Setting>, cells: Arc<C>, cell_level: usize) -> Result<Self> {
        debug!(cell_level, "creating {HANDLER}");
        if cell_level == 0 || cell_level > setting.number_of_node_levels() {
            return Err(Error::Configuration(format!(
                "cell level {cell_level} outside of the tree depth 1..={}",
                setting.number_of_node_levels()
            )));
        }
        Ok(Self {
            setting,
            cells,
            cell_level,
            crossing: None,
            phase: HandlerPhase::Idle,
        })
    }
}

impl<C: PeriodicCells> EventHandler for CellBoundaryEventHandler<C> {
    type Request = ();
    type Confirmation = ();

    fn number_send_event_time_arguments(&self) -> usize {
        1
    }

    fn number_send_out_state_arguments(&self) -> usize {
        1
    }

    /// Errors: `Error::Contract` unless `active` is a single branch with exactly one active unit on
    /// the cell level, moving in positive direction along one axis.
    fn send_event_time(&mut self, active: &[Branch]) -> Result<(Time, ())> {
        let [branch] = active else {
            return Err(Error::Contract(format!(
                "{HANDLER} expects exactly one active branch, got {}",
                active.len()
            )));
        };
        let mut moving = branch
            .nodes_on_level(self.cell_level)
            .filter(|&i| branch.unit(i).is_some_and(|u| u.is_active()));
        let (Some(node), None) = (moving.next(), moving.next()) else {
            return Err(Error::Contract(format!(
                "expected exactly one active unit on cell level {}",
                self.cell_level
            )));
        };
        let unit = branch
            .unit(node)
            .ok_or_else(|| Error::Contract("active unit missing".into()))?;
        let (direction, speed) = analyse_velocity(unit.velocity().unwrap_or_default())?;
        if speed <= 0.0 {
            return Err(Error::Contract(format!(
                "{HANDLER} requires motion in positive direction, got speed {speed}"
            )));
        }
        let time_stamp = unit
            .time_stamp()
            .ok_or_else(|| Error::Contract("active unit without time stamp".into()))?;

        let cell = self.cells.position_to_cell(&unit.position);
        let neighbor = self.cells.neighbor_cell(cell, direction, true);
        let boundary = self.cells.cell_bounds(neighbor).0[direction];
        let mut separation = boundary - unit.position[direction];
        if separation < 0.0 {
            separation += self.setting.system_lengths()[direction];
        }
        let event_time = time_stamp + separation / speed;
        trace!(time = %event_time, ?cell, ?neighbor, "cell boundary candidate");
        self.crossing = Some(Crossing {
            node,
            direction,
            boundary,
        });
        self.phase.begin(event_time);
        Ok((event_time, ()))
    }

    /// Advance the active branch to the crossing and place the unit exactly on the boundary.
    fn send_out_state(&mut self, mut active: Vec<Branch>, _: ()) -> Result<Vec<Branch>> {
        let time = self.phase.finish(HANDLER)?;
        let crossing = self
            .crossing
            .take()
            .ok_or_else(|| Error::Contract(format!("{HANDLER} has no pending crossing")))?;
        advance(&self.setting, &mut active, time)?;
        let node = active
            .first_mut()
            .and_then(|b| b.node_mut(crossing.node))
            .ok_or_else(|| Error::Contract("active unit missing".into()))?;
        node.unit.position[crossing.direction] = crossing.boundary;
        Ok(active)
    }
}
