//! Cell-veto event handler for interactions between composite objects.
//!
//! The cell-occupancy index stores composite objects. The potential between two of them is the sum
//! of the pair potentials of their leaf units. A confirmed event hands the activity to the leaf unit
//! chosen by a [`Lifting`] scheme over the factor derivatives of all leaf units of both objects.

use crate::cells::PeriodicCells;
use crate::core::{exchange_velocity, Branch, NodeIndex, StateId, Time, Unit};
use crate::error::{Error, Result};
use crate::event_handler::cell_veto::CellVetoSampler;
use crate::event_handler::EventHandler;
use crate::lifting::{InsideFirstLifting, Lifting};
use crate::potential::{Estimator, Potential};
use crate::setting::Setting;
use std::sync::Arc;
use tracing::trace;

const HANDLER: &str = "CompositeObjectCellVetoEventHandler";

/// Cell-veto event handler where the active leaf unit interacts with whole composite objects.
///
/// The active branch must carry every leaf unit of the active composite object, since all of them
/// enter the lifting scheme.
#[derive(Debug)]
pub struct CompositeObjectCellVetoEventHandler<
    C: PeriodicCells,
    E: Estimator,
    P: Potential,
    L: Lifting = InsideFirstLifting,
> {
    sampler: CellVetoSampler<C, E>,
    potential: P,
    lifting: L,
}

impl<C: PeriodicCells, E: Estimator, P: Potential, L: Lifting> CompositeObjectCellVetoEventHandler<C, E, P, L> {
    /// Errors: `Error::Configuration` if `cell_level` does not store composite objects, if a charge
    /// is named but the potential does not take exactly two charges, or if no cell lies outside the
    /// nearby region.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        setting: Arc<Setting>,
        cells: Arc<C>,
        cell_level: usize,
        estimator: E,
        potential: P,
        lifting: L,
        charge: Option<&str>,
        seed: Option<u64>,
    ) -> Result<Self> {
        if cell_level >= setting.number_of_node_levels() {
            return Err(Error::Configuration(format!(
                "{HANDLER} needs composite objects on cell level {cell_level}, the tree has {} levels",
                setting.number_of_node_levels()
            )));
        }
        let sampler = CellVetoSampler::new(
            HANDLER,
            setting,
            cells,
            cell_level,
            estimator,
            potential.number_charge_arguments(),
            charge,
            seed,
        )?;
        Ok(Self {
            sampler,
            potential,
            lifting,
        })
    }

    /// Total bounding rate of the upper-bound (`true`) or lower-bound table in `direction`.
    pub fn total_rate(&self, direction: usize, upper: bool) -> Option<f64> {
        self.sampler.total_rate(direction, upper)
    }

    fn pair_derivative(&self, direction: usize, from: &Unit, to: &Unit) -> Result<f64> {
        let separation = self.sampler.cells.separation_vector(&from.position, &to.position);
        let charges = self
            .sampler
            .charges
            .pair(from, to, self.potential.number_charge_arguments())?;
        Ok(self.potential.derivative(direction, &separation, &charges))
    }
}

impl<C: PeriodicCells, E: Estimator, P: Potential, L: Lifting> EventHandler
    for CompositeObjectCellVetoEventHandler<C, E, P, L>
{
    /// Target cell of the bounding event; `None` if no event can happen.
    type Request = Option<C::Cell>;
    /// Branch of the composite object found in the target cell; `None` for an empty cell.
    type Confirmation = Option<Branch>;

    fn number_send_event_time_arguments(&self) -> usize {
        1
    }

    fn number_send_out_state_arguments(&self) -> usize {
        2
    }

    /// Errors: `Error::Contract` unless `active` is a single branch with one active leaf unit
    /// moving in positive direction along one axis.
    fn send_event_time(&mut self, active: &[Branch]) -> Result<(Time, Option<C::Cell>)> {
        self.sampler.send_event_time(active)
    }

    /// Bring the active branch to the candidate time. With a target composite object, the summed
    /// derivative between the active leaf unit and every leaf unit of the target decides on the
    /// event; a confirmed event lifts the activity to the leaf unit drawn by the lifting scheme.
    /// Returns the active branch followed by the target branch.
    fn send_out_state(&mut self, mut active: Vec<Branch>, target: Option<Branch>) -> Result<Vec<Branch>> {
        let (time, pending) = self.sampler.finish(&mut active)?;
        let Some(target) = target else {
            return Ok(active);
        };
        if target.root().is_leaf() {
            return Err(Error::Contract(format!(
                "target {} is not a composite object",
                target.root_identifier()
            )));
        }
        let (active_branch, active_leaf) = (pending.active_branch, pending.active_leaf);
        let local = active
            .get(active_branch)
            .ok_or_else(|| Error::Contract("active branch missing".into()))?;
        if local.root_identifier() == target.root_identifier() {
            return Err(Error::Contract(format!(
                "target {} is the active composite object",
                target.root_identifier()
            )));
        }
        let local_leaves = leaf_units(local)?;
        let target_leaves = leaf_units(&target)?;
        let active_unit = local
            .unit(active_leaf)
            .ok_or_else(|| Error::Contract("active leaf unit missing".into()))?;

        let mut factor_derivative = 0.0;
        let mut target_factors = vec![0.0; target_leaves.len()];
        for (factor, (_, unit)) in target_factors.iter_mut().zip(&target_leaves) {
            let derivative = self.pair_derivative(pending.direction, active_unit, unit)?;
            factor_derivative += derivative;
            *factor -= derivative;
        }
        if !self.sampler.accept(&pending, factor_derivative)? {
            active.push(target);
            return Ok(active);
        }

        let mut local_factors = Vec::with_capacity(local_leaves.len());
        for &(index, unit) in &local_leaves {
            if index == active_leaf {
                local_factors.push(factor_derivative);
                continue;
            }
            let mut summed = 0.0;
            for (factor, (_, other)) in target_factors.iter_mut().zip(&target_leaves) {
                let derivative = self.pair_derivative(pending.direction, unit, other)?;
                summed += derivative;
                *factor -= derivative;
            }
            local_factors.push(summed);
        }

        self.lifting.reset();
        let local_entries = local_leaves
            .iter()
            .zip(&local_factors)
            .map(|(&(index, unit), &f)| (f, unit.identifier.clone(), index == active_leaf));
        let target_entries = target_leaves
            .iter()
            .zip(&target_factors)
            .map(|(&(_, unit), &f)| (f, unit.identifier.clone(), false));
        let entries: Vec<(f64, StateId, bool)> = if local.root_identifier() < target.root_identifier() {
            local_entries.chain(target_entries).collect()
        } else {
            target_entries.chain(local_entries).collect()
        };
        for (derivative, identifier, is_active) in entries {
            self.lifting.insert(derivative, identifier, is_active)?;
        }
        let next = self.lifting.next_active_identifier(&mut self.sampler.rng)?;

        let target_branch = active.len();
        let destination = match active[active_branch].find(&next) {
            Some(index) => (active_branch, index),
            None => (
                target_branch,
                target.find(&next).ok_or_else(|| {
                    Error::Contract(format!("lifted identifier {next} in neither composite object"))
                })?,
            ),
        };
        active.push(target);
        exchange_velocity(
            &self.sampler.setting,
            &mut active,
            (active_branch, active_leaf),
            destination,
            time,
        )?;
        trace!(time = %time, %next, factor_derivative, "composite cell-veto lift accepted");
        Ok(active)
    }
}

fn leaf_units(branch: &Branch) -> Result<Vec<(NodeIndex, &Unit)>> {
    branch
        .leaves()
        .map(|index| {
            branch
                .unit(index)
                .map(|unit| (index, unit))
                .ok_or_else(|| Error::Contract(format!("leaf {index} missing in {}", branch.root_identifier())))
        })
        .collect()
}
