//! Cell-veto event handlers.
//!
//! Interactions with units in far-away cells are bounded per relative cell. The bounds of all cells
//! outside the nearby region of the zero cell feed one Walker table per direction of motion, so the
//! next bounding event and its target cell are drawn in constant time regardless of the system
//! size. The scheduler confirms the event with the unit stored in the target cell (if any), and the
//! handler accepts the lift with probability `real derivative / bounding derivative`.

use crate::cells::PeriodicCells;
use crate::core::{advance, exchange_velocity, Branch, NodeIndex, Time, Unit};
use crate::error::{Error, Result};
use crate::event_handler::walker::WalkerTable;
use crate::event_handler::{
    analyse_velocity, bounding_potential_warning, single_active_leaf, EventHandler, HandlerPhase,
};
use crate::potential::{Estimator, Potential};
use crate::setting::Setting;
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Which charges the potential receives for a pair of leaf units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeSelection {
    /// Every charge argument is 1.
    Unit,
    /// The named charge of the active and of the target unit, in this order.
    Named(String),
}

impl ChargeSelection {
    fn of(&self, unit: &Unit) -> Result<f64> {
        match self {
            ChargeSelection::Unit => Ok(1.0),
            ChargeSelection::Named(name) => unit.charge_value(name).ok_or_else(|| {
                Error::Contract(format!("unit {} carries no charge {name}", unit.identifier))
            }),
        }
    }

    pub(crate) fn pair(&self, active: &Unit, target: &Unit, arguments: usize) -> Result<Vec<f64>> {
        match self {
            ChargeSelection::Unit => Ok(vec![1.0; arguments]),
            ChargeSelection::Named(_) => Ok(vec![self.of(active)?, self.of(target)?]),
        }
    }
}

/// Candidate event sent by [`CellVetoSampler::send_event_time`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pending {
    pub direction: usize,
    pub bounding_event_rate: f64,
    pub active_branch: usize,
    pub active_leaf: NodeIndex,
}

/// Walker tables, random source and protocol phase shared by the cell-veto handlers.
#[derive(Debug)]
pub(crate) struct CellVetoSampler<C: PeriodicCells, E: Estimator> {
    handler: &'static str,
    pub setting: Arc<Setting>,
    pub cells: Arc<C>,
    cell_level: usize,
    estimator: E,
    pub charges: ChargeSelection,
    /// `(upper, -lower)` derivative bound per relative cell and direction.
    derivative_bounds: HashMap<C::Cell, Vec<(f64, f64)>>,
    upper_bound_walkers: Vec<WalkerTable<C::Cell>>,
    lower_bound_walkers: Vec<WalkerTable<C::Cell>>,
    exponential: Exp<f64>,
    pub rng: StdRng,
    pending: Option<Pending>,
    phase: HandlerPhase,
}

impl<C: PeriodicCells, E: Estimator> CellVetoSampler<C, E> {
    /// Tabulate the derivative bounds of every cell outside the nearby region of the zero cell.
    ///
    /// `charge_arguments` is the number of charges the potential takes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handler: &'static str,
        setting: Arc<Setting>,
        cells: Arc<C>,
        cell_level: usize,
        estimator: E,
        charge_arguments: usize,
        charge: Option<&str>,
        seed: Option<u64>,
    ) -> Result<Self> {
        debug!(cell_level, ?charge, ?seed, "creating {handler}");
        if cell_level == 0 || cell_level > setting.number_of_node_levels() {
            return Err(Error::Configuration(format!(
                "cell level {cell_level} outside of the tree depth 1..={}",
                setting.number_of_node_levels()
            )));
        }
        let charges = match charge {
            Some(name) if charge_arguments != 2 => {
                return Err(Error::Configuration(format!(
                    "charge {name} requested but the potential expects {charge_arguments} charges instead of 2"
                )));
            }
            Some(name) => ChargeSelection::Named(name.to_owned()),
            None => ChargeSelection::Unit,
        };
        let exponential = Exp::new(setting.beta())
            .map_err(|e| Error::Configuration(format!("beta {}: {e}", setting.beta())))?;

        info!("initializing cell-veto bounds");
        let dimension = setting.dimension();
        let zero = cells.zero_cell();
        let nearby = cells.nearby_cells(zero);
        let (zero_min, zero_max) = cells.cell_bounds(zero);
        let mut derivative_bounds = HashMap::new();
        let mut upper_items: Vec<Vec<(C::Cell, f64)>> = vec![Vec::new(); dimension];
        let mut lower_items: Vec<Vec<(C::Cell, f64)>> = vec![Vec::new(); dimension];
        for cell in cells.cells().into_iter().filter(|c| !nearby.contains(c)) {
            let relative = cells.relative_cell(cell, zero);
            let (cell_min, cell_max) = cells.cell_bounds(cell);
            let lower_corner: Vec<f64> = cell_min.iter().zip(&zero_max).map(|(a, b)| a - b).collect();
            let upper_corner: Vec<f64> = cell_max.iter().zip(&zero_min).map(|(a, b)| a - b).collect();
            let bounds: Vec<(f64, f64)> = (0..dimension)
                .map(|d| {
                    let (upper, lower) = estimator.derivative_bound(&lower_corner, &upper_corner, d);
                    (upper, -lower)
                })
                .collect();
            for (d, &(upper, negated_lower)) in bounds.iter().enumerate() {
                upper_items[d].push((relative, upper.max(0.0)));
                lower_items[d].push((relative, negated_lower.max(0.0)));
            }
            derivative_bounds.insert(relative, bounds);
        }
        if derivative_bounds.is_empty() {
            return Err(Error::Configuration(
                "every cell is nearby the zero cell, cell-veto bounds need far-away cells".into(),
            ));
        }
        let upper_bound_walkers = upper_items
            .into_iter()
            .map(WalkerTable::new)
            .collect::<Result<Vec<_>>>()?;
        let lower_bound_walkers = lower_items
            .into_iter()
            .map(WalkerTable::new)
            .collect::<Result<Vec<_>>>()?;
        info!(cells = derivative_bounds.len(), "finished cell-veto bounds");

        let rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        Ok(Self {
            handler,
            setting,
            cells,
            cell_level,
            estimator,
            charges,
            derivative_bounds,
            upper_bound_walkers,
            lower_bound_walkers,
            exponential,
            rng,
            pending: None,
            phase: HandlerPhase::Idle,
        })
    }

    pub fn total_rate(&self, direction: usize, upper: bool) -> Option<f64> {
        let walkers = if upper {
            &self.upper_bound_walkers
        } else {
            &self.lower_bound_walkers
        };
        walkers.get(direction).map(WalkerTable::total_rate)
    }

    #[cfg(test)]
    pub fn tabulated_cells(&self) -> usize {
        self.derivative_bounds.len()
    }

    /// Sample the next bounding event of the single active leaf unit in `active`.
    pub fn send_event_time(&mut self, active: &[Branch]) -> Result<(Time, Option<C::Cell>)> {
        let handler = self.handler;
        let [branch] = active else {
            return Err(Error::Contract(format!(
                "{handler} expects exactly one active branch, got {}",
                active.len()
            )));
        };
        let (active_branch, active_leaf) = single_active_leaf(active)?;
        let leaf = branch
            .unit(active_leaf)
            .ok_or_else(|| Error::Contract("active leaf unit missing".into()))?;
        let velocity = leaf.velocity().unwrap_or_default();
        let (direction, speed) = analyse_velocity(velocity)?;
        if speed <= 0.0 {
            return Err(Error::Contract(format!(
                "{handler} requires motion in positive direction, got speed {speed}"
            )));
        }
        let time_stamp = leaf
            .time_stamp()
            .ok_or_else(|| Error::Contract("active leaf unit without time stamp".into()))?;
        let relevant = branch
            .ancestor_on_level(active_leaf, self.cell_level)
            .and_then(|i| branch.unit(i))
            .ok_or_else(|| {
                Error::Contract(format!("active leaf unit has no ancestor on level {}", self.cell_level))
            })?;
        let active_cell = self.cells.position_to_cell(&relevant.position);

        let mut charge_factor = self.estimator.charge_correction_factor(self.charges.of(leaf)?);
        let (walker, bound_index) = if charge_factor > 0.0 {
            (&self.upper_bound_walkers[direction], 0)
        } else {
            charge_factor = -charge_factor;
            (&self.lower_bound_walkers[direction], 1)
        };
        let total_rate = walker.total_rate() * charge_factor;
        let relative = match walker.sample(&mut self.rng) {
            Some(&relative) if total_rate > 0.0 => relative,
            _ => {
                trace!(direction, "cell-veto rate vanishes");
                self.pending = None;
                return Ok((Time::INFINITY, None));
            }
        };
        let bounds = self
            .derivative_bounds
            .get(&relative)
            .and_then(|b| b.get(direction))
            .ok_or_else(|| Error::Contract(format!("no derivative bound for cell {relative:?}")))?;
        let bound = if bound_index == 0 { bounds.0 } else { bounds.1 };
        let bounding_event_rate = bound * charge_factor;
        let target_cell = self.cells.translate(active_cell, relative);
        let event_time = time_stamp + self.exponential.sample(&mut self.rng) / (total_rate * speed);

        trace!(time = %event_time, ?target_cell, bounding_event_rate, "cell-veto candidate");
        self.pending = Some(Pending {
            direction,
            bounding_event_rate,
            active_branch,
            active_leaf,
        });
        self.phase.begin(event_time);
        Ok((event_time, Some(target_cell)))
    }

    /// Close the pending event: advance `active` to its candidate time.
    pub fn finish(&mut self, active: &mut [Branch]) -> Result<(Time, Pending)> {
        let time = self.phase.finish(self.handler)?;
        let pending = self
            .pending
            .take()
            .ok_or_else(|| Error::Contract(format!("{} has no pending event", self.handler)))?;
        advance(&self.setting, active, time)?;
        Ok((time, pending))
    }

    /// Rejection step of the cell-veto algorithm for the real `derivative` of a pending event.
    ///
    /// Errors: `Error::Contract` for a non-positive bounding event rate.
    pub fn accept(&mut self, pending: &Pending, derivative: f64) -> Result<bool> {
        if pending.bounding_event_rate <= 0.0 {
            return Err(Error::Contract(format!(
                "{} sampled a cell with bounding event rate {}",
                self.handler, pending.bounding_event_rate
            )));
        }
        if derivative <= 0.0 {
            return Ok(false);
        }
        if pending.bounding_event_rate < derivative {
            bounding_potential_warning(self.handler, derivative, pending.bounding_event_rate);
        }
        Ok(self.rng.random::<f64>() * pending.bounding_event_rate < derivative)
    }
}

const HANDLER: &str = "LeafUnitCellVetoEventHandler";

/// Cell-veto event handler where the active unit and its interaction partners are leaf units.
///
/// - `cell_level`: level of the units whose position decides the active cell
/// - `charge`: if given, the named charge of both leaf units enters the potential; the estimator's
///   charge correction factor then rescales the tabulated bounds
#[derive(Debug)]
pub struct LeafUnitCellVetoEventHandler<C: PeriodicCells, E: Estimator, P: Potential> {
    sampler: CellVetoSampler<C, E>,
    potential: P,
}

impl<C: PeriodicCells, E: Estimator, P: Potential> LeafUnitCellVetoEventHandler<C, E, P> {
    /// Errors: `Error::Configuration` if a charge is named but the potential does not take exactly
    /// two charges, if `cell_level` lies outside the tree, or if no cell lies outside the nearby
    /// region.
    pub fn new(
        setting: Arc<Setting>,
        cells: Arc<C>,
        cell_level: usize,
        estimator: E,
        potential: P,
        charge: Option<&str>,
        seed: Option<u64>,
    ) -> Result<Self> {
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
        Ok(Self { sampler, potential })
    }

    /// Total bounding rate of the upper-bound (`true`) or lower-bound table in `direction`.
    pub fn total_rate(&self, direction: usize, upper: bool) -> Option<f64> {
        self.sampler.total_rate(direction, upper)
    }
}

impl<C: PeriodicCells, E: Estimator, P: Potential> EventHandler for LeafUnitCellVetoEventHandler<C, E, P> {
    /// Target cell of the bounding event; `None` if no event can happen.
    type Request = Option<C::Cell>;
    /// Branch of the unit found in the target cell; `None` for an empty cell.
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

    /// Bring the active branch to the candidate time. With a target branch, evaluate the real
    /// derivative and lift the activity onto the target leaf unit with probability
    /// `real / bounding`. Returns the active branch followed by the target branch.
    fn send_out_state(&mut self, mut active: Vec<Branch>, target: Option<Branch>) -> Result<Vec<Branch>> {
        let (time, pending) = self.sampler.finish(&mut active)?;
        let Some(target) = target else {
            return Ok(active);
        };

        let (active_branch, active_leaf) = (pending.active_branch, pending.active_leaf);
        let target_leaf = only_leaf(&target)?;
        let derivative = {
            let active_unit = active
                .get(active_branch)
                .and_then(|b| b.unit(active_leaf))
                .ok_or_else(|| Error::Contract("active leaf unit missing".into()))?;
            let target_unit = target
                .unit(target_leaf)
                .ok_or_else(|| Error::Contract("target leaf unit missing".into()))?;
            let separation = self
                .sampler
                .cells
                .separation_vector(&active_unit.position, &target_unit.position);
            let charges = self.sampler.charges.pair(
                active_unit,
                target_unit,
                self.potential.number_charge_arguments(),
            )?;
            self.potential.derivative(pending.direction, &separation, &charges)
        };

        active.push(target);
        if self.sampler.accept(&pending, derivative)? {
            let target_branch = active.len() - 1;
            exchange_velocity(
                &self.sampler.setting,
                &mut active,
                (active_branch, active_leaf),
                (target_branch, target_leaf),
                time,
            )?;
            trace!(time = %time, derivative, "cell-veto lift accepted");
        }
        Ok(active)
    }
}

fn only_leaf(branch: &Branch) -> Result<NodeIndex> {
    let mut leaves = branch.leaves();
    match (leaves.next(), leaves.next()) {
        (Some(leaf), None) => Ok(leaf),
        _ => Err(Error::Contract(format!(
            "target branch {} must contain exactly one leaf unit",
            branch.root_identifier()
        ))),
    }
}
