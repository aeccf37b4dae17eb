//! Cell-occupancy index with bounded per-cell capacity and one out-of-band active unit.
//!
//! Every relevant unit on the tracked level (`cell_level` = identifier length) is filed under the
//! cell its position maps to. A cell holds at most `capacity` identifiers in its occupant list;
//! further identifiers go to the cell's surplus list. The single active unit is tracked separately
//! and never shows up in either list, so lookups return interaction candidates only.

use crate::cells::Cells;
use crate::core::{Branch, StateId, Time, Unit};
use crate::error::{Error, Result};
use crate::setting::Setting;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Which units on the tracked level the index stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    /// Every unit on the tracked level.
    All,
    /// Only units whose named charge is present and nonzero.
    NonzeroCharge(String),
}

impl Relevance {
    #[inline]
    pub fn admits(&self, unit: &Unit) -> bool {
        match self {
            Relevance::All => true,
            Relevance::NonzeroCharge(name) => unit.charge_value(name).is_some_and(|q| q != 0.0),
        }
    }
}

/// Cell-occupancy index over a cell system `C`.
#[derive(Debug)]
pub struct CellOccupancy<C: Cells> {
    cells: Arc<C>,
    cell_level: usize,
    capacity: Option<usize>,
    relevance: Relevance,
    occupants: HashMap<C::Cell, Vec<StateId>>,
    surplus: BTreeMap<C::Cell, Vec<StateId>>,
    active: Option<(C::Cell, StateId)>,
    last_time_stamp: Option<Time>,
    initialized: bool,
}

impl<C: Cells> CellOccupancy<C> {
    /// Create an empty index.
    ///
    /// - `cell_level`: identifier length of the tracked units (1 = roots)
    /// - `capacity`: maximum occupants per cell; values `<= 0` mean unbounded
    /// - `charge`: if given, only units with this charge unequal zero are stored
    ///
    /// Errors: `Error::Configuration` if `cell_level` is outside the tree, or if a charge filter is
    /// requested on a level that stores composite objects (which carry no charge).
    pub fn new(
        cells: Arc<C>,
        setting: &Setting,
        cell_level: usize,
        capacity: i64,
        charge: Option<&str>,
    ) -> Result<Self> {
        debug!(cell_level, capacity, ?charge, "creating cell-occupancy index");
        if cell_level == 0 || cell_level > setting.number_of_node_levels() {
            return Err(Error::Configuration(format!(
                "cell level {cell_level} outside of the tree depth 1..={}",
                setting.number_of_node_levels()
            )));
        }
        if charge.is_some() && cell_level < setting.number_of_node_levels() {
            return Err(Error::Configuration(
                "chosen cell level stores composite objects which cannot carry a charge".into(),
            ));
        }
        let capacity = usize::try_from(capacity).ok().filter(|&c| c > 0);
        let relevance = match charge {
            Some(name) => Relevance::NonzeroCharge(name.to_owned()),
            None => Relevance::All,
        };
        let occupants = cells.cells().into_iter().map(|c| (c, Vec::new())).collect();
        Ok(Self {
            cells,
            cell_level,
            capacity,
            relevance,
            occupants,
            surplus: BTreeMap::new(),
            active: None,
            last_time_stamp: None,
            initialized: false,
        })
    }

    /// File every relevant unit of the full global state. Call exactly once before any other
    /// operation.
    pub fn initialize(&mut self, full_state: &[Branch]) -> Result<()> {
        if self.initialized {
            return Err(Error::Contract("cell-occupancy index is already initialized".into()));
        }
        for branch in full_state {
            for index in branch.nodes_on_level(self.cell_level) {
                let Some(unit) = branch.unit(index) else {
                    continue;
                };
                if self.relevance.admits(unit) {
                    let cell = self.cells.position_to_cell(&unit.position);
                    self.insert(cell, unit.identifier.clone());
                }
            }
        }
        self.initialized = true;
        debug!(
            surplus = self.surplus.values().map(Vec::len).sum::<usize>(),
            "cell-occupancy index initialized"
        );
        Ok(())
    }

    /// Identifiers stored for `cell`, never including the active identifier.
    pub fn lookup(&self, cell: C::Cell) -> &[StateId] {
        self.occupants.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// Track the new active unit.
    ///
    /// `branches` is the committed out-state of an event. It must contain exactly one active unit on
    /// the tracked level. If that unit differs from the previously active one, the previous one
    /// returns into the index and the new one is taken out (promoting a surplus identifier of its
    /// cell into the freed occupant slot). The previous unit is filed under the cell of its position
    /// in `branches` when the out-state carries it, and under its last tracked cell otherwise. If
    /// the active identifier is unchanged, only the active cell is recomputed.
    ///
    /// Errors: `Error::Contract` before `initialize`, for zero or several active units on the
    /// tracked level, for a time stamp older than the one of the previous update, or if the new
    /// active identifier is not stored in its cell.
    pub fn update(&mut self, branches: &[Branch]) -> Result<()> {
        if !self.initialized {
            return Err(Error::Contract("cell-occupancy index used before initialize".into()));
        }
        let level = self.cell_level;
        let units: Vec<&Unit> = branches
            .iter()
            .flat_map(|branch| {
                branch
                    .nodes_on_level(level)
                    .filter_map(move |index| branch.unit(index))
            })
            .collect();
        let mut moving = units.iter().filter(|unit| unit.is_active());
        let (Some(&new_active), None) = (moving.next(), moving.next()) else {
            return Err(Error::Contract(format!(
                "expected exactly one active unit on cell level {level}"
            )));
        };
        self.check_time_stamp(new_active.time_stamp())?;

        if let Some((active_cell, identifier)) = self.active.as_mut() {
            if *identifier == new_active.identifier {
                let cell = self.cells.position_to_cell(&new_active.position);
                if *active_cell != cell {
                    trace!(identifier = %new_active.identifier, "active unit changed its cell");
                }
                *active_cell = cell;
                return Ok(());
            }
        }

        if let Some((cell, identifier)) = self.active.take() {
            let cell = units
                .iter()
                .find(|unit| unit.identifier == identifier)
                .map_or(cell, |unit| self.cells.position_to_cell(&unit.position));
            self.insert(cell, identifier);
        }
        if self.relevance.admits(new_active) {
            let cell = self.cells.position_to_cell(&new_active.position);
            self.take_out(cell, &new_active.identifier)?;
            trace!(identifier = %new_active.identifier, ?cell, "new active unit");
            self.active = Some((cell, new_active.identifier.clone()));
        } else {
            trace!(identifier = %new_active.identifier, "active unit is not relevant");
        }
        Ok(())
    }

    /// All surplus identifiers, cell by cell. Restartable: every call yields the full sequence.
    pub fn yield_surplus(&self) -> impl Iterator<Item = &StateId> + '_ {
        self.surplus.values().flatten()
    }

    /// Cell and identifier of the active unit; empty if it is not tracked.
    pub fn yield_active_cells(&self) -> impl Iterator<Item = (C::Cell, &StateId)> + '_ {
        self.active.iter().map(|(cell, id)| (*cell, id))
    }

    #[inline]
    pub fn cells(&self) -> &Arc<C> {
        &self.cells
    }

    #[inline]
    pub fn cell_level(&self) -> usize {
        self.cell_level
    }

    /// `None` for unbounded capacity.
    #[inline]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[inline]
    pub fn relevance(&self) -> &Relevance {
        &self.relevance
    }

    fn insert(&mut self, cell: C::Cell, identifier: StateId) {
        let occupants = self.occupants.entry(cell).or_default();
        if self.capacity.is_none_or(|c| occupants.len() < c) {
            occupants.push(identifier);
        } else {
            self.surplus.entry(cell).or_default().push(identifier);
        }
    }

    fn take_out(&mut self, cell: C::Cell, identifier: &StateId) -> Result<()> {
        let occupants = self.occupants.entry(cell).or_default();
        if let Some(position) = occupants.iter().position(|id| id == identifier) {
            occupants.remove(position);
            if let Some(promoted) = self.surplus.get_mut(&cell).and_then(Vec::pop) {
                occupants.push(promoted);
            }
        } else {
            let surplus = self.surplus.get_mut(&cell).ok_or_else(|| missing(identifier, cell))?;
            let position = surplus
                .iter()
                .position(|id| id == identifier)
                .ok_or_else(|| missing(identifier, cell))?;
            surplus.remove(position);
        }
        if self.surplus.get(&cell).is_some_and(Vec::is_empty) {
            self.surplus.remove(&cell);
        }
        Ok(())
    }

    fn check_time_stamp(&mut self, time_stamp: Option<Time>) -> Result<()> {
        let Some(time_stamp) = time_stamp else {
            return Ok(());
        };
        if let Some(last) = self.last_time_stamp {
            if time_stamp < last {
                return Err(Error::Contract(format!(
                    "active time stamp {time_stamp} precedes the previously seen {last}"
                )));
            }
        }
        self.last_time_stamp = Some(time_stamp);
        Ok(())
    }
}

fn missing<T: std::fmt::Debug>(identifier: &StateId, cell: T) -> Error {
    Error::Contract(format!(
        "active identifier {identifier} is not stored in cell {cell:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{activate, Motion, ROOT};

    /// Unit interval cut into `n` equal cells.
    #[derive(Debug)]
    struct Line {
        n: usize,
    }

    impl Cells for Line {
        type Cell = usize;

        fn position_to_cell(&self, position: &[f64]) -> usize {
            ((position[0] * self.n as f64) as usize).min(self.n - 1)
        }

        fn cells(&self) -> Vec<usize> {
            (0..self.n).collect()
        }

        fn separation_vector(&self, from: &[f64], to: &[f64]) -> Vec<f64> {
            vec![to[0] - from[0]]
        }
    }

    fn setting(roots: usize) -> Setting {
        Setting::hypercubic(1, 1.0, 1.0, roots, 1, 1).expect("valid setting")
    }

    fn point(id: usize, x: f64) -> Branch {
        let unit = Unit::new(StateId::root_id(id), vec![x]).expect("valid unit");
        Branch::new(unit, 1.0).expect("valid branch")
    }

    fn moving(id: usize, x: f64, t: f64) -> Branch {
        let mut b = point(id, x);
        if let Some(node) = b.node_mut(ROOT) {
            node.unit.motion = Some(Motion::new(vec![1.0], Time::from_float(t)));
        }
        b
    }

    #[test]
    fn capacity_one_fills_surplus_in_order() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 1 }), &setting(3), 1, 1, None)?;
        occ.initialize(&[point(0, 0.1), point(1, 0.2), point(2, 0.3)])?;
        assert_eq!(occ.lookup(0), &[StateId::root_id(0)]);
        let surplus: Vec<_> = occ.yield_surplus().cloned().collect();
        assert_eq!(surplus, vec![StateId::root_id(1), StateId::root_id(2)]);
        Ok(())
    }

    #[test]
    fn activation_promotes_last_surplus_entry() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 1 }), &setting(3), 1, 1, None)?;
        occ.initialize(&[point(0, 0.1), point(1, 0.2), point(2, 0.3)])?;
        occ.update(&[moving(0, 0.1, 0.0)])?;
        assert_eq!(occ.lookup(0), &[StateId::root_id(2)]);
        assert_eq!(occ.yield_surplus().cloned().collect::<Vec<_>>(), vec![StateId::root_id(1)]);
        assert_eq!(
            occ.yield_active_cells().map(|(c, id)| (c, id.clone())).collect::<Vec<_>>(),
            vec![(0, StateId::root_id(0))]
        );
        // Hand activity to a surplus unit: the old active returns as surplus.
        occ.update(&[moving(1, 0.2, 0.5)])?;
        assert_eq!(occ.lookup(0), &[StateId::root_id(2)]);
        assert_eq!(occ.yield_surplus().cloned().collect::<Vec<_>>(), vec![StateId::root_id(0)]);
        Ok(())
    }

    #[test]
    fn unbounded_capacity_never_uses_surplus() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 2 }), &setting(4), 1, 0, None)?;
        occ.initialize(&[point(0, 0.1), point(1, 0.2), point(2, 0.3), point(3, 0.7)])?;
        assert_eq!(occ.capacity(), None);
        assert_eq!(occ.lookup(0).len(), 3);
        assert_eq!(occ.yield_surplus().count(), 0);
        occ.update(&[moving(1, 0.2, 0.0)])?;
        assert_eq!(occ.lookup(0), &[StateId::root_id(0), StateId::root_id(2)]);
        assert_eq!(occ.yield_surplus().count(), 0);
        Ok(())
    }

    #[test]
    fn same_identifier_only_recomputes_cell() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 2 }), &setting(2), 1, 1, None)?;
        occ.initialize(&[point(0, 0.4), point(1, 0.8)])?;
        occ.update(&[moving(0, 0.4, 0.0)])?;
        occ.update(&[moving(0, 0.6, 0.1)])?;
        assert_eq!(occ.yield_active_cells().map(|(c, _)| c).collect::<Vec<_>>(), vec![1]);
        assert!(occ.lookup(0).is_empty());
        Ok(())
    }

    #[test]
    fn lifted_unit_returns_to_cell_of_committed_position() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 2 }), &setting(2), 1, 1, None)?;
        occ.initialize(&[point(0, 0.2), point(1, 0.3)])?;
        occ.update(&[moving(0, 0.2, 0.0)])?;
        // Unit 0 crossed into cell 1 before handing over without an intermediate update.
        occ.update(&[point(0, 0.7), moving(1, 0.3, 0.5)])?;
        assert_eq!(occ.lookup(1), &[StateId::root_id(0)]);
        assert!(occ.lookup(0).is_empty());
        Ok(())
    }

    #[test]
    fn update_requires_exactly_one_unit() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 1 }), &setting(2), 1, 1, None)?;
        occ.initialize(&[point(0, 0.1), point(1, 0.2)])?;
        let err = occ.update(&[moving(0, 0.1, 0.0), moving(1, 0.2, 0.0)]).unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
        let err = occ.update(&[]).unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
        Ok(())
    }

    #[test]
    fn update_rejects_older_time_stamp() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 1 }), &setting(2), 1, 1, None)?;
        occ.initialize(&[point(0, 0.1), point(1, 0.2)])?;
        occ.update(&[moving(0, 0.1, 1.0)])?;
        let err = occ.update(&[moving(1, 0.2, 0.5)]).unwrap_err();
        assert!(err.to_string().contains("precedes"));
        Ok(())
    }

    #[test]
    fn update_before_initialize_is_contract_violation() -> Result<()> {
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 1 }), &setting(1), 1, 1, None)?;
        assert!(matches!(occ.update(&[moving(0, 0.1, 0.0)]), Err(Error::Contract(_))));
        Ok(())
    }

    #[test]
    fn charge_filter_on_composite_level_rejected() {
        let s = Setting::hypercubic(1, 1.0, 1.0, 2, 3, 2).expect("valid setting");
        let err = CellOccupancy::new(Arc::new(Line { n: 1 }), &s, 1, 1, Some("charge")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn charge_filter_skips_neutral_units() -> Result<()> {
        let s = Setting::hypercubic(1, 1.0, 1.0, 2, 3, 2)?;
        let mut branches = Vec::new();
        for (id, q) in [(0usize, 1.0), (1, 0.0)] {
            let mut b = Branch::new(Unit::new(StateId::root_id(id), vec![0.5])?, 1.0)?;
            for k in 0..2 {
                let leaf = Unit::new(StateId::new(vec![id, k]), vec![0.5])?.with_charge([("charge", q)]);
                b.add_child(ROOT, leaf, 0.5)?;
            }
            branches.push(b);
        }
        let mut occ = CellOccupancy::new(Arc::new(Line { n: 1 }), &s, 2, 0, Some("charge"))?;
        occ.initialize(&branches)?;
        assert_eq!(occ.lookup(0), &[StateId::new(vec![0, 0]), StateId::new(vec![0, 1])]);

        // Activate a neutral leaf: nothing tracked, nothing removed.
        let mut neutral = Branch::new(Unit::new(StateId::root_id(1), vec![0.5])?, 1.0)?;
        let leaf = neutral.add_child(
            ROOT,
            Unit::new(StateId::new(vec![1, 0]), vec![0.5])?.with_charge([("charge", 0.0)]),
            0.5,
        )?;
        activate(&s, &mut neutral, leaf, &[1.0], Time::ZERO)?;
        occ.update(&[neutral])?;
        assert_eq!(occ.yield_active_cells().count(), 0);
        assert_eq!(occ.lookup(0).len(), 2);
        Ok(())
    }
}
