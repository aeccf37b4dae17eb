mod common;

use chainsim::cells::Cells;
use chainsim::core::{Branch, StateId, Time};
use chainsim::error::{Error, Result};
use chainsim::event_handler::{
    CellBoundaryEventHandler, EventHandler, FinalTimeEndOfRunEventHandler, InitialChainStartOfRunEventHandler,
    LeafUnitCellVetoEventHandler, SingleIndependentActivePeriodicDirectionEndOfChainEventHandler,
};
use chainsim::occupancy::CellOccupancy;
use chainsim::setting::Setting;
use common::{charged_point, DistanceEstimator, InverseDistance, Lattice};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

type Veto = LeafUnitCellVetoEventHandler<Lattice, DistanceEstimator, InverseDistance>;

fn charged_gas(setting: &Setting, count: usize, seed: u64) -> Result<Vec<Branch>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let position = (0..setting.dimension()).map(|_| rng.random::<f64>()).collect();
            charged_point(id, position, if id % 2 == 0 { 1.0 } else { -1.0 })
        })
        .collect()
}

fn root_index(branch: &Branch) -> Result<usize> {
    branch
        .root_identifier()
        .root()
        .ok_or_else(|| Error::Contract("branch without root identifier".into()))
}

fn store(global: &mut [Branch], out: &[Branch]) -> Result<()> {
    for branch in out {
        global[root_index(branch)?] = branch.clone();
    }
    Ok(())
}

fn active_of(out: Vec<Branch>) -> Vec<Branch> {
    out.into_iter().filter(Branch::is_active).collect()
}

/// An empty target cell leaves the active unit in charge: only time advances.
#[test]
fn empty_target_cell_keeps_active_unit() -> Result<()> {
    let setting = Arc::new(Setting::hypercubic(2, 1.0, 1.0, 2, 1, 1)?);
    let cells = Arc::new(Lattice::new((*setting).clone(), 5));
    let mut occupancy = CellOccupancy::new(cells.clone(), &setting, 1, 1, Some("charge"))?;
    let global = vec![
        charged_point(0, vec![0.5, 0.5], 1.0)?,
        charged_point(1, vec![0.55, 0.45], -1.0)?,
    ];
    occupancy.initialize(&global)?;

    let mut start = InitialChainStartOfRunEventHandler::new(setting.clone(), 0, 1.0, StateId::root_id(0))?;
    start.send_event_time(&[])?;
    let active = start.send_out_state(Vec::new(), global[0].clone())?;
    occupancy.update(&active)?;
    let before: Vec<(usize, StateId)> = occupancy.yield_active_cells().map(|(c, id)| (c, id.clone())).collect();

    let mut veto: Veto = LeafUnitCellVetoEventHandler::new(
        setting.clone(),
        cells.clone(),
        1,
        DistanceEstimator,
        InverseDistance,
        Some("charge"),
        Some(17),
    )?;
    let (time, target) = veto.send_event_time(&active)?;
    let target = target.ok_or_else(|| Error::Contract("expected a target cell".into()))?;
    // Both units share the central cell's neighbourhood, far cells are empty.
    assert!(occupancy.lookup(target).is_empty());

    let out = veto.send_out_state(active, None)?;
    assert_eq!(out.len(), 1);
    let unit = &out[0].root().unit;
    assert_eq!(unit.identifier, StateId::root_id(0));
    assert_eq!(unit.velocity(), Some(&[1.0, 0.0][..]));
    assert_eq!(unit.time_stamp(), Some(time));

    occupancy.update(&out)?;
    let after: Vec<(usize, StateId)> = occupancy.yield_active_cells().map(|(c, id)| (c, id.clone())).collect();
    assert_eq!(after[0].1, before[0].1);
    assert_eq!(after[0].0, cells.position_to_cell(&unit.position));
    Ok(())
}

/// Drive all handlers the way a scheduler does: the earliest candidate event wins, confirmations
/// come from the occupancy index, and out-states flow back into the global state and the index.
/// Every stored identifier must stay filed under the cell of its current position.
#[test]
fn scheduled_run_keeps_single_active_unit() -> Result<()> {
    let count = 20;
    let setting = Arc::new(Setting::hypercubic(2, 1.0, 1.0, count, 1, 1)?);
    let cells = Arc::new(Lattice::new((*setting).clone(), 5));
    let mut occupancy = CellOccupancy::new(cells.clone(), &setting, 1, 1, Some("charge"))?;
    let mut global = charged_gas(&setting, count, 31)?;
    occupancy.initialize(&global)?;

    let mut start = InitialChainStartOfRunEventHandler::new(setting.clone(), 0, 1.0, StateId::root_id(0))?;
    let mut chain =
        SingleIndependentActivePeriodicDirectionEndOfChainEventHandler::new(setting.clone(), 0.3, Some(4))?;
    let mut end = FinalTimeEndOfRunEventHandler::new(setting.clone(), 2.0)?;
    let mut boundary = CellBoundaryEventHandler::new(setting.clone(), cells.clone(), 1)?;
    let mut veto: Veto = LeafUnitCellVetoEventHandler::new(
        setting.clone(),
        cells.clone(),
        1,
        DistanceEstimator,
        InverseDistance,
        Some("charge"),
        Some(9),
    )?;

    let (_, initial) = start.send_event_time(&[])?;
    let out = start.send_out_state(Vec::new(), global[root_index_of(&initial)?].clone())?;
    store(&mut global, &out)?;
    occupancy.update(&out)?;
    let mut active = active_of(out);

    let (end_time, ()) = end.send_event_time(&active)?;
    let mut chain_event = chain.send_event_time(&active)?;
    let mut now = Time::ZERO;
    let mut crossings = 0;
    loop {
        let (veto_time, target) = veto.send_event_time(&active)?;
        let (boundary_time, ()) = boundary.send_event_time(&active)?;
        let earliest = [veto_time, boundary_time, chain_event.0]
            .into_iter()
            .min()
            .unwrap_or(Time::INFINITY);
        if end_time <= earliest {
            let out = end.send_out_state(active.clone(), ())?;
            store(&mut global, &out)?;
            assert!(out.iter().all(|b| b.latest_time_stamp() == Some(end_time)));
            break;
        }
        assert!(earliest >= now);
        now = earliest;
        let out = if chain_event.0 == earliest {
            let nominated = root_index_of(&chain_event.1)?;
            let confirmed = if nominated == root_index(&active[0])? {
                active[0].clone()
            } else {
                global[nominated].clone()
            };
            chain.send_out_state(active.clone(), confirmed)?
        } else if boundary_time == earliest {
            crossings += 1;
            boundary.send_out_state(active.clone(), ())?
        } else {
            let partner = target
                .and_then(|cell| occupancy.lookup(cell).first().cloned())
                .and_then(|id| id.root());
            veto.send_out_state(active.clone(), partner.map(|p| global[p].clone()))?
        };
        store(&mut global, &out)?;
        occupancy.update(&out)?;
        if chain_event.0 == earliest {
            chain_event = chain.send_event_time(&active_of(out.clone()))?;
        }
        active = active_of(out);
        assert_eq!(active.len(), 1, "exactly one active branch");
        assert_eq!(active[0].active_leaves().count(), 1);
        check_cells(&occupancy, &cells, &global)?;
    }
    assert!(crossings > 0);
    assert_eq!(global.iter().filter(|b| b.is_active()).count(), 1);
    Ok(())
}

/// The active unit sits in its tracked cell, every other unit in the cell it is filed under.
fn check_cells(occupancy: &CellOccupancy<Lattice>, cells: &Lattice, global: &[Branch]) -> Result<()> {
    let (active_cell, active_id) = occupancy
        .yield_active_cells()
        .next()
        .ok_or_else(|| Error::Contract("active unit not tracked".into()))?;
    let position = &global[root_index_of(active_id)?].root().unit.position;
    assert_eq!(cells.position_to_cell(position), active_cell);
    for cell in cells.cells() {
        for id in occupancy.lookup(cell) {
            assert_ne!(id, active_id);
            let position = &global[root_index_of(id)?].root().unit.position;
            assert_eq!(cells.position_to_cell(position), cell, "{id} filed under stale cell {cell}");
        }
    }
    Ok(())
}

fn root_index_of(id: &StateId) -> Result<usize> {
    id.root().ok_or_else(|| Error::Contract("empty identifier".into()))
}
