//! End-of-chain events: change the direction of motion after a fixed chain time and, depending on
//! the handler, hand the activity to a freshly drawn unit.

use crate::core::{activate, advance, deactivate, time_slice, Branch, NodeIndex, StateId, Time};
use crate::error::{Error, Result};
use crate::event_handler::{analyse_velocity, single_active_leaf, EventHandler, HandlerPhase};
use crate::setting::Setting;
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, trace};

/// Keeps the active units and cycles their direction of motion, `d -> (d + 1) % dimension`, every
/// `chain_length` units of time.
#[derive(Debug)]
pub struct SameActivePeriodicDirectionEndOfChainEventHandler {
    setting: Arc<Setting>,
    chain_length: f64,
    event_time: Time,
    phase: HandlerPhase,
}

impl SameActivePeriodicDirectionEndOfChainEventHandler {
    /// Errors: `Error::Configuration` unless `chain_length > 0`.
    pub fn new(setting: Arc<Setting>, chain_length: f64) -> Result<Self> {
        debug!(chain_length, "creating SameActivePeriodicDirectionEndOfChainEventHandler");
        if !chain_length.is_finite() || chain_length <= 0.0 {
            return Err(Error::Configuration("chain_length must be finite and > 0".into()));
        }
        Ok(Self {
            setting,
            chain_length,
            event_time: Time::ZERO,
            phase: HandlerPhase::Idle,
        })
    }
}

impl EventHandler for SameActivePeriodicDirectionEndOfChainEventHandler {
    type Request = ();
    type Confirmation = ();

    fn number_send_event_time_arguments(&self) -> usize {
        1
    }

    fn number_send_out_state_arguments(&self) -> usize {
        2
    }

    /// Errors: `Error::Contract` unless `active` holds at least one active leaf unit and every one
    /// of them moves along a single axis.
    fn send_event_time(&mut self, active: &[Branch]) -> Result<(Time, ())> {
        let mut leaves = 0;
        for branch in active {
            for n in branch.active_leaves() {
                analyse_velocity(&leaf_velocity(branch, n)?)?;
                leaves += 1;
            }
        }
        if leaves == 0 {
            return Err(Error::Contract("end of chain without an active leaf unit".into()));
        }
        self.event_time = self.event_time + self.chain_length;
        self.phase.begin(self.event_time);
        Ok((self.event_time, ()))
    }

    fn send_out_state(&mut self, mut active: Vec<Branch>, _: ()) -> Result<Vec<Branch>> {
        let time = self
            .phase
            .finish("SameActivePeriodicDirectionEndOfChainEventHandler")?;
        advance(&self.setting, &mut active, time)?;
        let leaves: Vec<(usize, NodeIndex)> = active
            .iter()
            .enumerate()
            .flat_map(|(b, branch)| branch.active_leaves().map(move |n| (b, n)))
            .collect();
        let (&(b, n), rest) = leaves
            .split_first()
            .ok_or_else(|| Error::Contract("end of chain without an active leaf unit".into()))?;
        let velocity = leaf_velocity(&active[b], n)?;
        for &(b, n) in rest {
            if leaf_velocity(&active[b], n)? != velocity {
                return Err(Error::Contract("active leaf units move with different velocities".into()));
            }
        }
        let new_velocity = rotated_velocity(&self.setting, &velocity)?;
        for &(b, n) in &leaves {
            deactivate(&self.setting, &mut active[b], n, time)?;
        }
        for &(b, n) in &leaves {
            activate(&self.setting, &mut active[b], n, &new_velocity, time)?;
        }
        trace!(time = %time, ?new_velocity, "rotated direction of active leaf units");
        Ok(active)
    }
}

/// Every `chain_time` units of time, stops the single active leaf unit and activates a uniformly
/// drawn leaf unit in the next direction, `d -> (d + 1) % dimension`, with the same signed speed.
#[derive(Debug)]
pub struct SingleIndependentActivePeriodicDirectionEndOfChainEventHandler {
    setting: Arc<Setting>,
    chain_time: f64,
    event_time: Time,
    nominated: Option<StateId>,
    rng: StdRng,
    phase: HandlerPhase,
}

impl SingleIndependentActivePeriodicDirectionEndOfChainEventHandler {
    /// Errors: `Error::Configuration` unless `chain_time > 0`.
    pub fn new(setting: Arc<Setting>, chain_time: f64, seed: Option<u64>) -> Result<Self> {
        debug!(
            chain_time,
            ?seed,
            "creating SingleIndependentActivePeriodicDirectionEndOfChainEventHandler"
        );
        if !chain_time.is_finite() || chain_time <= 0.0 {
            return Err(Error::Configuration("chain_time must be finite and > 0".into()));
        }
        let rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        Ok(Self {
            setting,
            chain_time,
            event_time: Time::ZERO,
            nominated: None,
            rng,
            phase: HandlerPhase::Idle,
        })
    }

    fn draw_identifier(&mut self) -> StateId {
        let mut indices = vec![self.rng.random_range(0..self.setting.number_of_root_nodes())];
        for _ in 1..self.setting.number_of_node_levels() {
            indices.push(
                self.rng
                    .random_range(0..self.setting.number_of_nodes_per_root_node()),
            );
        }
        StateId::new(indices)
    }
}

impl EventHandler for SingleIndependentActivePeriodicDirectionEndOfChainEventHandler {
    /// Identifier of the leaf unit that becomes active.
    type Request = StateId;
    /// Branch containing the nominated leaf unit.
    type Confirmation = Branch;

    fn number_send_event_time_arguments(&self) -> usize {
        1
    }

    fn number_send_out_state_arguments(&self) -> usize {
        2
    }

    /// Errors: `Error::Contract` unless `active` holds a single active leaf unit whose time stamp lies
    /// between the previous and the new candidate time.
    fn send_event_time(&mut self, active: &[Branch]) -> Result<(Time, StateId)> {
        let (b, n) = single_active_leaf(active)?;
        analyse_velocity(&leaf_velocity(&active[b], n)?)?;
        let previous = self.event_time;
        self.event_time = self.event_time + self.chain_time;
        let stamp = active[b]
            .unit(n)
            .and_then(|u| u.time_stamp())
            .ok_or_else(|| Error::Contract("active leaf unit without time stamp".into()))?;
        if stamp < previous || stamp > self.event_time {
            return Err(Error::Contract(format!(
                "active time stamp {stamp} outside of the chain interval [{previous}, {}]",
                self.event_time
            )));
        }
        let nominated = self.draw_identifier();
        trace!(time = %self.event_time, %nominated, "end of chain nominates new active unit");
        self.nominated = Some(nominated.clone());
        self.phase.begin(self.event_time);
        Ok((self.event_time, nominated))
    }

    /// The outgoing branch is time-sliced at the candidate time and the nominated leaf unit of
    /// `new_active` is activated. If the nominated unit belongs to the active root, the change
    /// happens inside the active branch and a single branch is returned.
    fn send_out_state(&mut self, mut active: Vec<Branch>, mut new_active: Branch) -> Result<Vec<Branch>> {
        let time = self
            .phase
            .finish("SingleIndependentActivePeriodicDirectionEndOfChainEventHandler")?;
        let nominated = self
            .nominated
            .take()
            .ok_or_else(|| Error::Contract("no nominated identifier".into()))?;
        let (b, n) = single_active_leaf(&active)?;
        let new_velocity = rotated_velocity(&self.setting, &leaf_velocity(&active[b], n)?)?;

        if active[b].root_identifier() == new_active.root_identifier() {
            let mut branch = active.swap_remove(b);
            if !active.is_empty() {
                return Err(Error::Contract("end of chain with more than one active branch".into()));
            }
            advance(&self.setting, std::slice::from_mut(&mut branch), time)?;
            deactivate(&self.setting, &mut branch, n, time)?;
            let target = match branch.find(&nominated) {
                Some(index) => index,
                None => graft(&mut branch, &new_active, &nominated)?,
            };
            activate(&self.setting, &mut branch, target, &new_velocity, time)?;
            return Ok(vec![branch]);
        }

        time_slice(&self.setting, &mut active, time)?;
        let target = new_active.find(&nominated).ok_or_else(|| {
            Error::Contract(format!("nominated unit {nominated} missing in the confirmed branch"))
        })?;
        activate(&self.setting, &mut new_active, target, &new_velocity, time)?;
        active.push(new_active);
        Ok(active)
    }
}

fn leaf_velocity(branch: &Branch, node: NodeIndex) -> Result<Vec<f64>> {
    branch
        .unit(node)
        .and_then(|u| u.velocity())
        .map(<[f64]>::to_vec)
        .ok_or_else(|| Error::Contract("leaf unit is not active".into()))
}

fn rotated_velocity(setting: &Setting, velocity: &[f64]) -> Result<Vec<f64>> {
    let (direction, speed) = analyse_velocity(velocity)?;
    let mut rotated = vec![0.0; setting.dimension()];
    rotated[(direction + 1) % setting.dimension()] = speed;
    Ok(rotated)
}

/// Copy the path to `identifier` from `source` into `branch`, returning the index of its last node.
fn graft(branch: &mut Branch, source: &Branch, identifier: &StateId) -> Result<NodeIndex> {
    let mut parent = branch
        .find(&identifier.truncated(1))
        .ok_or_else(|| Error::Contract(format!("root of {identifier} missing in the active branch")))?;
    for level in 2..=identifier.depth() {
        let id = identifier.truncated(level);
        parent = match branch.find(&id) {
            Some(index) => index,
            None => {
                let node = source
                    .find(&id)
                    .and_then(|i| source.node(i))
                    .ok_or_else(|| Error::Contract(format!("unit {id} missing in the confirmed branch")))?;
                if node.unit.is_active() {
                    return Err(Error::Contract(format!("unit {id} outside of the active branch moves")));
                }
                branch.add_child(parent, node.unit.clone(), node.weight)?
            }
        };
    }
    Ok(parent)
}
