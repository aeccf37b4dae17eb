//! Time slicing and velocity bookkeeping for branches of the state tree.
//!
//! A moving unit stores its position at `time_stamp`; its current position is implied by the
//! velocity. Slicing collapses that pending motion to a common instant. Velocity changes of a node
//! are propagated to its ancestors scaled by the node weight, so that a composite object always
//! moves with the weighted sum of its children's velocities.

use crate::core::time::Time;
use crate::core::tree::{Branch, NodeIndex};
use crate::core::unit::Motion;
use crate::error::{Error, Result};
use crate::setting::Setting;

/// Resolve all pending motion of `branches` at `target` and clear every velocity and time stamp.
///
/// Resolved branches are left untouched, so slicing is idempotent.
///
/// Errors: `Error::Contract` if `target` precedes any time stamp in the branches.
pub fn time_slice(setting: &Setting, branches: &mut [Branch], target: Time) -> Result<()> {
    for branch in branches.iter_mut() {
        check_causality(branch, target)?;
        for index in 0..branch.len() {
            drift_node(setting, branch, index, target)?;
            if let Some(node) = branch.node_mut(index) {
                node.unit.motion = None;
            }
        }
    }
    Ok(())
}

/// Move every moving unit of `branches` to its position at `target` and re-stamp it, keeping the
/// velocity. Used for branches that stay active past the event.
///
/// Errors: `Error::Contract` if `target` precedes any time stamp in the branches.
pub fn advance(setting: &Setting, branches: &mut [Branch], target: Time) -> Result<()> {
    for branch in branches.iter_mut() {
        check_causality(branch, target)?;
        for index in 0..branch.len() {
            drift_node(setting, branch, index, target)?;
        }
    }
    Ok(())
}

/// Set `node` and its whole subtree in motion with `velocity` at `time_stamp`.
///
/// The subtree translates rigidly; every ancestor receives the velocity change scaled by the
/// weights along the path.
///
/// Errors:
/// - `Error::Contract` if `time_stamp` is older than the newest stamp in the branch, or if a unit
///   of the subtree already moves
/// - `Error::InvalidParam` for a velocity of the wrong dimension
pub fn activate(
    setting: &Setting,
    branch: &mut Branch,
    node: NodeIndex,
    velocity: &[f64],
    time_stamp: Time,
) -> Result<()> {
    setting.check_vector("velocity", velocity)?;
    for (_, n) in branch.iter() {
        setting.check_vector("position", &n.unit.position)?;
    }
    if let Some(latest) = branch.latest_time_stamp() {
        if time_stamp < latest {
            return Err(Error::Contract(format!(
                "activation time stamp {time_stamp} precedes the latest time stamp {latest} of branch {}",
                branch.root_identifier()
            )));
        }
    }
    let subtree: Vec<NodeIndex> = branch.subtree(node).collect();
    if subtree.is_empty() {
        return Err(Error::InvalidParam(format!("node index {node} out of range")));
    }
    for &index in &subtree {
        let unit = &branch.node_checked(index)?.unit;
        if unit.is_active() {
            return Err(Error::Contract(format!(
                "unit {} is already active",
                unit.identifier
            )));
        }
    }
    for &index in subtree.iter().filter(|&&i| i != node) {
        branch.node_checked_mut(index)?.unit.motion = Some(Motion::new(velocity.to_vec(), time_stamp));
    }
    propagate_velocity_change(setting, branch, node, velocity, time_stamp)
}

/// Stop `node` and its subtree at `time`, propagating the removed velocity to the ancestors.
///
/// Errors: `Error::Contract` if `node` is not active or `time` precedes its time stamp.
pub fn deactivate(setting: &Setting, branch: &mut Branch, node: NodeIndex, time: Time) -> Result<()> {
    let velocity = {
        let unit = &branch.node_checked(node)?.unit;
        let motion = unit.motion.as_ref().ok_or_else(|| {
            Error::Contract(format!("unit {} is not active", unit.identifier))
        })?;
        motion.velocity.iter().map(|c| -c).collect::<Vec<f64>>()
    };
    let descendants: Vec<NodeIndex> = branch.subtree(node).filter(|&i| i != node).collect();
    for index in descendants {
        drift_node(setting, branch, index, time)?;
        branch.node_checked_mut(index)?.unit.motion = None;
    }
    propagate_velocity_change(setting, branch, node, &velocity, time)
}

/// Lift: transfer the motion of `from` onto `to` at `time`.
///
/// Both arguments are `(branch index, node index)` pairs into `branches`; they may live in the
/// same branch (composite object) or in different ones.
pub fn exchange_velocity(
    setting: &Setting,
    branches: &mut [Branch],
    from: (usize, NodeIndex),
    to: (usize, NodeIndex),
    time: Time,
) -> Result<()> {
    let count = branches.len();
    let out_of_range = || Error::InvalidParam(format!("branch index out of range ({count} branches)"));
    let velocity = branches
        .get(from.0)
        .ok_or_else(out_of_range)?
        .node_checked(from.1)?
        .unit
        .velocity()
        .map(<[f64]>::to_vec)
        .ok_or_else(|| Error::Contract("lift source is not active".into()))?;
    deactivate(setting, branches.get_mut(from.0).ok_or_else(out_of_range)?, from.1, time)?;
    activate(setting, branches.get_mut(to.0).ok_or_else(out_of_range)?, to.1, &velocity, time)
}

/// Add `change` to the velocity of `start` and the weighted change to all of its ancestors.
fn propagate_velocity_change(
    setting: &Setting,
    branch: &mut Branch,
    start: NodeIndex,
    change: &[f64],
    time: Time,
) -> Result<()> {
    let mut delta = change.to_vec();
    let mut current = Some(start);
    while let Some(index) = current {
        shift_velocity(setting, branch, index, &delta, time)?;
        let node = branch.node_checked(index)?;
        delta.iter_mut().for_each(|c| *c *= node.weight);
        current = node.parent();
    }
    Ok(())
}

fn shift_velocity(
    setting: &Setting,
    branch: &mut Branch,
    index: NodeIndex,
    delta: &[f64],
    time: Time,
) -> Result<()> {
    drift_node(setting, branch, index, time)?;
    let unit = &mut branch.node_checked_mut(index)?.unit;
    let motion = match unit.motion.take() {
        Some(mut motion) => {
            for (v, d) in motion.velocity.iter_mut().zip(delta) {
                *v += d;
            }
            motion
        }
        None => Motion::new(delta.to_vec(), time),
    };
    if !motion.is_at_rest() {
        unit.motion = Some(motion);
    }
    Ok(())
}

/// Drift a single unit to `target` and re-stamp it; no-op for units at rest.
fn drift_node(setting: &Setting, branch: &mut Branch, index: NodeIndex, target: Time) -> Result<()> {
    let unit = &mut branch.node_checked_mut(index)?.unit;
    let Some(motion) = unit.motion.as_mut() else {
        return Ok(());
    };
    if target < motion.time_stamp {
        return Err(Error::Contract(format!(
            "cannot slice unit {} back in time from {} to {target}",
            unit.identifier, motion.time_stamp
        )));
    }
    let dt = target - motion.time_stamp;
    for (d, (x, v)) in unit.position.iter_mut().zip(&motion.velocity).enumerate() {
        *x = setting.correct_position_entry(*x + v * dt, d);
    }
    motion.time_stamp = target;
    Ok(())
}

fn check_causality(branch: &Branch, target: Time) -> Result<()> {
    match branch.latest_time_stamp() {
        Some(latest) if target < latest => Err(Error::Contract(format!(
            "target time {target} precedes time stamp {latest} in branch {}",
            branch.root_identifier()
        ))),
        _ => Ok(()),
    }
}
