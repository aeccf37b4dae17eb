use crate::core::time::Time;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Components with an absolute value below this are treated as zero velocity.
pub const VELOCITY_EPS: f64 = 1e-9;

/// Address of a unit in the global state.
///
/// The first entry selects the root node (branch), every further entry selects a child on the next
/// level. The length of the identifier therefore equals the depth of the unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StateId(Vec<usize>);

impl StateId {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// Identifier of a root node.
    pub fn root_id(index: usize) -> Self {
        Self(vec![index])
    }

    /// Index of the branch this identifier lives in.
    #[inline]
    pub fn root(&self) -> Option<usize> {
        self.0.first().copied()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Identifier of the `index`-th child of this unit.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Identifier of the ancestor on `level` (or a clone if already at or above that level).
    pub fn truncated(&self, level: usize) -> Self {
        Self(self.0.iter().take(level).copied().collect())
    }

    /// True if `self` addresses `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &StateId) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl From<Vec<usize>> for StateId {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (k, index) in self.0.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{index}")?;
        }
        write!(f, ")")
    }
}

/// Velocity of a moving unit together with the time its position refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub velocity: Vec<f64>,
    pub time_stamp: Time,
}

impl Motion {
    pub fn new(velocity: Vec<f64>, time_stamp: Time) -> Self {
        Self {
            velocity,
            time_stamp,
        }
    }

    /// True if every velocity component is (numerically) zero.
    pub fn is_at_rest(&self) -> bool {
        self.velocity.iter().all(|c| c.abs() < VELOCITY_EPS)
    }
}

/// Point mass or composite object stored in a node of the state tree.
///
/// - `identifier`: address in the tree (length = depth)
/// - `position`: position vector, wrapped into the periodic box
/// - `motion`: velocity and time stamp, `None` while the unit is at rest
/// - `charge`: named charges; only leaf units carry them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub identifier: StateId,
    pub position: Vec<f64>,
    pub motion: Option<Motion>,
    pub charge: Option<BTreeMap<String, f64>>,
}

impl Unit {
    /// Create a unit at rest after validating that the position is finite.
    pub fn new(identifier: StateId, position: Vec<f64>) -> Result<Self> {
        if identifier.depth() == 0 {
            return Err(Error::InvalidParam("identifier cannot be empty".into()));
        }
        if !position.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        Ok(Self {
            identifier,
            position,
            motion: None,
            charge: None,
        })
    }

    /// Builder-style setter for the named charges of a leaf unit.
    pub fn with_charge<I, S>(mut self, charges: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.charge = Some(charges.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Builder-style setter for the motion of an active unit.
    pub fn with_motion(mut self, velocity: Vec<f64>, time_stamp: Time) -> Result<Self> {
        if !velocity.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        self.motion = Some(Motion::new(velocity, time_stamp));
        Ok(self)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.motion.is_some()
    }

    #[inline]
    pub fn velocity(&self) -> Option<&[f64]> {
        self.motion.as_ref().map(|m| m.velocity.as_slice())
    }

    #[inline]
    pub fn time_stamp(&self) -> Option<Time> {
        self.motion.as_ref().map(|m| m.time_stamp)
    }

    /// Value of the named charge; `None` if the unit carries no such charge.
    pub fn charge_value(&self, name: &str) -> Option<f64> {
        self.charge.as_ref().and_then(|c| c.get(name).copied())
    }
}
