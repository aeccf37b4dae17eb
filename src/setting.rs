//! Immutable run configuration shared by every component.
//!
//! A [`Setting`] fixes the spatial dimension, the edge lengths of the periodic hypercuboid, the
//! inverse temperature and the shape of the state tree. It is built once and passed by reference
//! (or inside an `Arc`) to the components that need it; nothing in the crate reads ambient globals.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Run configuration: geometry of the periodic box and shape of the state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    dimension: usize,
    system_lengths: Vec<f64>,
    beta: f64,
    number_of_root_nodes: usize,
    number_of_nodes_per_root_node: usize,
    number_of_node_levels: usize,
}

impl Setting {
    /// Create a validated setting.
    ///
    /// - `system_lengths`: one finite, positive edge length per dimension
    /// - `beta`: inverse temperature (> 0)
    /// - `number_of_nodes_per_root_node`: children of every composite root node (1 for point masses)
    /// - `number_of_node_levels`: depth of every branch (1 for point masses, 2 for molecules, ...)
    ///
    /// Errors: `Error::Configuration` on any inconsistent value.
    pub fn new(
        system_lengths: Vec<f64>,
        beta: f64,
        number_of_root_nodes: usize,
        number_of_nodes_per_root_node: usize,
        number_of_node_levels: usize,
    ) -> Result<Self> {
        let setting = Self {
            dimension: system_lengths.len(),
            system_lengths,
            beta,
            number_of_root_nodes,
            number_of_nodes_per_root_node,
            number_of_node_levels,
        };
        setting.validate()?;
        Ok(setting)
    }

    /// Cubic box with identical edge lengths in `dimension` dimensions.
    pub fn hypercubic(
        dimension: usize,
        system_length: f64,
        beta: f64,
        number_of_root_nodes: usize,
        number_of_nodes_per_root_node: usize,
        number_of_node_levels: usize,
    ) -> Result<Self> {
        Self::new(
            vec![system_length; dimension],
            beta,
            number_of_root_nodes,
            number_of_nodes_per_root_node,
            number_of_node_levels,
        )
    }

    /// Re-check invariants; useful after deserializing a setting from an external source.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.system_lengths.len() != self.dimension {
            return Err(Error::Configuration(
                "dimension must be > 0 and match the number of system lengths".into(),
            ));
        }
        if !self.system_lengths.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::Configuration(
                "system lengths must be finite and > 0".into(),
            ));
        }
        if !self.beta.is_finite() || self.beta <= 0.0 {
            return Err(Error::Configuration("beta must be finite and > 0".into()));
        }
        if self.number_of_root_nodes == 0 {
            return Err(Error::Configuration(
                "number_of_root_nodes must be > 0".into(),
            ));
        }
        if self.number_of_node_levels == 0 || self.number_of_nodes_per_root_node == 0 {
            return Err(Error::Configuration(
                "every branch needs at least one node and one level".into(),
            ));
        }
        if self.number_of_node_levels > 1 && self.number_of_nodes_per_root_node < 2 {
            return Err(Error::Configuration(
                "composite objects need more than one node per root node".into(),
            ));
        }
        Ok(())
    }

    /// Spatial dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Edge lengths of the periodic box.
    #[inline]
    pub fn system_lengths(&self) -> &[f64] {
        &self.system_lengths
    }

    /// Inverse temperature.
    #[inline]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    #[inline]
    pub fn number_of_root_nodes(&self) -> usize {
        self.number_of_root_nodes
    }

    #[inline]
    pub fn number_of_nodes_per_root_node(&self) -> usize {
        self.number_of_nodes_per_root_node
    }

    #[inline]
    pub fn number_of_node_levels(&self) -> usize {
        self.number_of_node_levels
    }

    /// True if branches are composite objects (more than one level).
    #[inline]
    pub fn has_composite_objects(&self) -> bool {
        self.number_of_node_levels > 1
    }

    /// Wrap a single coordinate into `[0, L_d)`.
    #[inline]
    pub fn correct_position_entry(&self, value: f64, direction: usize) -> f64 {
        let length = self.system_lengths[direction];
        let wrapped = value.rem_euclid(length);
        // rem_euclid can round up to exactly `length` for tiny negative inputs
        if wrapped >= length {
            0.0
        } else {
            wrapped
        }
    }

    /// Wrap every coordinate of `position` into the box.
    pub fn correct_position(&self, position: &mut [f64]) {
        for (d, x) in position.iter_mut().enumerate() {
            *x = self.correct_position_entry(*x, d);
        }
    }

    /// Minimum-image separation vector pointing from `from` to `to`.
    pub fn separation_vector(&self, from: &[f64], to: &[f64]) -> Vec<f64> {
        from.iter()
            .zip(to)
            .zip(&self.system_lengths)
            .map(|((&a, &b), &length)| {
                let mut s = (b - a).rem_euclid(length);
                if s > 0.5 * length {
                    s -= length;
                }
                s
            })
            .collect()
    }

    /// Check that a vector has the configured dimension and finite entries.
    pub fn check_vector(&self, what: &str, vector: &[f64]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::InvalidParam(format!(
                "{what} has length {} but the dimension is {}",
                vector.len(),
                self.dimension
            )));
        }
        if !vector.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam(format!("{what} must be finite")));
        }
        Ok(())
    }
}
