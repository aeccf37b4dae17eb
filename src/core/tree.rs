//! State tree: every branch is an arena of nodes rooted at index 0.
//!
//! Nodes own their children through index lists; the parent link is a plain back-reference. A
//! branch may be partial: a branch extracted for an active unit holds the path from the root down
//! to that unit plus the unit's subtree, and leaves out inactive siblings.

use crate::core::time::Time;
use crate::core::unit::{StateId, Unit};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Index of a node inside its [`Branch`].
pub type NodeIndex = usize;

/// A unit plus its position in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub unit: Unit,
    /// Fraction of the parent's physical property (e.g. mass) carried by this node.
    pub weight: f64,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

impl Node {
    #[inline]
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Root node plus (a subset of) its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    nodes: Vec<Node>,
}

/// Index of the root node of every branch.
pub const ROOT: NodeIndex = 0;

impl Branch {
    /// Start a branch from its root unit (identifier of length one).
    pub fn new(root: Unit, weight: f64) -> Result<Self> {
        if root.identifier.depth() != 1 {
            return Err(Error::InvalidParam(format!(
                "root unit must have an identifier of length 1, got {}",
                root.identifier
            )));
        }
        check_weight(weight)?;
        Ok(Self {
            nodes: vec![Node {
                unit: root,
                weight,
                parent: None,
                children: Vec::new(),
            }],
        })
    }

    /// Attach `unit` as the last child of `parent` and return its index.
    ///
    /// The child's identifier must extend the parent's identifier by exactly one index.
    pub fn add_child(&mut self, parent: NodeIndex, unit: Unit, weight: f64) -> Result<NodeIndex> {
        let parent_id = &self.node_checked(parent)?.unit.identifier;
        if unit.identifier.depth() != parent_id.depth() + 1 || !parent_id.is_prefix_of(&unit.identifier) {
            return Err(Error::InvalidParam(format!(
                "identifier {} is not a child identifier of {}",
                unit.identifier, parent_id
            )));
        }
        check_weight(weight)?;
        let index = self.nodes.len();
        self.nodes.push(Node {
            unit,
            weight,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        Ok(index)
    }

    /// Number of nodes stored in this branch.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Branches always contain their root.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[ROOT]
    }

    /// Identifier of the root unit.
    #[inline]
    pub fn root_identifier(&self) -> &StateId {
        &self.nodes[ROOT].unit.identifier
    }

    #[inline]
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index)
    }

    #[inline]
    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub(crate) fn node_checked(&self, index: NodeIndex) -> Result<&Node> {
        self.nodes
            .get(index)
            .ok_or_else(|| Error::InvalidParam(format!("node index {index} out of range")))
    }

    pub(crate) fn node_checked_mut(&mut self, index: NodeIndex) -> Result<&mut Node> {
        self.nodes
            .get_mut(index)
            .ok_or_else(|| Error::InvalidParam(format!("node index {index} out of range")))
    }

    /// Unit stored at `index`.
    #[inline]
    pub fn unit(&self, index: NodeIndex) -> Option<&Unit> {
        self.nodes.get(index).map(|n| &n.unit)
    }

    /// Pre-order traversal of the subtree below (and including) `start`.
    pub fn subtree(&self, start: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut stack = if start < self.nodes.len() { vec![start] } else { Vec::new() };
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.nodes[next].children.iter().rev().copied());
            Some(next)
        })
    }

    /// Pre-order traversal of the whole branch.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.subtree(ROOT).map(move |i| (i, &self.nodes[i]))
    }

    /// Leaf nodes in pre-order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.subtree(ROOT).filter(move |&i| self.nodes[i].is_leaf())
    }

    /// Nodes whose identifier has length `level`, in pre-order.
    pub fn nodes_on_level(&self, level: usize) -> impl Iterator<Item = NodeIndex> + '_ {
        self.subtree(ROOT)
            .filter(move |&i| self.nodes[i].unit.identifier.depth() == level)
    }

    /// Node carrying `identifier`, if present in this (possibly partial) branch.
    pub fn find(&self, identifier: &StateId) -> Option<NodeIndex> {
        self.iter()
            .find(|(_, node)| &node.unit.identifier == identifier)
            .map(|(i, _)| i)
    }

    /// Ancestor of `index` whose identifier has length `level` (the node itself if already there).
    pub fn ancestor_on_level(&self, index: NodeIndex, level: usize) -> Option<NodeIndex> {
        let mut current = index;
        loop {
            let node = self.nodes.get(current)?;
            let depth = node.unit.identifier.depth();
            if depth == level {
                return Some(current);
            }
            if depth < level {
                return None;
            }
            current = node.parent?;
        }
    }

    /// Leaves currently carrying a motion.
    pub fn active_leaves(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.leaves().filter(move |&i| self.nodes[i].unit.is_active())
    }

    /// True if any unit of the branch moves.
    pub fn is_active(&self) -> bool {
        self.nodes.iter().any(|n| n.unit.is_active())
    }

    /// Newest time stamp recorded anywhere in the branch.
    pub fn latest_time_stamp(&self) -> Option<Time> {
        self.nodes.iter().filter_map(|n| n.unit.time_stamp()).max()
    }

    /// Oldest time stamp recorded anywhere in the branch.
    pub fn earliest_time_stamp(&self) -> Option<Time> {
        self.nodes.iter().filter_map(|n| n.unit.time_stamp()).min()
    }
}

fn check_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(Error::InvalidParam("node weight must be finite and > 0".into()));
    }
    Ok(())
}
