//! State tree and time-slicing engine.
//!
//! The global state is an ordered sequence of [`Branch`]es. Each branch is a root node with its
//! descendants; nodes wrap [`Unit`]s that carry position, optional [`Motion`] and charges.

pub mod slicing;
pub mod time;
pub mod tree;
pub mod unit;

pub use slicing::{activate, advance, deactivate, exchange_velocity, time_slice};
pub use time::Time;
pub use tree::{Branch, Node, NodeIndex, ROOT};
pub use unit::{Motion, StateId, Unit, VELOCITY_EPS};
