//! Event-chain Monte Carlo simulation kernel.
//!
//! The global state is a sequence of [`Branch`]es (point masses or composite objects). A single
//! active leaf unit moves along one axis until an event handler proposes a change:
//! - start of run: [`InitialChainStartOfRunEventHandler`]
//! - end of chain: [`SameActivePeriodicDirectionEndOfChainEventHandler`],
//!   [`SingleIndependentActivePeriodicDirectionEndOfChainEventHandler`]
//! - cell veto (lift to a far-away unit): [`LeafUnitCellVetoEventHandler`],
//!   [`CompositeObjectCellVetoEventHandler`]
//! - cell boundary (keeps the cell-occupancy index current): [`CellBoundaryEventHandler`]
//! - end of run: [`FinalTimeEndOfRunEventHandler`]
//!
//! [`CellOccupancy`] maps cells to the units they contain so the scheduler can confirm cell-veto
//! events. The scheduler itself, geometry, potentials and estimators are supplied by the caller
//! through the traits in [`cells`] and [`potential`].

pub mod cells;
pub mod core;
pub mod error;
pub mod event_handler;
pub mod lifting;
pub mod occupancy;
pub mod potential;
pub mod setting;

pub use crate::cells::{Cells, PeriodicCells};
pub use crate::core::{Branch, Motion, Node, NodeIndex, StateId, Time, Unit};
pub use crate::error::{Error, Result};
pub use crate::event_handler::{
    CellBoundaryEventHandler, CompositeObjectCellVetoEventHandler, EventHandler,
    FinalTimeEndOfRunEventHandler, InitialChainStartOfRunEventHandler, LeafUnitCellVetoEventHandler,
    SameActivePeriodicDirectionEndOfChainEventHandler,
    SingleIndependentActivePeriodicDirectionEndOfChainEventHandler, WalkerTable,
};
pub use crate::lifting::{InsideFirstLifting, Lifting};
pub use crate::occupancy::{CellOccupancy, Relevance};
pub use crate::potential::{Estimator, Potential};
pub use crate::setting::Setting;
