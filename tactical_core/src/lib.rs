//! # Tactical Core
//!
//! The world-model crate: it ingests engine snapshots, keeps a table of tracked entities and
//! condenses that table into a fixed-schema tactical summary every cycle.
//! This crate holds no decision logic; the agent's mind lives in `decision_core`.

pub mod entities;
pub mod error;
pub mod snapshot;
pub mod tactical;
pub mod tracker;

pub use entities::*;
pub use error::*;
pub use snapshot::*;
pub use tactical::*;
pub use tracker::*;
