//! # Decision Core
//!
//! The agent's mind. This crate consumes `tactical_core`, folds tactical, visual and
//! self-state evidence into a latent mental state, and picks actions under a person's
//! traits, values, goals and hard constraints.
//!
//! ## Core Components
//!
//! - **mental_state**: gated recurrent fusion into a latent vector, decoding into interpretable
//!   slices, and action-conditioned prediction / rollout
//! - **person**: trait, value, goal, social, capability and constraint profiles plus the
//!   explicit person registry
//! - **policy**: hard veto filter, declarative rule table and optional planning rollouts
//! - **cycle**: the strictly sequential per-agent decision cycle
//! - **runtime / orchestrator**: async collaborators, latency budgets and concurrent agents
//!
//! ## Design Philosophy
//!
//! - **Owned State**: every agent exclusively owns its mental state; agents share only a
//!   read-only snapshot
//! - **Data-Driven Policy**: personality effects live in a rule table, not in branches
//! - **Degrade, Don't Stall**: missing or slow inputs lower confidence instead of failing a cycle

pub mod action;
pub mod config;
pub mod cycle;
pub mod error;
pub mod mental_state;
pub mod orchestrator;
pub mod person;
pub mod policy;
pub mod runtime;
pub mod training;

pub use action::*;
pub use config::*;
pub use cycle::*;
pub use error::*;
pub use mental_state::*;
pub use orchestrator::*;
pub use person::*;
pub use policy::*;
pub use runtime::*;
pub use training::*;
