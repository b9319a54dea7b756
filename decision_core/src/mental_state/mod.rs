//! Latent mental state.
//!
//! Each agent owns one [`MentalState`]. The shared [`MentalStateFuser`] folds evidence into
//! it, decodes it into interpretable slices and predicts how actions would change it.

mod dynamics;
mod features;
mod fuser;
mod latent;
mod slices;

pub use dynamics::*;
pub use features::*;
pub use fuser::*;
pub use latent::*;
pub use slices::*;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DecisionError, Result};
use crate::person::PersonId;

/// Where an agent's mental state is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// No evidence encoded yet.
    #[default]
    Uninitialized,
    Active,
    /// Zeroed at a session or location boundary; becomes active on the next encode.
    Reset,
    /// Stopped after a fatal error. Never updated again.
    Terminal,
}

/// One agent's latent state plus bookkeeping metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentalState {
    owner: PersonId,
    latent: Latent,
    lifecycle: Lifecycle,
    update_count: u64,
    last_update: Option<f64>,
}

impl MentalState {
    /// A zeroed, uninitialized state for `owner`.
    pub fn new(owner: PersonId, latent_dim: usize) -> Self {
        Self {
            owner,
            latent: Latent::zeros(latent_dim),
            lifecycle: Lifecycle::Uninitialized,
            update_count: 0,
            last_update: None,
        }
    }

    pub fn owner(&self) -> PersonId {
        self.owner
    }

    pub fn latent(&self) -> &Latent {
        &self.latent
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn last_update(&self) -> Option<f64> {
        self.last_update
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle == Lifecycle::Terminal
    }

    /// Replace the latent with a freshly encoded one.
    pub fn commit(&mut self, latent: Latent, timestamp: f64) -> Result<()> {
        if self.is_terminal() {
            return Err(DecisionError::AgentTerminated(self.owner));
        }
        if latent.dim() != self.latent.dim() {
            return Err(DecisionError::DimensionMismatch {
                what: "committed latent",
                expected: self.latent.dim(),
                actual: latent.dim(),
            });
        }
        self.latent = latent;
        self.lifecycle = Lifecycle::Active;
        self.update_count += 1;
        self.last_update = Some(timestamp);
        Ok(())
    }

    /// Zero the latent at a session or location boundary.
    pub fn reset(&mut self) {
        if self.is_terminal() {
            return;
        }
        debug!(agent = %self.owner, "resetting mental state");
        self.latent = Latent::zeros(self.latent.dim());
        self.lifecycle = Lifecycle::Reset;
    }

    pub fn terminate(&mut self) {
        self.lifecycle = Lifecycle::Terminal;
    }
}

/// Latent plus decoded slices, as handed to external consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentalStateExport {
    pub owner: PersonId,
    pub lifecycle: Lifecycle,
    pub update_count: u64,
    pub last_update: Option<f64>,
    pub latent: Vec<f32>,
    pub world: WorldSlice,
    pub self_state: SelfSlice,
    pub affect: AffectSlice,
    pub hypothesis: HypothesisSlice,
}

impl MentalStateExport {
    pub fn new(state: &MentalState, decoded: DecodedState) -> Self {
        Self {
            owner: state.owner,
            lifecycle: state.lifecycle,
            update_count: state.update_count,
            last_update: state.last_update,
            latent: state.latent.as_slice().to_vec(),
            world: decoded.world,
            self_state: decoded.self_state,
            affect: decoded.affect,
            hypothesis: decoded.hypothesis,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
