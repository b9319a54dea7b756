//! Aggregate agent configuration.
//!
//! Every section is optional in TOML and falls back to its defaults:
//!
//! ```toml
//! [tactical]
//! threat_radius = 25.0
//!
//! [fusion]
//! latent_dim = 96
//!
//! [cycle]
//! latency_budget_ms = 80
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tactical_core::{TacticalConfig, TrackerConfig};

use crate::cycle::{CycleConfig, DecisionCycle};
use crate::error::{DecisionError, Result};
use crate::mental_state::{FusionConfig, MentalStateFuser};
use crate::person::PersonId;
use crate::policy::{ActionScorer, ScoringConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub tracker: TrackerConfig,
    pub tactical: TacticalConfig,
    pub fusion: FusionConfig,
    pub scoring: ScoringConfig,
    pub cycle: CycleConfig,
}

impl AgentConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.tactical.validate()?;
        self.fusion.validate()?;
        self.scoring.validate()?;

        if self.tracker.eviction_after_missed == 0 {
            return Err(DecisionError::Configuration(
                "tracker.eviction_after_missed must be at least 1".into(),
            ));
        }
        if self.cycle.latency_budget_ms == 0 {
            return Err(DecisionError::Configuration(
                "cycle.latency_budget_ms must be positive".into(),
            ));
        }
        if self.cycle.collaborator_budget_ms > self.cycle.latency_budget_ms {
            return Err(DecisionError::Configuration(
                "cycle.collaborator_budget_ms must not exceed cycle.latency_budget_ms".into(),
            ));
        }
        if self.cycle.retry.max_attempts == 0 {
            return Err(DecisionError::Configuration(
                "cycle.retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build a fuser from the fusion section.
    pub fn build_fuser(&self) -> Result<MentalStateFuser> {
        MentalStateFuser::new(self.fusion.clone())
    }

    pub fn build_scorer(&self) -> ActionScorer {
        ActionScorer::new(self.scoring.clone())
    }

    /// Build an agent pipeline around shared fuser and scorer instances.
    pub fn build_cycle(
        &self,
        agent: PersonId,
        fuser: Arc<MentalStateFuser>,
        scorer: Arc<ActionScorer>,
    ) -> DecisionCycle {
        DecisionCycle::new(agent, fuser, scorer)
            .with_tracker_config(self.tracker.clone())
            .with_tactical_config(self.tactical.clone())
            .with_config(self.cycle.clone())
    }
}
