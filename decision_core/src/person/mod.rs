//! Person profiles.
//!
//! A person bundles who an agent is (traits, values, goals, relationships, capabilities and
//! hard constraints). The profile survives mental-state resets.

mod goal;
mod profile;
mod registry;

pub use goal::*;
pub use profile::*;
pub use registry::*;

use serde::{Deserialize, Serialize};
use tactical_core::EntityId;
use uuid::Uuid;

use crate::error::{DecisionError, Result};

/// Unique identifier for persons. Also identifies the agent pipeline driving the person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub Uuid);

impl PersonId {
    /// Create a new random person ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decision-making individual: the player avatar or a companion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    /// The tracked entity this person embodies. Self-features are read from it.
    pub embodied_by: EntityId,
    #[serde(default)]
    pub traits: TraitProfile,
    #[serde(default)]
    pub values: ValueProfile,
    #[serde(default)]
    pub goals: GoalState,
    #[serde(default)]
    pub social: SocialModel,
    #[serde(default)]
    pub capabilities: CapabilityProfile,
    #[serde(default)]
    pub constraints: ConstraintProfile,
}

impl Person {
    /// Create a person with neutral profiles.
    pub fn new(name: impl Into<String>, embodied_by: impl Into<EntityId>) -> Self {
        Self {
            id: PersonId::new(),
            name: name.into(),
            embodied_by: embodied_by.into(),
            traits: TraitProfile::default(),
            values: ValueProfile::default(),
            goals: GoalState::default(),
            social: SocialModel::default(),
            capabilities: CapabilityProfile::default(),
            constraints: ConstraintProfile::default(),
        }
    }

    pub fn with_traits(mut self, traits: TraitProfile) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_values(mut self, values: ValueProfile) -> Self {
        self.values = values;
        self
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goals.push(goal);
        self
    }

    pub fn with_social(mut self, social: SocialModel) -> Self {
        self.social = social;
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityProfile) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_constraints(mut self, constraints: ConstraintProfile) -> Self {
        self.constraints = constraints;
        self
    }

    /// Check that every bounded scalar is finite and inside its range.
    ///
    /// A failure means the profile is corrupted and the agent pipeline must stop.
    pub fn validate(&self) -> Result<()> {
        let unit_scalars = self
            .traits
            .scalars()
            .into_iter()
            .chain(self.values.scalars())
            .map(|(name, value)| (name.to_string(), value))
            .chain(
                self.goals
                    .goals()
                    .iter()
                    .map(|goal| (format!("goal priority {:?}", goal.kind), goal.priority)),
            )
            .chain(
                self.capabilities
                    .skills
                    .iter()
                    .map(|(capability, level)| (format!("skill {capability:?}"), *level)),
            );

        for (name, value) in unit_scalars {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(DecisionError::InvariantViolation(format!(
                    "person {}: {name} = {value} outside [0, 1]",
                    self.id
                )));
            }
        }

        for (other, relationship) in self.social.relationships() {
            let affinity_ok = relationship.affinity.is_finite()
                && (-1.0..=1.0).contains(&relationship.affinity);
            let trust_ok =
                relationship.trust.is_finite() && (0.0..=1.0).contains(&relationship.trust);
            if !affinity_ok || !trust_ok {
                return Err(DecisionError::InvariantViolation(format!(
                    "person {}: relationship with {other} out of range",
                    self.id
                )));
            }
        }

        Ok(())
    }
}
