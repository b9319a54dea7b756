//! Goals and the social model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tactical_core::EntityId;
use uuid::Uuid;

/// Unique identifier for goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

/// Categories of intentions the rule table can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    KeepAllyAlive,
    Survive,
    AcquireLoot,
    DefeatEnemies,
    AvoidDetection,
    Explore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Suspended,
    Completed,
    Failed,
}

/// A single intention with a priority in 0.0 - 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub kind: GoalKind,
    pub description: String,
    pub priority: f32,
    #[serde(default)]
    pub status: GoalStatus,
    /// Entity the goal is about, if any (the ally to keep alive, the chest to loot).
    #[serde(default)]
    pub target: Option<EntityId>,
}

impl Goal {
    pub fn new(kind: GoalKind, priority: f32) -> Self {
        Self {
            id: GoalId::new(),
            kind,
            description: String::new(),
            priority,
            status: GoalStatus::Active,
            target: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<EntityId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }
}

/// Prioritized goal list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalState {
    goals: Vec<Goal>,
}

impl GoalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a goal, keeping the list ordered by descending priority.
    pub fn push(&mut self, goal: Goal) -> GoalId {
        let id = goal.id;
        let position = self
            .goals
            .iter()
            .position(|existing| existing.priority < goal.priority)
            .unwrap_or(self.goals.len());
        self.goals.insert(position, goal);
        id
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.push(goal);
        self
    }

    pub fn set_status(&mut self, id: GoalId, status: GoalStatus) -> bool {
        match self.goals.iter_mut().find(|goal| goal.id == id) {
            Some(goal) => {
                goal.status = status;
                true
            }
            None => false,
        }
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn active(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|goal| goal.is_active())
    }

    /// Highest priority among active goals of this kind.
    pub fn active_priority(&self, kind: GoalKind) -> Option<f32> {
        self.active()
            .filter(|goal| goal.kind == kind)
            .map(|goal| goal.priority)
            .reduce(f32::max)
    }
}

/// How the person relates to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialRole {
    #[default]
    Stranger,
    Companion,
    Friend,
    Rival,
    Enemy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// -1.0 (hatred) to 1.0 (devotion).
    pub affinity: f32,
    /// 0.0 - 1.0.
    pub trust: f32,
    #[serde(default)]
    pub role: SocialRole,
}

/// Relationship records keyed by the other entity's id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialModel {
    relationships: BTreeMap<EntityId, Relationship>,
}

impl SocialModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relationship(mut self, other: impl Into<EntityId>, relationship: Relationship) -> Self {
        self.relationships.insert(other.into(), relationship);
        self
    }

    pub fn get(&self, other: &EntityId) -> Option<&Relationship> {
        self.relationships.get(other)
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&EntityId, &Relationship)> {
        self.relationships.iter()
    }
}
