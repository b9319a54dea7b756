//! Entity definitions for objects tracked from engine snapshots.

mod components;

pub use components::*;

use serde::{Deserialize, Serialize};

/// Stable identifier assigned by the engine bridge (e.g. a reference form id).
///
/// Ordering is lexicographic and is used for deterministic tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Create an entity ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in engine world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Position on the ground plane.
    pub fn planar(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean distance in three dimensions.
    pub fn distance(&self, other: &Position) -> f32 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Angle of `target` relative to this position and a facing yaw, in (-pi, pi].
    pub fn bearing_to(&self, target: &Position, facing_yaw: f32) -> f32 {
        let absolute = (target.y - self.y).atan2(target.x - self.x);
        normalize_angle(absolute - facing_yaw)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Wrap an angle into (-pi, pi].
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Kinds of tracked entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Npc,
    Object,
    CoverSpot,
}

/// Kind-specific attributes. The variant determines the entity's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityAttributes {
    Player(PlayerState),
    Npc(NpcState),
    Object(ObjectState),
    CoverSpot(CoverState),
}

/// A single tracked entity as last reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub position: Position,
    pub velocity: Option<[f32; 3]>,
    /// Facing yaw in radians.
    pub facing_yaw: Option<f32>,
    /// Reported or derived distance to the player.
    pub distance_to_player: Option<f32>,
    pub attributes: EntityAttributes,
}

impl Entity {
    fn with_attributes(id: impl Into<EntityId>, position: Position, attributes: EntityAttributes) -> Self {
        Self {
            id: id.into(),
            position,
            velocity: None,
            facing_yaw: None,
            distance_to_player: None,
            attributes,
        }
    }

    /// Create the player entity.
    pub fn player(id: impl Into<EntityId>, position: Position, facing_yaw: f32, health: f32) -> Self {
        let mut entity = Self::with_attributes(
            id,
            position,
            EntityAttributes::Player(PlayerState::with_health(health)),
        );
        entity.facing_yaw = Some(facing_yaw);
        entity.distance_to_player = Some(0.0);
        entity
    }

    pub fn npc(id: impl Into<EntityId>, position: Position, state: NpcState) -> Self {
        Self::with_attributes(id, position, EntityAttributes::Npc(state))
    }

    pub fn object(id: impl Into<EntityId>, position: Position, state: ObjectState) -> Self {
        Self::with_attributes(id, position, EntityAttributes::Object(state))
    }

    pub fn cover_spot(id: impl Into<EntityId>, position: Position, cover_rating: f32) -> Self {
        Self::with_attributes(
            id,
            position,
            EntityAttributes::CoverSpot(CoverState {
                cover_rating: cover_rating.clamp(0.0, 1.0),
            }),
        )
    }

    /// Set a reported distance to the player.
    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance_to_player = Some(distance.max(0.0));
        self
    }

    pub fn with_velocity(mut self, velocity: [f32; 3]) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_facing(mut self, facing_yaw: f32) -> Self {
        self.facing_yaw = Some(facing_yaw);
        self
    }

    pub fn kind(&self) -> EntityKind {
        match self.attributes {
            EntityAttributes::Player(_) => EntityKind::Player,
            EntityAttributes::Npc(_) => EntityKind::Npc,
            EntityAttributes::Object(_) => EntityKind::Object,
            EntityAttributes::CoverSpot(_) => EntityKind::CoverSpot,
        }
    }

    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.attributes {
            EntityAttributes::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_npc(&self) -> Option<&NpcState> {
        match &self.attributes {
            EntityAttributes::Npc(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectState> {
        match &self.attributes {
            EntityAttributes::Object(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_cover_spot(&self) -> Option<&CoverState> {
        match &self.attributes {
            EntityAttributes::CoverSpot(state) => Some(state),
            _ => None,
        }
    }

    /// Check if this is a living hostile NPC.
    pub fn is_hostile(&self) -> bool {
        self.as_npc().is_some_and(|npc| npc.is_enemy && npc.is_alive)
    }

    /// Check if this is a living allied NPC.
    pub fn is_living_ally(&self) -> bool {
        self.as_npc().is_some_and(|npc| npc.is_ally && npc.is_alive)
    }
}
