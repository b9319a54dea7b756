//! World snapshots delivered by the engine bridge.
//!
//! The bridge sends loosely-typed JSON. [`RawSnapshot`] accepts it as-is, with every field
//! optional, and [`Snapshot::from_raw`] validates the required fields before anything touches
//! the entity table.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{
    Entity, EntityAttributes, EntityId, NpcState, ObjectState, PlayerState, Position,
};
use crate::error::{Result, SnapshotError};

/// Cell (location) metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub is_interior: bool,
}

impl CellInfo {
    pub fn named(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: Some(id.clone()),
            id: Some(id),
            is_interior: false,
        }
    }
}

/// A validated world snapshot. Always contains exactly one player entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds on the engine clock.
    pub timestamp: f64,
    pub cell: CellInfo,
    player: Entity,
    entities: Vec<Entity>,
    /// Opaque event tags (e.g. "combat_start", "item_picked_up").
    pub events: Vec<String>,
}

impl Snapshot {
    /// Create a snapshot containing only the player.
    pub fn new(
        timestamp: f64,
        player_id: impl Into<EntityId>,
        position: Position,
        facing_yaw: f32,
        health: f32,
    ) -> Self {
        Self {
            timestamp,
            cell: CellInfo::default(),
            player: Entity::player(player_id, position, facing_yaw, health),
            entities: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Replace the player's body state.
    pub fn with_player_state(mut self, state: PlayerState) -> Self {
        self.player.attributes = EntityAttributes::Player(state);
        self
    }

    /// Add a non-player entity. Player entities are ignored.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        if entity.as_player().is_none() {
            self.entities.push(entity);
        }
        self
    }

    pub fn with_cell(mut self, cell: CellInfo) -> Self {
        self.cell = cell;
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }

    pub fn player(&self) -> &Entity {
        &self.player
    }

    /// Non-player entities.
    pub fn others(&self) -> &[Entity] {
        &self.entities
    }

    /// All entities, player first.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        std::iter::once(&self.player).chain(self.entities.iter())
    }

    /// Parse and validate a JSON payload from the engine bridge.
    pub fn from_json(payload: &str) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(payload)?;
        Self::from_raw(raw)
    }

    /// Validate a raw snapshot.
    ///
    /// Missing or non-finite required fields (timestamp, player id/position/facing/health)
    /// reject the whole snapshot. Optional entities without an id or position are dropped.
    pub fn from_raw(raw: RawSnapshot) -> Result<Self> {
        let timestamp = raw.timestamp.ok_or(SnapshotError::MissingField("timestamp"))?;
        if !timestamp.is_finite() {
            return Err(SnapshotError::NonFinite("timestamp"));
        }

        let raw_player = raw.player.ok_or(SnapshotError::MissingField("player"))?;

        let mut snapshot = Snapshot {
            timestamp,
            cell: raw.cell.unwrap_or_default(),
            player: raw_player.into_entity()?,
            entities: Vec::new(),
            events: raw.recent_events,
        };

        let npcs = raw.npcs.into_iter().map(RawNpc::into_entity);
        let objects = raw.objects.into_iter().map(RawObject::into_entity);
        let covers = raw.cover_spots_raw.into_iter().map(RawCoverSpot::into_entity);

        for candidate in npcs.chain(objects).chain(covers) {
            match candidate {
                Some(entity) => snapshot.entities.push(entity),
                None => debug!(timestamp, "dropping snapshot entity without id or position"),
            }
        }

        Ok(snapshot)
    }
}

fn finite_position(pos: Option<Position>) -> Option<Position> {
    pos.filter(Position::is_finite)
}

/// Unvalidated snapshot payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub cell: Option<CellInfo>,
    pub player: Option<RawPlayer>,
    #[serde(default)]
    pub npcs: Vec<RawNpc>,
    #[serde(default)]
    pub objects: Vec<RawObject>,
    #[serde(default)]
    pub cover_spots_raw: Vec<RawCoverSpot>,
    #[serde(default)]
    pub recent_events: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlayer {
    pub id: Option<String>,
    pub pos: Option<Position>,
    pub facing_yaw: Option<f32>,
    pub health: Option<f32>,
    pub stamina: Option<f32>,
    pub magicka: Option<f32>,
    #[serde(default)]
    pub in_combat: bool,
    #[serde(default)]
    pub is_sneaking: bool,
    #[serde(default)]
    pub weapon_drawn: bool,
    pub velocity: Option<[f32; 3]>,
}

impl RawPlayer {
    fn into_entity(self) -> Result<Entity> {
        let id = self.id.ok_or(SnapshotError::MissingField("player.id"))?;
        let pos = self.pos.ok_or(SnapshotError::MissingField("player.pos"))?;
        if !pos.is_finite() {
            return Err(SnapshotError::NonFinite("player.pos"));
        }
        let yaw = self
            .facing_yaw
            .ok_or(SnapshotError::MissingField("player.facing_yaw"))?;
        if !yaw.is_finite() {
            return Err(SnapshotError::NonFinite("player.facing_yaw"));
        }
        let health = self.health.ok_or(SnapshotError::MissingField("player.health"))?;
        if !health.is_finite() {
            return Err(SnapshotError::NonFinite("player.health"));
        }

        let mut entity = Entity::player(EntityId::new(id), pos, yaw, health);
        entity.velocity = self.velocity;
        entity.attributes = EntityAttributes::Player(PlayerState {
            health: health.clamp(0.0, 1.0),
            stamina: unit_or(self.stamina, 1.0),
            magicka: unit_or(self.magicka, 1.0),
            in_combat: self.in_combat,
            is_sneaking: self.is_sneaking,
            weapon_drawn: self.weapon_drawn,
        });
        Ok(entity)
    }
}

fn unit_or(value: Option<f32>, default: f32) -> f32 {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(default)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawNpc {
    pub id: Option<String>,
    pub pos: Option<Position>,
    pub velocity: Option<[f32; 3]>,
    pub facing_yaw: Option<f32>,
    pub health: Option<f32>,
    #[serde(default, alias = "hostile")]
    pub is_enemy: bool,
    pub is_alive: Option<bool>,
    #[serde(default, alias = "is_follower")]
    pub is_ally: bool,
    #[serde(default)]
    pub is_civilian: bool,
    #[serde(default, alias = "line_of_sight")]
    pub has_los: bool,
    pub awareness: Option<f32>,
    #[serde(alias = "distance_to_player")]
    pub distance: Option<f32>,
}

impl RawNpc {
    fn into_entity(self) -> Option<Entity> {
        let state = NpcState {
            health: unit_or(self.health, 1.0),
            is_enemy: self.is_enemy,
            is_alive: self.is_alive.unwrap_or(true),
            is_ally: self.is_ally,
            is_civilian: self.is_civilian,
            has_los: self.has_los,
            awareness: unit_or(self.awareness, 0.0),
        };
        let mut entity = Entity::npc(EntityId::new(self.id?), finite_position(self.pos)?, state);
        entity.velocity = self.velocity;
        entity.facing_yaw = self.facing_yaw.filter(|y| y.is_finite());
        entity.distance_to_player = finite_distance(self.distance);
        Some(entity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawObject {
    pub id: Option<String>,
    pub pos: Option<Position>,
    #[serde(default)]
    pub is_lootable: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_trapped: bool,
    pub value: Option<f32>,
    #[serde(alias = "distance_to_player")]
    pub distance: Option<f32>,
}

impl RawObject {
    fn into_entity(self) -> Option<Entity> {
        let state = ObjectState {
            is_lootable: self.is_lootable,
            is_locked: self.is_locked,
            is_trapped: self.is_trapped,
            value: unit_or(self.value, 0.0),
        };
        let mut entity = Entity::object(EntityId::new(self.id?), finite_position(self.pos)?, state);
        entity.distance_to_player = finite_distance(self.distance);
        Some(entity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCoverSpot {
    pub id: Option<String>,
    pub pos: Option<Position>,
    pub cover_rating: Option<f32>,
    #[serde(alias = "distance_to_player")]
    pub distance: Option<f32>,
}

impl RawCoverSpot {
    fn into_entity(self) -> Option<Entity> {
        let mut entity = Entity::cover_spot(
            EntityId::new(self.id?),
            finite_position(self.pos)?,
            unit_or(self.cover_rating, 0.0),
        );
        entity.distance_to_player = finite_distance(self.distance);
        Some(entity)
    }
}

fn finite_distance(distance: Option<f32>) -> Option<f32> {
    distance.filter(|d| d.is_finite()).map(|d| d.max(0.0))
}
