//! The tactical feature record.

use serde::{Deserialize, Serialize};

use crate::entities::EntityId;

/// Length of [`TacticalFeatures::to_vector`].
pub const TACTICAL_FEATURE_DIM: usize = 12;

/// The enemy closest to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestEnemy {
    pub id: EntityId,
    pub distance: f32,
    /// Radians relative to the player's facing, in (-pi, pi].
    pub bearing: f32,
    pub has_los: bool,
    pub health: f32,
    pub awareness: f32,
}

/// The best cover spot within range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverSpotRef {
    pub id: EntityId,
    pub distance: f32,
    pub bearing: f32,
    pub cover_rating: f32,
}

/// Fixed-schema tactical summary, recomputed in full every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticalFeatures {
    /// Overall danger, 0.0 - 1.0.
    pub threat_level: f32,
    pub num_enemies_total: u32,
    pub num_enemies_in_los: u32,
    pub num_enemies_aware: u32,
    pub nearest_enemy: Option<NearestEnemy>,
    /// 1.0 when the nearest enemy is on top of the player, 0.0 beyond the threat radius.
    pub nearest_enemy_proximity: f32,
    pub best_cover_spot: Option<CoverSpotRef>,
    /// Unit vector away from the enemies, or zero without enemies.
    pub escape_vector: [f32; 2],
    /// 1.0 when nobody can detect the player.
    pub stealth_safety_score: f32,
    pub loot_opportunity_available: bool,
    pub num_allies: u32,
    /// Lowest health among living allies.
    pub ally_min_health: Option<f32>,
    pub player_health: f32,
    /// Timestamp of the snapshot the features were computed from.
    pub timestamp: f64,
    /// Seconds between the snapshot and the time of computation.
    pub snapshot_age: f64,
    /// Snapshot age exceeded the staleness threshold. Still usable, lower confidence.
    pub degraded: bool,
}

impl Default for TacticalFeatures {
    fn default() -> Self {
        Self {
            threat_level: 0.0,
            num_enemies_total: 0,
            num_enemies_in_los: 0,
            num_enemies_aware: 0,
            nearest_enemy: None,
            nearest_enemy_proximity: 0.0,
            best_cover_spot: None,
            escape_vector: [0.0, 0.0],
            stealth_safety_score: 1.0,
            loot_opportunity_available: false,
            num_allies: 0,
            ally_min_health: None,
            player_health: 1.0,
            timestamp: 0.0,
            snapshot_age: 0.0,
            degraded: false,
        }
    }
}

impl TacticalFeatures {
    /// How badly the weakest ally needs help: 1 - health, or 0 without allies.
    pub fn ally_danger(&self) -> f32 {
        self.ally_min_health.map(|h| 1.0 - h).unwrap_or(0.0)
    }

    /// Flatten into the fixed-length numeric layout consumed by the mental-state fuser.
    ///
    /// Layout: threat, enemy count (/5), enemies in LOS (/3), nearest proximity, cover
    /// available, cover rating, escape x, escape y, stealth safety, loot available,
    /// ally danger, player health.
    pub fn to_vector(&self) -> [f32; TACTICAL_FEATURE_DIM] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.threat_level,
            (self.num_enemies_total as f32 / 5.0).min(1.0),
            (self.num_enemies_in_los as f32 / 3.0).min(1.0),
            self.nearest_enemy_proximity,
            flag(self.best_cover_spot.is_some()),
            self.best_cover_spot
                .as_ref()
                .map(|c| c.cover_rating)
                .unwrap_or(0.0),
            self.escape_vector[0],
            self.escape_vector[1],
            self.stealth_safety_score,
            flag(self.loot_opportunity_available),
            self.ally_danger(),
            self.player_health,
        ]
    }
}
