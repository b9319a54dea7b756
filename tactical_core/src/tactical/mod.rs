//! Tactical feature computation.
//!
//! Every cycle the full feature record is recomputed from the entity table:
//! 1. **Enemies**: count living hostiles, those with line of sight and those aware of the player
//! 2. **Threat**: weighted, saturating blend of counts, proximity and player health
//! 3. **Nearest enemy / best cover**: deterministic selection with id tie-breaks
//! 4. **Escape**: unit vector pointing away from the hostile centroid
//! 5. **Stealth / loot**: exposure decay and free-loot availability
//!
//! Features are never updated incrementally and no field can leave its documented range.

mod features;

pub use features::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entities::{Entity, EntityId, Position};
use crate::error::ConfigError;
use crate::tracker::EntityTracker;

/// Clamp a ratio that is already non-negative to at most 1.0.
pub fn saturate(x: f32) -> f32 {
    x.min(1.0)
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clip01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Weights and saturation caps for the threat blend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatWeights {
    pub enemy_count: f32,
    /// Enemy count at which the count term saturates.
    pub enemy_count_cap: f32,
    pub line_of_sight: f32,
    /// Enemies-with-line-of-sight count at which the term saturates.
    pub line_of_sight_cap: f32,
    pub proximity: f32,
    pub low_health: f32,
    /// Player health below which the low-health term applies.
    pub low_health_threshold: f32,
}

impl Default for ThreatWeights {
    fn default() -> Self {
        Self {
            enemy_count: 0.3,
            enemy_count_cap: 5.0,
            line_of_sight: 0.3,
            line_of_sight_cap: 1.0,
            proximity: 0.2,
            low_health: 0.2,
            low_health_threshold: 0.5,
        }
    }
}

/// Configuration for tactical feature computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalConfig {
    /// Distance at which an enemy stops contributing proximity threat.
    pub threat_radius: f32,
    /// Cover spots farther than this are ignored.
    pub cover_max_distance: f32,
    /// Loot farther than this is ignored.
    pub loot_radius: f32,
    /// Loot is only an opportunity while threat stays below this ceiling.
    pub loot_threat_ceiling: f32,
    /// Snapshot age (seconds) after which features are flagged degraded.
    pub stale_after_secs: f64,
    /// Distance scale of the exponential exposure decay used for stealth safety.
    pub stealth_decay_distance: f32,
    /// Awareness at or above which an enemy counts as aware of the player.
    pub awareness_threshold: f32,
    pub weights: ThreatWeights,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        Self {
            threat_radius: 20.0,
            cover_max_distance: 15.0,
            loot_radius: 10.0,
            loot_threat_ceiling: 0.5,
            stale_after_secs: 2.0,
            stealth_decay_distance: 10.0,
            awareness_threshold: 0.3,
            weights: ThreatWeights::default(),
        }
    }
}

impl TacticalConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("threat_radius", self.threat_radius),
            ("stealth_decay_distance", self.stealth_decay_distance),
            ("weights.enemy_count_cap", self.weights.enemy_count_cap),
            ("weights.line_of_sight_cap", self.weights.line_of_sight_cap),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

struct Hostile<'a> {
    entity: &'a Entity,
    distance: f32,
    has_los: bool,
    awareness: f32,
    health: f32,
}

/// Computes tactical features from tracked entities.
#[derive(Debug, Clone, Default)]
pub struct TacticalFeatureComputer {
    config: TacticalConfig,
}

impl TacticalFeatureComputer {
    pub fn new(config: TacticalConfig) -> Self {
        Self { config }
    }

    /// Create a computer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TacticalConfig::default())
    }

    pub fn config(&self) -> &TacticalConfig {
        &self.config
    }

    /// Compute features from the tracker's current table.
    ///
    /// `now` is the engine-clock time at which the features are consumed.
    pub fn compute_from_tracker(&self, tracker: &EntityTracker, now: f64) -> TacticalFeatures {
        let timestamp = tracker.last_timestamp().unwrap_or(now);
        self.compute(tracker.entities(), timestamp, now)
    }

    /// Compute features from a set of entities observed at `timestamp`.
    ///
    /// Total: a missing player is treated as a healthy player at the origin.
    pub fn compute<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a Entity>,
        timestamp: f64,
        now: f64,
    ) -> TacticalFeatures {
        let entities: Vec<&Entity> = entities.into_iter().collect();
        let player = entities.iter().find(|e| e.as_player().is_some()).copied();
        let player_position = player.map(|p| p.position).unwrap_or_default();
        let player_yaw = player.and_then(|p| p.facing_yaw).unwrap_or(0.0);
        let player_health = player
            .and_then(Entity::as_player)
            .map(|state| clip01(state.health))
            .unwrap_or(1.0);

        let distance_of = |entity: &Entity| {
            entity
                .distance_to_player
                .filter(|d| d.is_finite())
                .unwrap_or_else(|| entity.position.distance(&player_position))
                .max(0.0)
        };

        let hostiles: Vec<Hostile> = entities
            .iter()
            .filter(|e| e.is_hostile())
            .filter_map(|e| {
                let npc = e.as_npc()?;
                Some(Hostile {
                    entity: *e,
                    distance: distance_of(e),
                    has_los: npc.has_los,
                    awareness: clip01(npc.awareness),
                    health: clip01(npc.health),
                })
            })
            .collect();

        let num_enemies_total = hostiles.len() as u32;
        let num_enemies_in_los = hostiles.iter().filter(|h| h.has_los).count() as u32;
        let aware: Vec<&Hostile> = hostiles
            .iter()
            .filter(|h| h.has_los || h.awareness >= self.config.awareness_threshold)
            .collect();

        let nearest = hostiles.iter().min_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| b.has_los.cmp(&a.has_los))
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });

        let nearest_enemy_proximity = nearest
            .map(|h| (1.0 - h.distance / self.config.threat_radius).max(0.0))
            .unwrap_or(0.0);

        let threat_level = self.threat_level(
            num_enemies_total,
            num_enemies_in_los,
            nearest_enemy_proximity,
            player_health,
        );

        let nearest_enemy = nearest.map(|h| NearestEnemy {
            id: h.entity.id.clone(),
            distance: h.distance,
            bearing: player_position.bearing_to(&h.entity.position, player_yaw),
            has_los: h.has_los,
            health: h.health,
            awareness: h.awareness,
        });

        let best_cover_spot = entities
            .iter()
            .filter_map(|e| Some((*e, e.as_cover_spot()?)))
            .map(|(e, cover)| (e, clip01(cover.cover_rating), distance_of(e)))
            .filter(|(_, _, distance)| *distance <= self.config.cover_max_distance)
            .max_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| b.2.total_cmp(&a.2))
                    .then_with(|| b.0.id.cmp(&a.0.id))
            })
            .map(|(e, cover_rating, distance)| CoverSpotRef {
                id: e.id.clone(),
                distance,
                bearing: player_position.bearing_to(&e.position, player_yaw),
                cover_rating,
            });

        let escape_vector = escape_vector(player_position, &hostiles, nearest);

        let exposure: f32 = aware
            .iter()
            .map(|h| {
                let alertness = if h.has_los { h.awareness.max(0.5) } else { h.awareness };
                alertness * (-h.distance / self.config.stealth_decay_distance).exp()
            })
            .sum();
        let stealth_safety_score = clip01(1.0 - saturate(exposure));

        let loot_opportunity_available = threat_level < self.config.loot_threat_ceiling
            && entities.iter().any(|e| {
                e.as_object().is_some_and(|o| o.is_freely_lootable())
                    && distance_of(e) <= self.config.loot_radius
            });

        let allies: Vec<f32> = entities
            .iter()
            .filter(|e| e.is_living_ally())
            .filter_map(|e| e.as_npc().map(|npc| clip01(npc.health)))
            .collect();
        let ally_min_health = allies.iter().copied().reduce(f32::min);

        let snapshot_age = (now - timestamp).max(0.0);

        TacticalFeatures {
            threat_level,
            num_enemies_total,
            num_enemies_in_los,
            num_enemies_aware: aware.len() as u32,
            nearest_enemy,
            nearest_enemy_proximity,
            best_cover_spot,
            escape_vector,
            stealth_safety_score,
            loot_opportunity_available,
            num_allies: allies.len() as u32,
            ally_min_health,
            player_health,
            timestamp,
            snapshot_age,
            degraded: snapshot_age > self.config.stale_after_secs,
        }
    }

    fn threat_level(&self, enemies: u32, in_los: u32, proximity: f32, player_health: f32) -> f32 {
        if enemies == 0 {
            return 0.0;
        }
        let w = &self.config.weights;
        let low_health = if player_health < w.low_health_threshold {
            w.low_health * (1.0 - player_health)
        } else {
            0.0
        };
        clip01(
            w.enemy_count * saturate(enemies as f32 / w.enemy_count_cap)
                + w.line_of_sight * saturate(in_los as f32 / w.line_of_sight_cap)
                + w.proximity * proximity
                + low_health,
        )
    }
}

fn escape_vector(player: Position, hostiles: &[Hostile], nearest: Option<&Hostile>) -> [f32; 2] {
    if hostiles.is_empty() {
        return [0.0, 0.0];
    }
    let n = hostiles.len() as f32;
    let (cx, cy) = hostiles.iter().fold((0.0, 0.0), |(x, y), h| {
        (x + h.entity.position.x / n, y + h.entity.position.y / n)
    });

    let away = |x: f32, y: f32| {
        let (dx, dy) = (player.x - x, player.y - y);
        let len = (dx * dx + dy * dy).sqrt();
        (len > f32::EPSILON && len.is_finite()).then(|| [dx / len, dy / len])
    };

    away(cx, cy)
        .or_else(|| nearest.and_then(|h| away(h.entity.position.x, h.entity.position.y)))
        .unwrap_or([0.0, 0.0])
}

/// Resolve a feature reference back to a tracked entity.
pub fn resolve<'a>(tracker: &'a EntityTracker, id: &EntityId) -> Option<&'a Entity> {
    tracker.get(id).map(|tracked| &tracked.entity)
}
