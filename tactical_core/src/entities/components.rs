//! Kind-specific attribute blocks for tracked entities.

use serde::{Deserialize, Serialize};

fn full() -> f32 {
    1.0
}

fn alive() -> bool {
    true
}

/// Player body state. All pools are normalized to 0.0 - 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub health: f32,
    #[serde(default = "full")]
    pub stamina: f32,
    #[serde(default = "full")]
    pub magicka: f32,
    #[serde(default)]
    pub in_combat: bool,
    #[serde(default)]
    pub is_sneaking: bool,
    #[serde(default)]
    pub weapon_drawn: bool,
}

impl PlayerState {
    pub fn with_health(health: f32) -> Self {
        Self {
            health: health.clamp(0.0, 1.0),
            ..Default::default()
        }
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            health: 1.0,
            stamina: 1.0,
            magicka: 1.0,
            in_combat: false,
            is_sneaking: false,
            weapon_drawn: false,
        }
    }
}

/// NPC state as seen from the player's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    #[serde(default = "full")]
    pub health: f32,
    #[serde(default)]
    pub is_enemy: bool,
    #[serde(default = "alive")]
    pub is_alive: bool,
    /// Follower or companion fighting on the player's side.
    #[serde(default)]
    pub is_ally: bool,
    /// Non-combatant bystander.
    #[serde(default)]
    pub is_civilian: bool,
    /// Line of sight between this NPC and the player.
    #[serde(default)]
    pub has_los: bool,
    /// Detection awareness of the player, 0.0 (oblivious) to 1.0 (alerted).
    #[serde(default)]
    pub awareness: f32,
}

impl Default for NpcState {
    fn default() -> Self {
        Self {
            health: 1.0,
            is_enemy: false,
            is_alive: true,
            is_ally: false,
            is_civilian: false,
            has_los: false,
            awareness: 0.0,
        }
    }
}

impl NpcState {
    /// A living hostile NPC at the given health.
    pub fn enemy(health: f32) -> Self {
        Self {
            health: health.clamp(0.0, 1.0),
            is_enemy: true,
            ..Default::default()
        }
    }

    /// A living ally at the given health.
    pub fn ally(health: f32) -> Self {
        Self {
            health: health.clamp(0.0, 1.0),
            is_ally: true,
            ..Default::default()
        }
    }

    pub fn civilian() -> Self {
        Self {
            is_civilian: true,
            ..Default::default()
        }
    }

    pub fn with_los(mut self, has_los: bool) -> Self {
        self.has_los = has_los;
        self
    }

    pub fn with_awareness(mut self, awareness: f32) -> Self {
        self.awareness = awareness.clamp(0.0, 1.0);
        self
    }
}

/// World object such as a chest, container or loose item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectState {
    #[serde(default)]
    pub is_lootable: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_trapped: bool,
    /// Estimated loot value, 0.0 - 1.0.
    #[serde(default)]
    pub value: f32,
}

impl ObjectState {
    pub fn loot(value: f32) -> Self {
        Self {
            is_lootable: true,
            value: value.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Lootable without picking a lock or springing a trap.
    pub fn is_freely_lootable(&self) -> bool {
        self.is_lootable && !self.is_locked && !self.is_trapped
    }
}

/// Cover spot quality.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoverState {
    /// Protection offered, 0.0 - 1.0.
    pub cover_rating: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_player() {
        let player = PlayerState::default();
        assert_eq!(player.health, 1.0);
        assert!(!player.in_combat);
        assert_eq!(PlayerState::with_health(3.0).health, 1.0);
    }

    #[test]
    fn test_free_loot() {
        assert!(ObjectState::loot(0.5).is_freely_lootable());

        let locked = ObjectState {
            is_locked: true,
            ..ObjectState::loot(0.5)
        };
        assert!(!locked.is_freely_lootable());

        let trapped = ObjectState {
            is_trapped: true,
            ..ObjectState::loot(0.5)
        };
        assert!(!trapped.is_freely_lootable());
    }

    #[test]
    fn test_npc_defaults_deserialize() {
        let npc: NpcState = serde_json::from_str(r#"{"is_enemy": true}"#).unwrap();
        assert!(npc.is_alive);
        assert_eq!(npc.health, 1.0);
        assert!(!npc.has_los);
    }
}
