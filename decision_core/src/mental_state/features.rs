//! Self-state input to the fuser.

use serde::{Deserialize, Serialize};
use tactical_core::{Entity, EntityAttributes};

/// Length of [`SelfFeatures::to_vector`].
pub const SELF_FEATURE_DIM: usize = 6;

/// The acting agent's own condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfFeatures {
    pub health: f32,
    pub stamina: f32,
    pub magicka: f32,
    pub in_combat: bool,
    pub sneaking: bool,
    pub weapon_drawn: bool,
}

impl Default for SelfFeatures {
    fn default() -> Self {
        Self {
            health: 1.0,
            stamina: 1.0,
            magicka: 1.0,
            in_combat: false,
            sneaking: false,
            weapon_drawn: false,
        }
    }
}

impl SelfFeatures {
    /// Read the self-state of the entity an agent embodies.
    ///
    /// NPC bodies only report health; the other pools are assumed full.
    pub fn from_entity(entity: &Entity) -> Self {
        match &entity.attributes {
            EntityAttributes::Player(player) => Self {
                health: player.health,
                stamina: player.stamina,
                magicka: player.magicka,
                in_combat: player.in_combat,
                sneaking: player.is_sneaking,
                weapon_drawn: player.weapon_drawn,
            },
            EntityAttributes::Npc(npc) => Self {
                health: npc.health,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    pub fn to_vector(&self) -> [f32; SELF_FEATURE_DIM] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.health.clamp(0.0, 1.0),
            self.stamina.clamp(0.0, 1.0),
            self.magicka.clamp(0.0, 1.0),
            flag(self.in_combat),
            flag(self.sneaking),
            flag(self.weapon_drawn),
        ]
    }
}
