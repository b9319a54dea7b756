//! Interpretable slices decoded from a latent.
//!
//! Slices are views: they are recomputed from the latent on demand and never stored or
//! edited independently.

use serde::{Deserialize, Serialize};

use super::latent::{Anchor, Latent};

fn clip01(x: f32) -> f32 {
    tactical_core::clip01(x)
}

/// The agent's belief about its surroundings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSlice {
    pub threat_level: f32,
    /// Enemy count relative to a crowd of five.
    pub enemy_pressure: f32,
    pub enemies_in_los: f32,
    pub nearest_enemy_proximity: f32,
    pub cover_available: f32,
    pub cover_quality: f32,
    pub escape_direction: [f32; 2],
    pub stealth_safety: f32,
    pub loot_opportunity: f32,
    pub ally_in_danger: f32,
    pub player_health: f32,
}

impl WorldSlice {
    pub(crate) fn from_latent(latent: &Latent) -> Self {
        let a = |anchor| clip01(latent.anchor(anchor));
        Self {
            threat_level: a(Anchor::Threat),
            enemy_pressure: a(Anchor::EnemyPressure),
            enemies_in_los: a(Anchor::EnemiesInLos),
            nearest_enemy_proximity: a(Anchor::NearestEnemyProximity),
            cover_available: a(Anchor::CoverAvailable),
            cover_quality: a(Anchor::CoverQuality),
            escape_direction: [
                latent.anchor(Anchor::EscapeX).clamp(-1.0, 1.0),
                latent.anchor(Anchor::EscapeY).clamp(-1.0, 1.0),
            ],
            stealth_safety: a(Anchor::StealthSafety),
            loot_opportunity: a(Anchor::LootOpportunity),
            ally_in_danger: a(Anchor::AllyDanger),
            player_health: a(Anchor::PlayerHealth),
        }
    }
}

/// The agent's belief about its own body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfSlice {
    pub health: f32,
    pub stamina: f32,
    pub magicka: f32,
    pub in_combat: f32,
    pub sneaking: f32,
    pub weapon_drawn: f32,
}

impl SelfSlice {
    pub(crate) fn from_latent(latent: &Latent) -> Self {
        let a = |anchor| clip01(latent.anchor(anchor));
        Self {
            health: a(Anchor::Health),
            stamina: a(Anchor::Stamina),
            magicka: a(Anchor::Magicka),
            in_combat: a(Anchor::InCombat),
            sneaking: a(Anchor::Sneaking),
            weapon_drawn: a(Anchor::WeaponDrawn),
        }
    }
}

/// Emotional appraisal of the situation. All fields 0.0 - 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectSlice {
    pub fear: f32,
    pub stress: f32,
    pub curiosity: f32,
    pub threat: f32,
    /// How good the current situation is for the agent.
    pub value: f32,
    /// Normalized distance between the last one-step prediction and the actual state.
    /// Decoding alone cannot know it; the cycle fills it in.
    pub surprise: f32,
    /// Trust in the inputs behind this state; lowered by missing or stale modalities.
    pub confidence: f32,
}

impl AffectSlice {
    pub(crate) fn appraise(
        world: &WorldSlice,
        self_state: &SelfSlice,
        hypothesis: &HypothesisSlice,
        confidence: f32,
    ) -> Self {
        let threat = world.threat_level;
        let calm = 1.0 - threat;
        Self {
            fear: clip01(
                0.5 * threat + 0.3 * world.nearest_enemy_proximity + 0.2 * (1.0 - self_state.health),
            ),
            stress: clip01(0.4 * threat + 0.3 * self_state.in_combat + 0.3 * world.ally_in_danger),
            curiosity: clip01(0.6 * world.loot_opportunity * calm + 0.4 * hypothesis.novelty),
            threat,
            value: clip01(
                0.35 * self_state.health
                    + 0.25 * (1.0 - world.ally_in_danger)
                    + 0.2 * world.loot_opportunity
                    + 0.2 * world.stealth_safety,
            ),
            surprise: 0.0,
            confidence: clip01(confidence),
        }
    }

    pub fn with_surprise(mut self, surprise: f32) -> Self {
        self.surprise = clip01(surprise);
        self
    }
}

/// Free latent dimensions without a fixed meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSlice {
    pub values: Vec<f32>,
    /// Mean magnitude of the hypothesis dimensions.
    pub novelty: f32,
}

impl HypothesisSlice {
    pub(crate) fn from_latent(latent: &Latent) -> Self {
        let values = latent.hypothesis().to_vec();
        let novelty = if values.is_empty() {
            0.0
        } else {
            clip01(values.iter().map(|v| v.abs()).sum::<f32>() / values.len() as f32)
        };
        Self { values, novelty }
    }
}

/// All four slices of one latent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedState {
    pub world: WorldSlice,
    pub self_state: SelfSlice,
    pub affect: AffectSlice,
    pub hypothesis: HypothesisSlice,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mental_state::ANCHOR_DIM;

    fn latent_with(pairs: &[(Anchor, f32)]) -> Latent {
        let mut values = vec![0.0; ANCHOR_DIM + 4];
        for (anchor, value) in pairs {
            values[anchor.index()] = *value;
        }
        Latent::from_vec(values)
    }

    #[test]
    fn test_world_slice_clips() {
        let latent = latent_with(&[(Anchor::Threat, 1.4), (Anchor::EscapeX, -0.6)]);
        let world = WorldSlice::from_latent(&latent);
        assert_eq!(world.threat_level, 1.0);
        assert_eq!(world.escape_direction, [-0.6, 0.0]);
    }

    #[test]
    fn test_affect_tracks_threat() {
        let calm = latent_with(&[(Anchor::Health, 1.0)]);
        let tense = latent_with(&[(Anchor::Threat, 0.9), (Anchor::Health, 0.3)]);

        let affect = |latent: &Latent| {
            let world = WorldSlice::from_latent(latent);
            let self_state = SelfSlice::from_latent(latent);
            let hypothesis = HypothesisSlice::from_latent(latent);
            AffectSlice::appraise(&world, &self_state, &hypothesis, 1.0)
        };

        assert!(affect(&tense).fear > affect(&calm).fear);
        assert!(affect(&tense).value < affect(&calm).value);
        assert_eq!(affect(&calm).surprise, 0.0);
    }

    #[test]
    fn test_surprise_is_clipped() {
        let latent = latent_with(&[]);
        let affect = AffectSlice::appraise(
            &WorldSlice::from_latent(&latent),
            &SelfSlice::from_latent(&latent),
            &HypothesisSlice::from_latent(&latent),
            1.0,
        )
        .with_surprise(3.0);
        assert_eq!(affect.surprise, 1.0);
    }
}
