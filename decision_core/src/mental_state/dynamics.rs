//! Action-conditioned dynamics: how each action type is expected to shift anchored
//! quantities over one step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::latent::Anchor;
use crate::action::ActionType;

/// Expected change of one anchored quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorDelta {
    pub anchor: Anchor,
    pub delta: f32,
}

/// Per-action anchor deltas at full intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicsTable(BTreeMap<ActionType, Vec<AnchorDelta>>);

impl DynamicsTable {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, action: ActionType, deltas: &[(Anchor, f32)]) -> Self {
        self.0.insert(
            action,
            deltas
                .iter()
                .map(|&(anchor, delta)| AnchorDelta { anchor, delta })
                .collect(),
        );
        self
    }

    pub fn deltas(&self, action: ActionType) -> &[AnchorDelta] {
        self.0.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for DynamicsTable {
    fn default() -> Self {
        use Anchor::*;
        Self::empty()
            .with(ActionType::Wait, &[(Stamina, 0.1)])
            .with(
                ActionType::Attack,
                &[
                    (Threat, -0.15),
                    (EnemyPressure, -0.1),
                    (InCombat, 0.5),
                    (WeaponDrawn, 0.5),
                    (Stamina, -0.2),
                    (Health, -0.1),
                    (StealthSafety, -0.3),
                ],
            )
            .with(
                ActionType::Flee,
                &[
                    (Threat, -0.3),
                    (NearestEnemyProximity, -0.4),
                    (EnemiesInLos, -0.2),
                    (InCombat, -0.3),
                    (Stamina, -0.3),
                    (AllyDanger, 0.2),
                ],
            )
            .with(
                ActionType::TakeCover,
                &[(Threat, -0.2), (EnemiesInLos, -0.3), (StealthSafety, 0.2)],
            )
            .with(
                ActionType::Sneak,
                &[
                    (Threat, -0.05),
                    (EnemiesInLos, -0.1),
                    (StealthSafety, 0.3),
                    (Sneaking, 0.6),
                ],
            )
            .with(
                ActionType::Loot,
                &[(LootOpportunity, -0.5), (Threat, 0.05), (StealthSafety, -0.05)],
            )
            .with(
                ActionType::BlockForPlayer,
                &[
                    (AllyDanger, -0.4),
                    (PlayerHealth, 0.1),
                    (Threat, -0.05),
                    (Health, -0.15),
                    (InCombat, 0.3),
                ],
            )
            .with(ActionType::HealAlly, &[(AllyDanger, -0.5), (Magicka, -0.3)])
            .with(ActionType::UsePotion, &[(Health, 0.4)])
            .with(
                ActionType::Explore,
                &[(Threat, 0.05), (StealthSafety, -0.05), (LootOpportunity, 0.1)],
            )
            .with(ActionType::Follow, &[(AllyDanger, -0.05)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_all_actions() {
        let table = DynamicsTable::default();
        for action in ActionType::ALL {
            assert!(!table.deltas(action).is_empty(), "{action} has no dynamics");
        }
    }

    #[test]
    fn test_flee_reduces_threat() {
        let table = DynamicsTable::default();
        let threat = table
            .deltas(ActionType::Flee)
            .iter()
            .find(|d| d.anchor == Anchor::Threat)
            .unwrap();
        assert!(threat.delta < 0.0);
    }

    #[test]
    fn test_table_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            dynamics: DynamicsTable,
        }

        let wrapper: Wrapper = toml::from_str(
            r#"
            [[dynamics.flee]]
            anchor = "threat"
            delta = -0.5
            "#,
        )
        .unwrap();
        assert_eq!(wrapper.dynamics.deltas(ActionType::Flee)[0].delta, -0.5);
        assert!(wrapper.dynamics.deltas(ActionType::Attack).is_empty());
    }
}
