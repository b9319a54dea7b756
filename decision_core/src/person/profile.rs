//! Personality, motivation, capability and constraint profiles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::action::ActionTag;

/// Names of personality traits, used by rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
    Aggression,
    Caution,
    Curiosity,
    Loyalty,
    Bravery,
    Sociability,
    Impulsivity,
}

/// Stable personality traits, each 0.0 - 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitProfile {
    pub aggression: f32,
    pub caution: f32,
    pub curiosity: f32,
    pub loyalty: f32,
    pub bravery: f32,
    pub sociability: f32,
    pub impulsivity: f32,
}

impl Default for TraitProfile {
    fn default() -> Self {
        Self {
            aggression: 0.5,
            caution: 0.5,
            curiosity: 0.5,
            loyalty: 0.5,
            bravery: 0.5,
            sociability: 0.5,
            impulsivity: 0.5,
        }
    }
}

impl TraitProfile {
    pub fn get(&self, kind: TraitKind) -> f32 {
        match kind {
            TraitKind::Aggression => self.aggression,
            TraitKind::Caution => self.caution,
            TraitKind::Curiosity => self.curiosity,
            TraitKind::Loyalty => self.loyalty,
            TraitKind::Bravery => self.bravery,
            TraitKind::Sociability => self.sociability,
            TraitKind::Impulsivity => self.impulsivity,
        }
    }

    pub fn with(mut self, kind: TraitKind, value: f32) -> Self {
        let slot = match kind {
            TraitKind::Aggression => &mut self.aggression,
            TraitKind::Caution => &mut self.caution,
            TraitKind::Curiosity => &mut self.curiosity,
            TraitKind::Loyalty => &mut self.loyalty,
            TraitKind::Bravery => &mut self.bravery,
            TraitKind::Sociability => &mut self.sociability,
            TraitKind::Impulsivity => &mut self.impulsivity,
        };
        *slot = value;
        self
    }

    pub(crate) fn scalars(&self) -> [(&'static str, f32); 7] {
        [
            ("aggression", self.aggression),
            ("caution", self.caution),
            ("curiosity", self.curiosity),
            ("loyalty", self.loyalty),
            ("bravery", self.bravery),
            ("sociability", self.sociability),
            ("impulsivity", self.impulsivity),
        ]
    }
}

/// Names of motivations, used by rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    ProtectAllies,
    GreedForLoot,
    SelfPreservation,
    Honor,
    Exploration,
}

/// What the person cares about, each 0.0 - 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueProfile {
    pub protect_allies: f32,
    pub greed_for_loot: f32,
    pub self_preservation: f32,
    pub honor: f32,
    pub exploration: f32,
}

impl Default for ValueProfile {
    fn default() -> Self {
        Self {
            protect_allies: 0.5,
            greed_for_loot: 0.5,
            self_preservation: 0.5,
            honor: 0.5,
            exploration: 0.5,
        }
    }
}

impl ValueProfile {
    pub fn get(&self, kind: ValueKind) -> f32 {
        match kind {
            ValueKind::ProtectAllies => self.protect_allies,
            ValueKind::GreedForLoot => self.greed_for_loot,
            ValueKind::SelfPreservation => self.self_preservation,
            ValueKind::Honor => self.honor,
            ValueKind::Exploration => self.exploration,
        }
    }

    pub fn with(mut self, kind: ValueKind, value: f32) -> Self {
        let slot = match kind {
            ValueKind::ProtectAllies => &mut self.protect_allies,
            ValueKind::GreedForLoot => &mut self.greed_for_loot,
            ValueKind::SelfPreservation => &mut self.self_preservation,
            ValueKind::Honor => &mut self.honor,
            ValueKind::Exploration => &mut self.exploration,
        };
        *slot = value;
        self
    }

    pub(crate) fn scalars(&self) -> [(&'static str, f32); 5] {
        [
            ("protect_allies", self.protect_allies),
            ("greed_for_loot", self.greed_for_loot),
            ("self_preservation", self.self_preservation),
            ("honor", self.honor),
            ("exploration", self.exploration),
        ]
    }
}

/// Skills an action may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Combat,
    Block,
    Stealth,
    Healing,
    Lockpicking,
    Archery,
    Magic,
}

/// What the person is able to do: boolean flags plus optional skill levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityProfile {
    pub flags: BTreeSet<Capability>,
    /// Skill levels, 0.0 - 1.0. A capability is usable only if flagged.
    pub skills: BTreeMap<Capability, f32>,
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self {
            flags: [Capability::Combat, Capability::Block, Capability::Stealth]
                .into_iter()
                .collect(),
            skills: BTreeMap::new(),
        }
    }
}

impl CapabilityProfile {
    /// A profile with no capabilities at all.
    pub fn none() -> Self {
        Self {
            flags: BTreeSet::new(),
            skills: BTreeMap::new(),
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.flags.insert(capability);
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.flags.remove(&capability);
        self
    }

    pub fn with_skill(mut self, capability: Capability, level: f32) -> Self {
        self.flags.insert(capability);
        self.skills.insert(capability, level);
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.flags.contains(&capability)
    }

    /// Skill level, 1.0 for flagged capabilities without an explicit level.
    pub fn skill(&self, capability: Capability) -> f32 {
        if !self.has(capability) {
            return 0.0;
        }
        self.skills.get(&capability).copied().unwrap_or(1.0)
    }
}

/// Behaviors governed by hard rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    HarmCivilians,
    AttackAllies,
    Steal,
    RiskSelfSacrifice,
    AbandonAllies,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 5] = [
        ConstraintKind::HarmCivilians,
        ConstraintKind::AttackAllies,
        ConstraintKind::Steal,
        ConstraintKind::RiskSelfSacrifice,
        ConstraintKind::AbandonAllies,
    ];

    /// The action tag this rule governs.
    pub fn governed_tag(self) -> ActionTag {
        match self {
            ConstraintKind::HarmCivilians => ActionTag::HarmsCivilian,
            ConstraintKind::AttackAllies => ActionTag::HarmsAlly,
            ConstraintKind::Steal => ActionTag::Theft,
            ConstraintKind::RiskSelfSacrifice => ActionTag::SelfSacrifice,
            ConstraintKind::AbandonAllies => ActionTag::AbandonsAlly,
        }
    }
}

/// Hard behavioral rules. Each entry says whether the behavior is permitted.
///
/// `harm_civilians = false` forbids every action tagged as harming a civilian, no matter how
/// the soft scores look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintProfile {
    pub harm_civilians: bool,
    pub attack_allies: bool,
    pub steal: bool,
    pub risk_self_sacrifice: bool,
    pub abandon_allies: bool,
}

impl Default for ConstraintProfile {
    fn default() -> Self {
        Self {
            harm_civilians: false,
            attack_allies: false,
            steal: true,
            risk_self_sacrifice: false,
            abandon_allies: true,
        }
    }
}

impl ConstraintProfile {
    pub fn permits(&self, kind: ConstraintKind) -> bool {
        match kind {
            ConstraintKind::HarmCivilians => self.harm_civilians,
            ConstraintKind::AttackAllies => self.attack_allies,
            ConstraintKind::Steal => self.steal,
            ConstraintKind::RiskSelfSacrifice => self.risk_self_sacrifice,
            ConstraintKind::AbandonAllies => self.abandon_allies,
        }
    }

    pub fn with(mut self, kind: ConstraintKind, permitted: bool) -> Self {
        let slot = match kind {
            ConstraintKind::HarmCivilians => &mut self.harm_civilians,
            ConstraintKind::AttackAllies => &mut self.attack_allies,
            ConstraintKind::Steal => &mut self.steal,
            ConstraintKind::RiskSelfSacrifice => &mut self.risk_self_sacrifice,
            ConstraintKind::AbandonAllies => &mut self.abandon_allies,
        };
        *slot = permitted;
        self
    }

    /// The first forbidden behavior among the given tags, in [`ConstraintKind::ALL`] order.
    pub fn first_violation<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a ActionTag> + Clone,
    ) -> Option<ConstraintKind> {
        ConstraintKind::ALL.into_iter().find(|kind| {
            !self.permits(*kind) && tags.clone().into_iter().any(|tag| *tag == kind.governed_tag())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_lookup() {
        let traits = TraitProfile::default().with(TraitKind::Aggression, 0.8);
        assert_eq!(traits.get(TraitKind::Aggression), 0.8);
        assert_eq!(traits.get(TraitKind::Caution), 0.5);
    }

    #[test]
    fn test_value_lookup() {
        let values = ValueProfile::default().with(ValueKind::GreedForLoot, 0.9);
        assert_eq!(values.get(ValueKind::GreedForLoot), 0.9);
        assert_eq!(values.scalars().len(), 5);
    }

    #[test]
    fn test_capabilities() {
        let caps = CapabilityProfile::default();
        assert!(caps.has(Capability::Combat));
        assert!(!caps.has(Capability::Healing));

        let caps = caps.with_skill(Capability::Healing, 0.4).without(Capability::Block);
        assert_eq!(caps.skill(Capability::Healing), 0.4);
        assert_eq!(caps.skill(Capability::Combat), 1.0);
        assert_eq!(caps.skill(Capability::Block), 0.0);
    }

    #[test]
    fn test_constraint_violation() {
        let constraints = ConstraintProfile::default();
        let tags: BTreeSet<ActionTag> = [ActionTag::Theft, ActionTag::HarmsCivilian].into();

        assert_eq!(
            constraints.first_violation(&tags),
            Some(ConstraintKind::HarmCivilians)
        );

        let relaxed = constraints.with(ConstraintKind::HarmCivilians, true);
        assert_eq!(relaxed.first_violation(&tags), None);
    }

    #[test]
    fn test_constraints_from_toml() {
        let constraints: ConstraintProfile = toml::from_str("risk_self_sacrifice = true").unwrap();
        assert!(constraints.risk_self_sacrifice);
        assert!(!constraints.harm_civilians);
    }
}
