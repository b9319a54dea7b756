//! Declarative scoring rules.
//!
//! A rule is a condition over the person and the decoded mental state, a set of action types
//! it applies to, and a bonus. Personality effects are expressed entirely as rule data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::action::ActionType;
use crate::error::{DecisionError, Result};
use crate::mental_state::DecodedState;
use crate::person::{GoalKind, Person, TraitKind, ValueKind};

/// World-slice quantities a rule can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldSignal {
    Threat,
    EnemyPressure,
    EnemiesInLos,
    Proximity,
    CoverAvailable,
    CoverQuality,
    StealthSafety,
    LootOpportunity,
    AllyInDanger,
    PlayerHealth,
}

/// Self-slice quantities a rule can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfSignal {
    Health,
    Stamina,
    Magicka,
    InCombat,
    Sneaking,
}

/// Affect-slice quantities a rule can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectSignal {
    Fear,
    Stress,
    Curiosity,
    Threat,
    Value,
    Surprise,
    Confidence,
}

/// A scalar read from the person profile or the decoded mental state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Trait(TraitKind),
    Value(ValueKind),
    World(WorldSignal),
    SelfState(SelfSignal),
    Affect(AffectSignal),
}

impl Signal {
    pub fn read(&self, person: &Person, state: &DecodedState) -> f32 {
        match *self {
            Signal::Trait(kind) => person.traits.get(kind),
            Signal::Value(kind) => person.values.get(kind),
            Signal::World(signal) => {
                let world = &state.world;
                match signal {
                    WorldSignal::Threat => world.threat_level,
                    WorldSignal::EnemyPressure => world.enemy_pressure,
                    WorldSignal::EnemiesInLos => world.enemies_in_los,
                    WorldSignal::Proximity => world.nearest_enemy_proximity,
                    WorldSignal::CoverAvailable => world.cover_available,
                    WorldSignal::CoverQuality => world.cover_quality,
                    WorldSignal::StealthSafety => world.stealth_safety,
                    WorldSignal::LootOpportunity => world.loot_opportunity,
                    WorldSignal::AllyInDanger => world.ally_in_danger,
                    WorldSignal::PlayerHealth => world.player_health,
                }
            }
            Signal::SelfState(signal) => {
                let body = &state.self_state;
                match signal {
                    SelfSignal::Health => body.health,
                    SelfSignal::Stamina => body.stamina,
                    SelfSignal::Magicka => body.magicka,
                    SelfSignal::InCombat => body.in_combat,
                    SelfSignal::Sneaking => body.sneaking,
                }
            }
            Signal::Affect(signal) => {
                let affect = &state.affect;
                match signal {
                    AffectSignal::Fear => affect.fear,
                    AffectSignal::Stress => affect.stress,
                    AffectSignal::Curiosity => affect.curiosity,
                    AffectSignal::Threat => affect.threat,
                    AffectSignal::Value => affect.value,
                    AffectSignal::Surprise => affect.surprise,
                    AffectSignal::Confidence => affect.confidence,
                }
            }
        }
    }
}

/// When a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    /// Signal strictly greater than the threshold.
    Above { signal: Signal, threshold: f32 },
    /// Signal strictly less than the threshold.
    Below { signal: Signal, threshold: f32 },
    GoalActive(GoalKind),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn above(signal: Signal, threshold: f32) -> Self {
        Condition::Above { signal, threshold }
    }

    pub fn below(signal: Signal, threshold: f32) -> Self {
        Condition::Below { signal, threshold }
    }

    /// All thresholds, nested ones included, are finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Condition::Always | Condition::GoalActive(_) => true,
            Condition::Above { threshold, .. } | Condition::Below { threshold, .. } => {
                threshold.is_finite()
            }
            Condition::All(conditions) | Condition::Any(conditions) => {
                conditions.iter().all(Condition::is_finite)
            }
            Condition::Not(condition) => condition.is_finite(),
        }
    }

    pub fn holds(&self, person: &Person, state: &DecodedState) -> bool {
        match self {
            Condition::Always => true,
            Condition::Above { signal, threshold } => signal.read(person, state) > *threshold,
            Condition::Below { signal, threshold } => signal.read(person, state) < *threshold,
            Condition::GoalActive(kind) => person.goals.active_priority(*kind).is_some(),
            Condition::All(conditions) => conditions.iter().all(|c| c.holds(person, state)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.holds(person, state)),
            Condition::Not(condition) => !condition.holds(person, state),
        }
    }
}

/// Condition, target action set, bonus. An optional signal scales the bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub name: String,
    pub when: Condition,
    pub actions: BTreeSet<ActionType>,
    pub bonus: f32,
    #[serde(default)]
    pub scale_by: Option<Signal>,
}

impl ScoringRule {
    pub fn new(
        name: impl Into<String>,
        when: Condition,
        actions: impl IntoIterator<Item = ActionType>,
        bonus: f32,
    ) -> Self {
        Self {
            name: name.into(),
            when,
            actions: actions.into_iter().collect(),
            bonus,
            scale_by: None,
        }
    }

    pub fn scaled_by(mut self, signal: Signal) -> Self {
        self.scale_by = Some(signal);
        self
    }

    /// The bonus this rule adds to `action`, or `None` if it does not apply.
    pub fn bonus_for(&self, action: ActionType, person: &Person, state: &DecodedState) -> Option<f32> {
        if !self.actions.contains(&action) || !self.when.holds(person, state) {
            return None;
        }
        let scale = self
            .scale_by
            .map(|signal| signal.read(person, state))
            .unwrap_or(1.0);
        Some(self.bonus * scale)
    }
}

/// Goal alignment: actions serving an active goal earn `weight * priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRule {
    pub goal: GoalKind,
    pub actions: BTreeSet<ActionType>,
    pub weight: f32,
}

impl GoalRule {
    pub fn new(goal: GoalKind, actions: impl IntoIterator<Item = ActionType>, weight: f32) -> Self {
        Self {
            goal,
            actions: actions.into_iter().collect(),
            weight,
        }
    }

    pub fn bonus_for(&self, action: ActionType, person: &Person) -> Option<f32> {
        if !self.actions.contains(&action) {
            return None;
        }
        person
            .goals
            .active_priority(self.goal)
            .map(|priority| self.weight * priority)
    }
}

/// Trait, value and goal rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTable {
    pub trait_rules: Vec<ScoringRule>,
    pub value_rules: Vec<ScoringRule>,
    pub goal_rules: Vec<GoalRule>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self {
            trait_rules: Vec::new(),
            value_rules: Vec::new(),
            goal_rules: Vec::new(),
        }
    }

    /// Reject non-finite bonuses, weights and thresholds.
    pub fn validate(&self) -> Result<()> {
        for rule in self.trait_rules.iter().chain(&self.value_rules) {
            if !rule.bonus.is_finite() || !rule.when.is_finite() {
                return Err(DecisionError::Configuration(format!(
                    "rule `{}` has a non-finite bonus or threshold",
                    rule.name
                )));
            }
        }
        for rule in &self.goal_rules {
            if !rule.weight.is_finite() {
                return Err(DecisionError::Configuration(format!(
                    "goal rule for {:?} has a non-finite weight",
                    rule.goal
                )));
            }
        }
        Ok(())
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        use ActionType::*;

        let trait_ = Signal::Trait;
        let value = Signal::Value;
        let world = Signal::World;

        let allies_need_help = Condition::All(vec![
            Condition::above(value(ValueKind::ProtectAllies), 0.7),
            Condition::above(world(WorldSignal::AllyInDanger), 0.5),
        ]);

        Self {
            trait_rules: vec![
                ScoringRule::new(
                    "aggressive_attack",
                    Condition::above(trait_(TraitKind::Aggression), 0.6),
                    [Attack],
                    0.3,
                ),
                ScoringRule::new(
                    "cautious_positioning",
                    Condition::above(trait_(TraitKind::Caution), 0.6),
                    [TakeCover, Sneak],
                    0.2,
                ),
                ScoringRule::new(
                    "brave_under_fire",
                    Condition::All(vec![
                        Condition::above(trait_(TraitKind::Bravery), 0.7),
                        Condition::above(world(WorldSignal::Threat), 0.5),
                    ]),
                    [Attack, BlockForPlayer],
                    0.15,
                ),
                ScoringRule::new(
                    "curious_wandering",
                    Condition::All(vec![
                        Condition::above(trait_(TraitKind::Curiosity), 0.6),
                        Condition::below(world(WorldSignal::Threat), 0.3),
                    ]),
                    [Explore],
                    0.2,
                ),
                ScoringRule::new(
                    "loyal_guardian",
                    Condition::All(vec![
                        Condition::above(trait_(TraitKind::Loyalty), 0.7),
                        Condition::above(world(WorldSignal::AllyInDanger), 0.5),
                    ]),
                    [BlockForPlayer, HealAlly],
                    0.2,
                ),
                ScoringRule::new(
                    "loyal_follower",
                    Condition::above(trait_(TraitKind::Loyalty), 0.6),
                    [Follow],
                    0.1,
                ),
                ScoringRule::new(
                    "impulsive_strike",
                    Condition::All(vec![
                        Condition::above(trait_(TraitKind::Impulsivity), 0.7),
                        Condition::below(Signal::Affect(AffectSignal::Fear), 0.5),
                    ]),
                    [Attack],
                    0.1,
                ),
            ],
            value_rules: vec![
                ScoringRule::new(
                    "greedy_looting",
                    Condition::All(vec![
                        Condition::above(value(ValueKind::GreedForLoot), 0.7),
                        Condition::above(world(WorldSignal::LootOpportunity), 0.5),
                    ]),
                    [Loot],
                    0.35,
                ),
                ScoringRule::new("protective_block", allies_need_help.clone(), [BlockForPlayer], 0.5),
                ScoringRule::new("protective_heal", allies_need_help.clone(), [HealAlly], 0.4),
                ScoringRule::new(
                    "retreat_under_threat",
                    Condition::above(world(WorldSignal::Threat), 0.6),
                    [Flee, TakeCover],
                    0.5,
                )
                .scaled_by(value(ValueKind::SelfPreservation)),
                ScoringRule::new(
                    "never_abandon_allies",
                    Condition::All(vec![
                        allies_need_help,
                        Condition::above(world(WorldSignal::Threat), 0.6),
                    ]),
                    [Flee],
                    -0.3,
                ),
                ScoringRule::new(
                    "drink_when_wounded",
                    Condition::below(Signal::SelfState(SelfSignal::Health), 0.4),
                    [UsePotion],
                    0.4,
                )
                .scaled_by(value(ValueKind::SelfPreservation)),
                ScoringRule::new(
                    "wanderlust",
                    Condition::All(vec![
                        Condition::above(value(ValueKind::Exploration), 0.7),
                        Condition::below(world(WorldSignal::Threat), 0.3),
                    ]),
                    [Explore],
                    0.2,
                ),
            ],
            goal_rules: vec![
                GoalRule::new(GoalKind::KeepAllyAlive, [BlockForPlayer, HealAlly], 0.5),
                GoalRule::new(GoalKind::Survive, [Flee, TakeCover, UsePotion], 0.3),
                GoalRule::new(GoalKind::AcquireLoot, [Loot], 0.3),
                GoalRule::new(GoalKind::DefeatEnemies, [Attack], 0.3),
                GoalRule::new(GoalKind::AvoidDetection, [Sneak, TakeCover], 0.3),
                GoalRule::new(GoalKind::Explore, [Explore], 0.3),
            ],
        }
    }
}
