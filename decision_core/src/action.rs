//! Candidate actions.
//!
//! Actions are supplied by an external candidate generator and are immutable once built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tactical_core::EntityId;

use crate::person::Capability;

/// Number of action types, i.e. the width of the one-hot block in [`Action::encode`].
pub const ACTION_TYPE_COUNT: usize = 11;

/// Length of [`Action::encode`]: one-hot type plus duration, magnitude and a 2D direction.
pub const ACTION_ENCODING_DIM: usize = ACTION_TYPE_COUNT + 4;

/// Durations at or above this many seconds encode as 1.0.
const MAX_ENCODED_DURATION: f32 = 10.0;

/// Kinds of actions the agent can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Wait,
    Attack,
    Flee,
    TakeCover,
    Sneak,
    Loot,
    BlockForPlayer,
    HealAlly,
    UsePotion,
    Explore,
    Follow,
}

impl ActionType {
    pub const ALL: [ActionType; ACTION_TYPE_COUNT] = [
        ActionType::Wait,
        ActionType::Attack,
        ActionType::Flee,
        ActionType::TakeCover,
        ActionType::Sneak,
        ActionType::Loot,
        ActionType::BlockForPlayer,
        ActionType::HealAlly,
        ActionType::UsePotion,
        ActionType::Explore,
        ActionType::Follow,
    ];

    /// Position in the one-hot encoding.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Capability the actor must have to perform this action at all.
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            ActionType::Attack => Some(Capability::Combat),
            ActionType::BlockForPlayer => Some(Capability::Block),
            ActionType::Sneak => Some(Capability::Stealth),
            ActionType::HealAlly => Some(Capability::Healing),
            _ => None,
        }
    }

    /// Tags every action of this type carries regardless of target.
    fn implied_tags(self) -> &'static [ActionTag] {
        match self {
            ActionType::BlockForPlayer => &[ActionTag::SelfSacrifice],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionType::Wait => "wait",
            ActionType::Attack => "attack",
            ActionType::Flee => "flee",
            ActionType::TakeCover => "take_cover",
            ActionType::Sneak => "sneak",
            ActionType::Loot => "loot",
            ActionType::BlockForPlayer => "block_for_player",
            ActionType::HealAlly => "heal_ally",
            ActionType::UsePotion => "use_potion",
            ActionType::Explore => "explore",
            ActionType::Follow => "follow",
        };
        f.write_str(name)
    }
}

/// Consequence markers attached by the candidate generator, checked against hard constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    HarmsCivilian,
    HarmsAlly,
    Theft,
    SelfSacrifice,
    AbandonsAlly,
}

/// Continuous action parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionParams {
    /// Seconds.
    pub duration: f32,
    /// Intensity, 0.0 - 1.0.
    pub magnitude: f32,
    /// Planar direction; zero when not directional.
    pub direction: [f32; 2],
}

impl Default for ActionParams {
    fn default() -> Self {
        Self {
            duration: 1.0,
            magnitude: 1.0,
            direction: [0.0, 0.0],
        }
    }
}

/// A candidate action. Scoring never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    action_type: ActionType,
    params: ActionParams,
    target: Option<EntityId>,
    tags: BTreeSet<ActionTag>,
    requires: BTreeSet<Capability>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            params: ActionParams::default(),
            target: None,
            tags: action_type.implied_tags().iter().copied().collect(),
            requires: BTreeSet::new(),
        }
    }

    /// Non-finite durations fall back to the default.
    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.params.duration = finite_or(seconds, ActionParams::default().duration).max(0.0);
        self
    }

    /// Non-finite magnitudes fall back to the default.
    pub fn with_magnitude(mut self, magnitude: f32) -> Self {
        self.params.magnitude =
            finite_or(magnitude, ActionParams::default().magnitude).clamp(0.0, 1.0);
        self
    }

    pub fn with_direction(mut self, direction: [f32; 2]) -> Self {
        self.params.direction = direction;
        self
    }

    pub fn with_target(mut self, target: impl Into<EntityId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_tag(mut self, tag: ActionTag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Require an extra capability beyond the one implied by the type (e.g. lockpicking).
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.requires.insert(capability);
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn params(&self) -> &ActionParams {
        &self.params
    }

    pub fn target(&self) -> Option<&EntityId> {
        self.target.as_ref()
    }

    pub fn tags(&self) -> &BTreeSet<ActionTag> {
        &self.tags
    }

    pub fn has_tag(&self, tag: ActionTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Every capability needed to perform this action.
    pub fn required_capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.action_type
            .required_capability()
            .into_iter()
            .chain(self.requires.iter().copied())
    }

    /// Fixed-length numeric encoding: one-hot type, normalized duration, magnitude, direction.
    pub fn encode(&self) -> [f32; ACTION_ENCODING_DIM] {
        let mut encoding = [0.0; ACTION_ENCODING_DIM];
        encoding[self.action_type.index()] = 1.0;

        let [dx, dy] = self.params.direction;
        let norm = (dx * dx + dy * dy).sqrt();
        let (dx, dy) = if norm > 1.0 && norm.is_finite() {
            (dx / norm, dy / norm)
        } else if norm.is_finite() {
            (dx, dy)
        } else {
            (0.0, 0.0)
        };

        let defaults = ActionParams::default();
        let duration = finite_or(self.params.duration, defaults.duration);
        let magnitude = finite_or(self.params.magnitude, defaults.magnitude);
        encoding[ACTION_TYPE_COUNT] = (duration / MAX_ENCODED_DURATION).clamp(0.0, 1.0);
        encoding[ACTION_TYPE_COUNT + 1] = magnitude.clamp(0.0, 1.0);
        encoding[ACTION_TYPE_COUNT + 2] = dx;
        encoding[ACTION_TYPE_COUNT + 3] = dy;
        encoding
    }
}

fn finite_or(value: f32, default: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

impl From<ActionType> for Action {
    fn from(action_type: ActionType) -> Self {
        Action::new(action_type)
    }
}
