//! Action scoring and selection.
//!
//! Evaluation is two-phase. The hard filter vetoes candidates the person cannot perform
//! (missing capability) or must not perform (forbidden by a constraint). Only surviving
//! candidates are soft-scored:
//!
//! ```text
//! score = base + Σ trait bonuses + Σ value bonuses + Σ goal bonuses
//! ```
//!
//! A veto is an outcome of its own; it never takes part in arithmetic.

mod planning;
mod rules;

pub use planning::*;
pub use rules::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tactical_core::EntityTracker;
use tracing::{debug, trace};

use crate::action::{Action, ActionTag, ActionType};
use crate::error::{DecisionError, Result};
use crate::mental_state::{DecodedState, Latent, MentalStateFuser};
use crate::person::{Capability, ConstraintKind, Person};

/// Why a candidate was rejected by the hard filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VetoReason {
    MissingCapability(Capability),
    ConstraintViolated(ConstraintKind),
}

/// Result of evaluating one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOutcome {
    Scored(f32),
    Vetoed(VetoReason),
}

impl ScoreOutcome {
    pub fn is_vetoed(&self) -> bool {
        matches!(self, ScoreOutcome::Vetoed(_))
    }

    pub fn score(&self) -> Option<f32> {
        match self {
            ScoreOutcome::Scored(score) => Some(*score),
            ScoreOutcome::Vetoed(_) => None,
        }
    }
}

/// Where a soft score came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: f32,
    pub trait_bonus: f32,
    pub value_bonus: f32,
    pub goal_bonus: f32,
    pub planning_bonus: f32,
    /// Names of the rules that fired.
    pub fired: Vec<String>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.base + self.trait_bonus + self.value_bonus + self.goal_bonus + self.planning_bonus
    }
}

/// Outcome and explanation for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub action_type: ActionType,
    pub outcome: ScoreOutcome,
    /// Present only for non-vetoed candidates.
    pub breakdown: Option<ScoreBreakdown>,
}

/// The chosen action and how it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub action: Action,
    /// Position among the candidates, `None` for the fallback.
    pub index: Option<usize>,
    pub score: Option<f32>,
    /// Every candidate was vetoed (or none were offered).
    pub fallback_used: bool,
    pub evaluations: Vec<CandidateEvaluation>,
}

/// Policy configuration: base scores, rule table, fallback and planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Base score for action types without an entry in `base_scores`.
    pub default_base: f32,
    pub base_scores: BTreeMap<ActionType, f32>,
    pub rules: RuleTable,
    /// Safe default returned when no candidate survives the hard filter.
    pub fallback_action: ActionType,
    pub planning: PlanningConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_base: 0.1,
            base_scores: BTreeMap::new(),
            rules: RuleTable::default(),
            fallback_action: ActionType::Wait,
            planning: PlanningConfig::default(),
        }
    }
}

impl ScoringConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let bases_finite = self.default_base.is_finite()
            && self.base_scores.values().all(|base| base.is_finite());
        if !bases_finite {
            return Err(DecisionError::Configuration(
                "base scores must be finite".into(),
            ));
        }
        if !self.planning.weight.is_finite() {
            return Err(DecisionError::Configuration(
                "planning.weight must be finite".into(),
            ));
        }
        self.rules.validate()
    }

    fn base_for(&self, action: ActionType) -> f32 {
        self.base_scores
            .get(&action)
            .copied()
            .unwrap_or(self.default_base)
    }
}

/// Scores candidate actions for a person in a decoded mental state.
#[derive(Debug, Clone)]
pub struct ActionScorer {
    config: ScoringConfig,
}

impl ActionScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScoringConfig::default())
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// The hard filter alone.
    pub fn veto(&self, person: &Person, action: &Action) -> Option<VetoReason> {
        if let Some(missing) = action
            .required_capabilities()
            .find(|capability| !person.capabilities.has(*capability))
        {
            return Some(VetoReason::MissingCapability(missing));
        }
        person
            .constraints
            .first_violation(action.tags())
            .map(VetoReason::ConstraintViolated)
    }

    /// Score one candidate.
    pub fn score(&self, person: &Person, state: &DecodedState, action: &Action) -> ScoreOutcome {
        self.evaluate(person, state, action).outcome
    }

    /// Score one candidate and keep the breakdown.
    pub fn evaluate(
        &self,
        person: &Person,
        state: &DecodedState,
        action: &Action,
    ) -> CandidateEvaluation {
        let action_type = action.action_type();
        if let Some(reason) = self.veto(person, action) {
            trace!(action = %action_type, ?reason, "candidate vetoed");
            return CandidateEvaluation {
                action_type,
                outcome: ScoreOutcome::Vetoed(reason),
                breakdown: None,
            };
        }

        let rules = &self.config.rules;
        let mut breakdown = ScoreBreakdown {
            base: self.config.base_for(action_type),
            ..Default::default()
        };
        for rule in &rules.trait_rules {
            if let Some(bonus) = rule.bonus_for(action_type, person, state) {
                breakdown.trait_bonus += bonus;
                breakdown.fired.push(rule.name.clone());
            }
        }
        for rule in &rules.value_rules {
            if let Some(bonus) = rule.bonus_for(action_type, person, state) {
                breakdown.value_bonus += bonus;
                breakdown.fired.push(rule.name.clone());
            }
        }
        for rule in &rules.goal_rules {
            if let Some(bonus) = rule.bonus_for(action_type, person) {
                breakdown.goal_bonus += bonus;
                breakdown.fired.push(format!("goal:{:?}", rule.goal));
            }
        }

        let total = breakdown.total();
        trace!(action = %action_type, score = total, fired = ?breakdown.fired, "candidate scored");
        CandidateEvaluation {
            action_type,
            outcome: ScoreOutcome::Scored(total),
            breakdown: Some(breakdown),
        }
    }

    /// Pick the best non-vetoed candidate. Ties go to the earlier candidate.
    pub fn select(&self, person: &Person, state: &DecodedState, candidates: &[Action]) -> Selection {
        let evaluations: Vec<_> = candidates
            .iter()
            .map(|action| self.evaluate(person, state, action))
            .collect();
        self.finish(candidates, evaluations, None)
    }

    /// Selection with rollout refinement of the top candidates when planning is enabled.
    ///
    /// Only the top-N soft-scored candidates compete in the final choice; each gets
    /// `weight * Σ(value - threat)` over a rollout that repeats it for the horizon.
    pub fn select_with_planning(
        &self,
        person: &Person,
        fuser: &MentalStateFuser,
        latent: &Latent,
        state: &DecodedState,
        candidates: &[Action],
    ) -> Result<Selection> {
        let planning = &self.config.planning;
        if !planning.enabled || planning.top_n == 0 || planning.horizon == 0 {
            return Ok(self.select(person, state, candidates));
        }

        let mut evaluations: Vec<_> = candidates
            .iter()
            .map(|action| self.evaluate(person, state, action))
            .collect();

        let mut ranked: Vec<(usize, f32)> = evaluations
            .iter()
            .enumerate()
            .filter_map(|(i, evaluation)| evaluation.outcome.score().map(|s| (i, s)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(planning.top_n);

        let mut shortlist = Vec::with_capacity(ranked.len());
        for (index, _) in ranked {
            let lookahead = rollout_value(fuser, latent, &candidates[index], planning.horizon)?;
            let evaluation = &mut evaluations[index];
            if let Some(breakdown) = evaluation.breakdown.as_mut() {
                breakdown.planning_bonus = planning.weight * lookahead;
                evaluation.outcome = ScoreOutcome::Scored(breakdown.total());
            }
            shortlist.push(index);
        }
        shortlist.sort_unstable();

        Ok(self.finish(candidates, evaluations, Some(&shortlist)))
    }

    fn finish(
        &self,
        candidates: &[Action],
        evaluations: Vec<CandidateEvaluation>,
        eligible: Option<&[usize]>,
    ) -> Selection {
        let mut best: Option<(usize, f32)> = None;
        for (index, evaluation) in evaluations.iter().enumerate() {
            if eligible.is_some_and(|allowed| !allowed.contains(&index)) {
                continue;
            }
            if let Some(score) = evaluation.outcome.score() {
                if best.map_or(true, |(_, top)| score > top) {
                    best = Some((index, score));
                }
            }
        }

        match best {
            Some((index, score)) => {
                debug!(action = %candidates[index].action_type(), score, "selected action");
                Selection {
                    action: candidates[index].clone(),
                    index: Some(index),
                    score: Some(score),
                    fallback_used: false,
                    evaluations,
                }
            }
            None => {
                debug!(
                    candidates = candidates.len(),
                    fallback = %self.config.fallback_action,
                    "no valid action, using fallback"
                );
                Selection {
                    action: Action::new(self.config.fallback_action),
                    index: None,
                    score: None,
                    fallback_used: true,
                    evaluations,
                }
            }
        }
    }
}

/// Add consequence tags implied by the action's target, as currently tracked.
///
/// Attacking a civilian harms a civilian, attacking an ally harms an ally, and looting a
/// living NPC is theft.
pub fn annotate_targets(action: Action, tracker: &EntityTracker) -> Action {
    let Some(npc) = action
        .target()
        .and_then(|id| tracker.get(id))
        .and_then(|tracked| tracked.entity.as_npc())
    else {
        return action;
    };

    let (civilian, ally, alive) = (npc.is_civilian, npc.is_ally, npc.is_alive);
    match action.action_type() {
        ActionType::Attack if civilian => action.with_tag(ActionTag::HarmsCivilian),
        ActionType::Attack if ally => action.with_tag(ActionTag::HarmsAlly),
        ActionType::Loot if alive => action.with_tag(ActionTag::Theft),
        _ => action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{CapabilityProfile, ConstraintProfile, TraitKind, TraitProfile};
    use tactical_core::{Entity, NpcState, Position, Snapshot};

    fn neutral() -> DecodedState {
        let fuser = MentalStateFuser::with_defaults().unwrap();
        fuser.decode(&fuser.zero_latent())
    }

    #[test]
    fn test_missing_capability_vetoes() {
        let scorer = ActionScorer::with_defaults();
        let person = Person::new("Mage", "mage")
            .with_capabilities(CapabilityProfile::none().with(Capability::Magic));
        let outcome = scorer.score(&person, &neutral(), &Action::new(ActionType::Attack));
        assert_eq!(
            outcome,
            ScoreOutcome::Vetoed(VetoReason::MissingCapability(Capability::Combat))
        );
    }

    #[test]
    fn test_constraint_vetoes_despite_bonuses() {
        let scorer = ActionScorer::with_defaults();
        let person = Person::new("Brute", "brute")
            .with_traits(TraitProfile::default().with(TraitKind::Aggression, 1.0));
        let attack = Action::new(ActionType::Attack).with_tag(ActionTag::HarmsCivilian);

        assert_eq!(
            scorer.score(&person, &neutral(), &attack),
            ScoreOutcome::Vetoed(VetoReason::ConstraintViolated(ConstraintKind::HarmCivilians))
        );
    }

    #[test]
    fn test_self_sacrifice_needs_permission() {
        let scorer = ActionScorer::with_defaults();
        let block = Action::new(ActionType::BlockForPlayer);
        let person = Person::new("Lydia", "lydia");
        assert!(scorer.score(&person, &neutral(), &block).is_vetoed());

        let devoted = person.with_constraints(
            ConstraintProfile::default().with(ConstraintKind::RiskSelfSacrifice, true),
        );
        assert!(!scorer.score(&devoted, &neutral(), &block).is_vetoed());
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let scorer = ActionScorer::new(ScoringConfig {
            rules: RuleTable::empty(),
            ..Default::default()
        });
        let person = Person::new("Lydia", "lydia");
        let candidates = [Action::new(ActionType::Follow), Action::new(ActionType::Wait)];

        let selection = scorer.select(&person, &neutral(), &candidates);
        assert_eq!(selection.index, Some(0));
        assert_eq!(selection.action.action_type(), ActionType::Follow);
    }

    #[test]
    fn test_all_vetoed_falls_back() {
        let scorer = ActionScorer::with_defaults();
        let person = Person::new("Pacifist", "pacifist").with_capabilities(CapabilityProfile::none());
        let candidates = [Action::new(ActionType::Attack), Action::new(ActionType::Sneak)];

        let selection = scorer.select(&person, &neutral(), &candidates);
        assert!(selection.fallback_used);
        assert_eq!(selection.action.action_type(), ActionType::Wait);
        assert_eq!(selection.evaluations.len(), 2);

        let empty = scorer.select(&person, &neutral(), &[]);
        assert!(empty.fallback_used);
    }

    #[test]
    fn test_base_scores() {
        let mut config = ScoringConfig {
            rules: RuleTable::empty(),
            ..Default::default()
        };
        config.base_scores.insert(ActionType::Explore, 0.6);
        let scorer = ActionScorer::new(config);
        let person = Person::new("Lydia", "lydia");

        let selection = scorer.select(
            &person,
            &neutral(),
            &[Action::new(ActionType::Wait), Action::new(ActionType::Explore)],
        );
        assert_eq!(selection.action.action_type(), ActionType::Explore);
        assert_eq!(selection.score, Some(0.6));
    }

    #[test]
    fn test_non_finite_scoring_config_rejected() {
        assert!(ScoringConfig::from_toml_str("default_base = nan").is_err());
        assert!(ScoringConfig::from_toml_str("[base_scores]\nflee = -inf").is_err());
        assert!(ScoringConfig::from_toml_str("fallback_action = \"take_cover\"").is_ok());

        let mut config = ScoringConfig::default();
        config.rules.value_rules.push(ScoringRule::new(
            "broken",
            Condition::Not(Box::new(Condition::above(
                Signal::World(WorldSignal::Threat),
                f32::NAN,
            ))),
            [ActionType::Wait],
            0.1,
        ));
        assert!(matches!(
            config.validate(),
            Err(DecisionError::Configuration(_))
        ));

        let mut config = ScoringConfig::default();
        config.rules.goal_rules[0].weight = f32::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_planning_restricts_to_shortlist() {
        let mut config = ScoringConfig {
            rules: RuleTable::empty(),
            ..Default::default()
        };
        config.base_scores.insert(ActionType::Flee, 0.9);
        config.planning = PlanningConfig {
            enabled: true,
            top_n: 1,
            horizon: 2,
            weight: 0.0,
        };
        let scorer = ActionScorer::new(config);
        let fuser = MentalStateFuser::with_defaults().unwrap();
        let person = Person::new("Lydia", "lydia");
        let latent = fuser.zero_latent();

        let selection = scorer
            .select_with_planning(
                &person,
                &fuser,
                &latent,
                &fuser.decode(&latent),
                &[Action::new(ActionType::Wait), Action::new(ActionType::Flee)],
            )
            .unwrap();
        assert_eq!(selection.index, Some(1));
        let breakdown = selection.evaluations[1].breakdown.as_ref().unwrap();
        assert_eq!(breakdown.planning_bonus, 0.0);
    }

    #[test]
    fn test_annotate_targets() {
        let snapshot = Snapshot::new(1.0, "player", Position::default(), 0.0, 1.0)
            .with_entity(Entity::npc("farmer", Position::planar(2.0, 0.0), NpcState::civilian()))
            .with_entity(Entity::npc("lydia", Position::planar(1.0, 0.0), NpcState::ally(0.5)));
        let mut tracker = EntityTracker::with_defaults();
        tracker.ingest(&snapshot).unwrap();

        let attack_farmer = annotate_targets(Action::new(ActionType::Attack).with_target("farmer"), &tracker);
        assert!(attack_farmer.has_tag(ActionTag::HarmsCivilian));

        let attack_lydia = annotate_targets(Action::new(ActionType::Attack).with_target("lydia"), &tracker);
        assert!(attack_lydia.has_tag(ActionTag::HarmsAlly));

        let pickpocket = annotate_targets(Action::new(ActionType::Loot).with_target("farmer"), &tracker);
        assert!(pickpocket.has_tag(ActionTag::Theft));

        let untargeted = annotate_targets(Action::new(ActionType::Attack), &tracker);
        assert!(untargeted.tags().is_empty());
    }
}
