//! The per-agent decision cycle.
//!
//! One tick runs, strictly in order:
//! snapshot → tracker → tactical features → encode → decode → score → select → predict.
//! The cycle owns the agent's tracker and mental state; the fuser and scorer are shared
//! read-only between agents.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tactical_core::{
    EntityId, EntityTracker, Snapshot, TacticalConfig, TacticalFeatureComputer, TacticalFeatures,
    TrackerConfig,
};
use tracing::{debug, warn};

use crate::action::Action;
use crate::error::{DecisionError, Result};
use crate::mental_state::{
    DecodedState, Latent, MentalState, MentalStateExport, MentalStateFuser, SelfFeatures,
};
use crate::person::{Person, PersonId};
use crate::policy::{annotate_targets, ActionScorer, Selection};
use crate::runtime::RetryPolicy;
use crate::training::{PendingRecord, TrainingSink};

/// Timing configuration for a cycle and its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Upper bound for one cycle; past it the previous action is reused.
    pub latency_budget_ms: u64,
    /// Per-attempt timeout for external inputs such as the visual embedding.
    pub collaborator_timeout_ms: u64,
    /// Total time external inputs may take per tick, retries included.
    pub collaborator_budget_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 100,
            collaborator_timeout_ms: 30,
            collaborator_budget_ms: 50,
            retry: RetryPolicy::default(),
        }
    }
}

impl CycleConfig {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Never longer than the cycle budget.
    pub fn collaborator_budget(&self) -> Duration {
        Duration::from_millis(self.collaborator_budget_ms.min(self.latency_budget_ms))
    }
}

/// Per-tick inputs besides the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleInputs<'a> {
    pub visual: Option<&'a [f32]>,
    pub candidates: &'a [Action],
    /// Wall-clock time used for snapshot age; defaults to the snapshot's own timestamp.
    pub now: Option<f64>,
}

impl<'a> CycleInputs<'a> {
    pub fn new(candidates: &'a [Action]) -> Self {
        Self {
            visual: None,
            candidates,
            now: None,
        }
    }

    pub fn with_visual(mut self, visual: &'a [f32]) -> Self {
        self.visual = Some(visual);
        self
    }

    pub fn at(mut self, now: f64) -> Self {
        self.now = Some(now);
        self
    }
}

/// Everything one tick produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutput {
    pub agent: PersonId,
    pub timestamp: f64,
    pub selection: Selection,
    pub features: TacticalFeatures,
    pub mental_state: MentalStateExport,
    pub surprise: f32,
    pub evicted: Vec<EntityId>,
    pub reset: bool,
    #[serde(with = "duration_micros")]
    pub elapsed: Duration,
    pub over_budget: bool,
}

impl CycleOutput {
    pub fn action(&self) -> &Action {
        &self.selection.action
    }
}

mod duration_micros {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(deserializer)?))
    }
}

/// One agent's pipeline.
pub struct DecisionCycle {
    agent: PersonId,
    tracker: EntityTracker,
    computer: TacticalFeatureComputer,
    state: MentalState,
    fuser: Arc<MentalStateFuser>,
    scorer: Arc<ActionScorer>,
    config: CycleConfig,
    last_prediction: Option<Latent>,
    pending: Option<PendingRecord>,
    last_action: Option<Action>,
    sink: Option<Box<dyn TrainingSink>>,
}

impl std::fmt::Debug for DecisionCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCycle")
            .field("agent", &self.agent)
            .field("lifecycle", &self.state.lifecycle())
            .field("tracked", &self.tracker.len())
            .field("last_action", &self.last_action)
            .finish()
    }
}

impl DecisionCycle {
    pub fn new(agent: PersonId, fuser: Arc<MentalStateFuser>, scorer: Arc<ActionScorer>) -> Self {
        let state = MentalState::new(agent, fuser.latent_dim());
        Self {
            agent,
            tracker: EntityTracker::with_defaults(),
            computer: TacticalFeatureComputer::with_defaults(),
            state,
            fuser,
            scorer,
            config: CycleConfig::default(),
            last_prediction: None,
            pending: None,
            last_action: None,
            sink: None,
        }
    }

    pub fn with_tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker = EntityTracker::new(config);
        self
    }

    pub fn with_tactical_config(mut self, config: TacticalConfig) -> Self {
        self.computer = TacticalFeatureComputer::new(config);
        self
    }

    pub fn with_config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn TrainingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn agent(&self) -> PersonId {
        self.agent
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn tracker(&self) -> &EntityTracker {
        &self.tracker
    }

    pub fn mental_state(&self) -> &MentalState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The most recently selected action, if any cycle has completed.
    pub fn last_action(&self) -> Option<&Action> {
        self.last_action.as_ref()
    }

    /// The action to fall back on when a cycle cannot produce a fresh one: the last
    /// selection, or the configured safe default.
    pub fn reusable_action(&self) -> Action {
        self.last_action
            .clone()
            .unwrap_or_else(|| Action::new(self.scorer.config().fallback_action))
    }

    /// Current state with freshly decoded slices.
    pub fn export(&self) -> MentalStateExport {
        MentalStateExport::new(&self.state, self.fuser.decode(self.state.latent()))
    }

    /// Session boundary: forget tracked entities and zero the latent. The person is untouched.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.clear_mind();
    }

    fn clear_mind(&mut self) {
        self.state.reset();
        self.last_prediction = None;
        if self.pending.take().is_some() {
            debug!(agent = %self.agent, "dropping open training record at reset");
        }
    }

    /// Run one full cycle.
    ///
    /// Rejected snapshots return [`DecisionError::Snapshot`] and leave the agent untouched.
    /// Fatal errors mark the agent terminal; later ticks return
    /// [`DecisionError::AgentTerminated`].
    pub fn tick(
        &mut self,
        person: &Person,
        snapshot: &Snapshot,
        inputs: CycleInputs<'_>,
    ) -> Result<CycleOutput> {
        if self.state.is_terminal() {
            return Err(DecisionError::AgentTerminated(self.agent));
        }

        let result = self.run(person, snapshot, inputs);
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!(agent = %self.agent, error = %err, "agent pipeline terminated");
                self.state.terminate();
                self.pending = None;
                self.last_prediction = None;
            }
        }
        result
    }

    fn run(
        &mut self,
        person: &Person,
        snapshot: &Snapshot,
        inputs: CycleInputs<'_>,
    ) -> Result<CycleOutput> {
        let started = Instant::now();
        person.validate()?;

        let report = self.tracker.ingest(snapshot)?;
        if report.cell_changed {
            debug!(agent = %self.agent, cell = ?snapshot.cell.id, "location changed");
            self.clear_mind();
        }

        let now = inputs.now.unwrap_or(snapshot.timestamp);
        let features = self.computer.compute_from_tracker(&self.tracker, now);
        let self_features = self.self_features(person);

        let visual = inputs.visual.filter(|embedding| {
            let expected = self.fuser.config().visual_dim;
            let ok = embedding.len() == expected;
            if !ok {
                warn!(
                    agent = %self.agent,
                    expected,
                    actual = embedding.len(),
                    "discarding visual embedding of wrong length"
                );
            }
            ok
        });

        let latent = self
            .fuser
            .encode(self.state.latent(), &features, visual, &self_features)?;
        let surprise = match &self.last_prediction {
            Some(predicted) => self.fuser.surprise(predicted, &latent)?,
            None => 0.0,
        };
        self.state.commit(latent, snapshot.timestamp)?;

        let mut decoded = self.fuser.decode(self.state.latent());
        decoded.affect = decoded.affect.with_surprise(surprise);

        self.close_pending(&features, visual, &decoded);

        let candidates: Vec<Action> = inputs
            .candidates
            .iter()
            .cloned()
            .map(|action| annotate_targets(action, &self.tracker))
            .collect();
        let selection = self.scorer.select_with_planning(
            person,
            &self.fuser,
            self.state.latent(),
            &decoded,
            &candidates,
        )?;

        self.last_prediction = Some(self.fuser.predict(self.state.latent(), &selection.action)?);
        self.pending = Some(PendingRecord {
            agent: self.agent,
            timestamp: snapshot.timestamp,
            tactical_features: features.clone(),
            visual_embedding: visual.map(<[f32]>::to_vec),
            self_features,
            action_type: selection.action.action_type(),
            action_params: *selection.action.params(),
            affect: decoded.affect.clone(),
        });
        self.last_action = Some(selection.action.clone());

        let elapsed = started.elapsed();
        let over_budget = elapsed > self.config.latency_budget();
        if over_budget {
            warn!(
                agent = %self.agent,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.latency_budget_ms,
                "decision cycle exceeded latency budget"
            );
        }

        debug!(
            agent = %self.agent,
            timestamp = snapshot.timestamp,
            action = %selection.action.action_type(),
            fallback = selection.fallback_used,
            surprise,
            "cycle complete"
        );

        Ok(CycleOutput {
            agent: self.agent,
            timestamp: snapshot.timestamp,
            mental_state: MentalStateExport::new(&self.state, decoded),
            selection,
            features,
            surprise,
            evicted: report.evicted,
            reset: report.cell_changed,
            elapsed,
            over_budget,
        })
    }

    fn self_features(&self, person: &Person) -> SelfFeatures {
        match self.tracker.get(&person.embodied_by) {
            Some(tracked) => SelfFeatures::from_entity(&tracked.entity),
            None => {
                debug!(
                    agent = %self.agent,
                    entity = %person.embodied_by,
                    "embodied entity not tracked, assuming full health"
                );
                SelfFeatures::default()
            }
        }
    }

    fn close_pending(
        &mut self,
        features: &TacticalFeatures,
        visual: Option<&[f32]>,
        decoded: &DecodedState,
    ) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let record = pending.close(features.clone(), visual.map(<[f32]>::to_vec), &decoded.affect);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = sink.append(&record) {
                warn!(agent = %self.agent, error = %err, "failed to append training record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::person::{TraitKind, TraitProfile};
    use crate::training::MemorySink;
    use tactical_core::{CellInfo, Entity, NpcState, Position};

    fn cycle() -> DecisionCycle {
        DecisionCycle::new(
            PersonId::new(),
            Arc::new(MentalStateFuser::with_defaults().unwrap()),
            Arc::new(ActionScorer::with_defaults()),
        )
    }

    fn snapshot(timestamp: f64) -> Snapshot {
        Snapshot::new(timestamp, "player", Position::default(), 0.0, 0.9)
            .with_cell(CellInfo::named("Whiterun"))
            .with_entity(Entity::npc(
                "bandit",
                Position::planar(8.0, 0.0),
                NpcState::enemy(1.0).with_los(true),
            ))
    }

    fn candidates() -> Vec<Action> {
        vec![
            Action::new(ActionType::Attack).with_target("bandit"),
            Action::new(ActionType::Flee),
        ]
    }

    #[test]
    fn test_collaborator_budget_within_cycle_budget() {
        let config = CycleConfig::default();
        assert!(config.collaborator_budget() < config.latency_budget());

        let tight = CycleConfig {
            latency_budget_ms: 20,
            ..Default::default()
        };
        assert_eq!(tight.collaborator_budget(), Duration::from_millis(20));
    }

    #[test]
    fn test_tick_activates_state() {
        let mut cycle = cycle();
        let person = Person::new("Dragonborn", "player");
        let candidates = candidates();

        let output = cycle
            .tick(&person, &snapshot(1.0), CycleInputs::new(&candidates))
            .unwrap();

        assert_eq!(cycle.mental_state().update_count(), 1);
        assert!(!output.selection.fallback_used);
        assert_eq!(output.surprise, 0.0);
        assert_eq!(output.features.num_enemies_total, 1);
        assert!(cycle.last_action().is_some());
    }

    #[test]
    fn test_second_tick_reports_surprise_and_record() {
        let sink = MemorySink::new();
        let mut cycle = cycle().with_sink(Box::new(sink.clone()));
        let person = Person::new("Dragonborn", "player");
        let candidates = candidates();

        cycle
            .tick(&person, &snapshot(1.0), CycleInputs::new(&candidates))
            .unwrap();
        assert!(sink.is_empty());

        let output = cycle
            .tick(&person, &snapshot(2.0), CycleInputs::new(&candidates))
            .unwrap();
        assert!(output.surprise > 0.0);
        assert_eq!(output.mental_state.affect.surprise, output.surprise);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].timestamp, 1.0);
    }

    #[test]
    fn test_bad_candidate_params_do_not_terminate() {
        let mut cycle = cycle();
        let person = Person::new("Dragonborn", "player");
        let reckless = vec![Action::new(ActionType::Explore).with_magnitude(f32::NAN)];

        cycle
            .tick(&person, &snapshot(1.0), CycleInputs::new(&reckless))
            .unwrap();

        let waiting = vec![Action::new(ActionType::Wait)];
        let output = cycle
            .tick(&person, &snapshot(2.0), CycleInputs::new(&waiting))
            .unwrap();
        assert!(output.surprise.is_finite());
        assert!(!cycle.is_terminal());
    }

    #[test]
    fn test_out_of_order_snapshot_leaves_state() {
        let mut cycle = cycle();
        let person = Person::new("Dragonborn", "player");
        let candidates = candidates();

        cycle
            .tick(&person, &snapshot(2.0), CycleInputs::new(&candidates))
            .unwrap();
        let err = cycle
            .tick(&person, &snapshot(1.0), CycleInputs::new(&candidates))
            .unwrap_err();

        assert!(matches!(err, DecisionError::Snapshot(_)));
        assert!(!cycle.is_terminal());
        assert_eq!(cycle.mental_state().update_count(), 1);
    }

    #[test]
    fn test_cell_change_resets_latent() {
        let mut cycle = cycle();
        let person = Person::new("Dragonborn", "player");
        let candidates = candidates();

        cycle
            .tick(&person, &snapshot(1.0), CycleInputs::new(&candidates))
            .unwrap();
        let moved = Snapshot::new(2.0, "player", Position::default(), 0.0, 0.9)
            .with_cell(CellInfo::named("Dragonsreach"));
        let output = cycle
            .tick(&person, &moved, CycleInputs::new(&candidates))
            .unwrap();

        assert!(output.reset);
        assert_eq!(output.surprise, 0.0);
    }

    #[test]
    fn test_corrupted_person_terminates_agent() {
        let mut cycle = cycle();
        let broken = Person::new("Broken", "player")
            .with_traits(TraitProfile::default().with(TraitKind::Aggression, f32::INFINITY));
        let candidates = candidates();

        let err = cycle
            .tick(&broken, &snapshot(1.0), CycleInputs::new(&candidates))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(cycle.is_terminal());

        let healthy = Person::new("Dragonborn", "player");
        assert!(matches!(
            cycle.tick(&healthy, &snapshot(2.0), CycleInputs::new(&candidates)),
            Err(DecisionError::AgentTerminated(_))
        ));
    }

    #[test]
    fn test_wrong_visual_length_degrades() {
        let mut cycle = cycle();
        let person = Person::new("Dragonborn", "player");
        let candidates = candidates();
        let visual = [0.5; 3];

        let output = cycle
            .tick(
                &person,
                &snapshot(1.0),
                CycleInputs::new(&candidates).with_visual(&visual),
            )
            .unwrap();
        assert!(!cycle.is_terminal());
        assert!(output.mental_state.affect.confidence < 1.0);
    }

    #[test]
    fn test_empty_candidates_use_fallback() {
        let mut cycle = cycle();
        let person = Person::new("Dragonborn", "player");

        let output = cycle
            .tick(&person, &snapshot(1.0), CycleInputs::new(&[]))
            .unwrap();
        assert!(output.selection.fallback_used);
        assert_eq!(output.action().action_type(), ActionType::Wait);
    }
}
