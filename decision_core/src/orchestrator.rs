//! Runs many agents side by side.
//!
//! Every agent owns its cycle (tracker plus mental state). Per tick all agents read the same
//! `Arc<Snapshot>` and run concurrently on blocking tasks. A panicking agent is dropped, and a
//! terminated agent stays terminated; neither affects its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use tactical_core::Snapshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::action::Action;
use crate::config::AgentConfig;
use crate::cycle::{CycleInputs, CycleOutput, DecisionCycle};
use crate::error::{DecisionError, Result};
use crate::mental_state::{MentalStateExport, MentalStateFuser};
use crate::person::{Person, PersonId, PersonRegistry};
use crate::policy::ActionScorer;
use crate::training::TrainingSink;

/// Per-agent inputs for one orchestrated tick.
#[derive(Debug, Clone, Default)]
pub struct AgentInputs {
    pub candidates: Arc<Vec<Action>>,
    pub visual: Option<Arc<Vec<f32>>>,
}

impl AgentInputs {
    pub fn new(candidates: Vec<Action>) -> Self {
        Self {
            candidates: Arc::new(candidates),
            visual: None,
        }
    }

    pub fn with_visual(mut self, visual: Vec<f32>) -> Self {
        self.visual = Some(Arc::new(visual));
        self
    }
}

/// Owns the person registry and one decision cycle per registered agent.
pub struct Orchestrator {
    config: AgentConfig,
    registry: PersonRegistry,
    agents: BTreeMap<PersonId, DecisionCycle>,
    fuser: Arc<MentalStateFuser>,
    scorer: Arc<ActionScorer>,
}

impl Orchestrator {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let fuser = Arc::new(config.build_fuser()?);
        let scorer = Arc::new(config.build_scorer());
        Ok(Self {
            config,
            registry: PersonRegistry::new(),
            agents: BTreeMap::new(),
            fuser,
            scorer,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(AgentConfig::default())
    }

    pub fn registry(&self) -> &PersonRegistry {
        &self.registry
    }

    /// Profile edits take effect on the next tick.
    pub fn registry_mut(&mut self) -> &mut PersonRegistry {
        &mut self.registry
    }

    /// Register a person and give it a fresh pipeline.
    pub fn spawn_agent(&mut self, person: Person) -> Result<PersonId> {
        let id = self.registry.insert(person)?;
        let cycle = self
            .config
            .build_cycle(id, Arc::clone(&self.fuser), Arc::clone(&self.scorer));
        self.agents.insert(id, cycle);
        info!(agent = %id, "spawned agent");
        Ok(id)
    }

    /// Like [`Orchestrator::spawn_agent`], with a training-record sink.
    pub fn spawn_agent_with_sink(
        &mut self,
        person: Person,
        sink: Box<dyn TrainingSink>,
    ) -> Result<PersonId> {
        let id = self.spawn_agent(person)?;
        if let Some(cycle) = self.agents.remove(&id) {
            self.agents.insert(id, cycle.with_sink(sink));
        }
        Ok(id)
    }

    /// Drop an agent and its person record.
    pub fn remove_agent(&mut self, id: PersonId) -> Option<DecisionCycle> {
        self.registry.remove(id);
        self.agents.remove(&id)
    }

    pub fn agent(&self, id: PersonId) -> Option<&DecisionCycle> {
        self.agents.get(&id)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.agents.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn export(&self, id: PersonId) -> Result<MentalStateExport> {
        self.agents
            .get(&id)
            .map(DecisionCycle::export)
            .ok_or(DecisionError::AgentNotFound(id))
    }

    /// Session boundary for every agent.
    pub fn reset_all(&mut self) {
        for cycle in self.agents.values_mut() {
            cycle.reset();
        }
    }

    /// Run one cycle for every agent on the same snapshot.
    ///
    /// Agents without an entry in `inputs` get no candidates and fall back to the safe
    /// default. Results are keyed by agent; one agent's failure never hides another's output.
    pub async fn tick_all(
        &mut self,
        snapshot: Arc<Snapshot>,
        inputs: &BTreeMap<PersonId, AgentInputs>,
    ) -> BTreeMap<PersonId, Result<CycleOutput>> {
        let mut results = BTreeMap::new();
        let mut handles: Vec<(PersonId, JoinHandle<(DecisionCycle, Result<CycleOutput>)>)> =
            Vec::with_capacity(self.agents.len());

        for (id, mut cycle) in std::mem::take(&mut self.agents) {
            let person = match self.registry.shared(id) {
                Ok(person) => person,
                Err(err) => {
                    results.insert(id, Err(err));
                    self.agents.insert(id, cycle);
                    continue;
                }
            };
            let agent_inputs = inputs.get(&id).cloned().unwrap_or_default();
            let snapshot = Arc::clone(&snapshot);

            let handle = tokio::task::spawn_blocking(move || {
                let mut cycle_inputs = CycleInputs::new(&agent_inputs.candidates);
                if let Some(visual) = agent_inputs.visual.as_deref() {
                    cycle_inputs = cycle_inputs.with_visual(visual);
                }
                let result = cycle.tick(&person, &snapshot, cycle_inputs);
                (cycle, result)
            });
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            match handle.await {
                Ok((cycle, result)) => {
                    self.agents.insert(id, cycle);
                    results.insert(id, result);
                }
                Err(err) => {
                    warn!(agent = %id, error = %err, "agent task failed, removing agent");
                    self.registry.remove(id);
                    results.insert(id, Err(DecisionError::TaskFailed(err.to_string())));
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use tactical_core::Position;

    fn snapshot(timestamp: f64) -> Arc<Snapshot> {
        Arc::new(Snapshot::new(timestamp, "player", Position::default(), 0.0, 1.0))
    }

    #[tokio::test]
    async fn test_spawn_and_tick() {
        let mut orchestrator = Orchestrator::with_defaults().unwrap();
        let a = orchestrator.spawn_agent(Person::new("Dragonborn", "player")).unwrap();
        let b = orchestrator.spawn_agent(Person::new("Lydia", "lydia")).unwrap();

        let mut inputs = BTreeMap::new();
        inputs.insert(a, AgentInputs::new(vec![Action::new(ActionType::Explore)]));

        let results = orchestrator.tick_all(snapshot(1.0), &inputs).await;
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[&a].as_ref().unwrap().action().action_type(),
            ActionType::Explore
        );
        assert!(results[&b].as_ref().unwrap().selection.fallback_used);
        assert_eq!(orchestrator.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_profile_reported() {
        let mut orchestrator = Orchestrator::with_defaults().unwrap();
        let id = orchestrator.spawn_agent(Person::new("Lydia", "lydia")).unwrap();
        orchestrator.registry_mut().remove(id);

        let results = orchestrator.tick_all(snapshot(1.0), &BTreeMap::new()).await;
        assert!(matches!(results[&id], Err(DecisionError::AgentNotFound(_))));
        assert!(orchestrator.agent(id).is_some());
    }

    #[test]
    fn test_export_unknown_agent() {
        let orchestrator = Orchestrator::with_defaults().unwrap();
        assert!(matches!(
            orchestrator.export(PersonId::new()),
            Err(DecisionError::AgentNotFound(_))
        ));
    }
}
