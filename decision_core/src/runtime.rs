//! Async driver for one agent.
//!
//! Wraps a [`DecisionCycle`] with the concerns of a live game: a visual collaborator that may
//! be slow or down, a per-cycle latency budget, and a snapshot feed that can outrun the
//! agent. The newest snapshot always wins: a cycle that finishes after a fresher snapshot
//! arrived has its output discarded and the agent immediately starts over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tactical_core::Snapshot;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::action::Action;
use crate::cycle::{CycleInputs, CycleOutput, DecisionCycle};
use crate::error::{DecisionError, Result};
use crate::person::{Person, PersonId};

/// Bounded exponential backoff for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 5,
            max_delay_ms: 40,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Delay before retry number `attempt + 1` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(clamped as u64)
    }
}

/// Supplier of frame embeddings.
#[async_trait]
pub trait VisualSource: Send + Sync {
    /// Embedding of the frame closest to `timestamp`.
    async fn embedding(&self, timestamp: f64) -> Result<Vec<f32>>;
}

/// Call `source` with a per-attempt timeout and backoff, giving up at `deadline`.
pub async fn fetch_with_retry(
    source: &dyn VisualSource,
    timestamp: f64,
    attempt_timeout: Duration,
    policy: &RetryPolicy,
    deadline: Instant,
) -> Result<Vec<f32>> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 0..attempts {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(attempt_timeout.min(remaining), source.embedding(timestamp)).await {
            Ok(Ok(embedding)) => return Ok(embedding),
            Ok(Err(err)) => debug!(attempt, error = %err, "visual source failed"),
            Err(_) => debug!(attempt, "visual source timed out"),
        }

        if attempt + 1 < attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(policy.delay_for_attempt(attempt).min(remaining)).await;
        }
    }

    Err(DecisionError::CollaboratorUnavailable(format!(
        "visual source gave no embedding for t={timestamp} within {attempts} attempts"
    )))
}

/// One unit of work on the snapshot feed.
#[derive(Debug, Clone)]
pub struct Tick {
    pub snapshot: Arc<Snapshot>,
    pub candidates: Arc<Vec<Action>>,
    pub now: Option<f64>,
}

impl Tick {
    pub fn new(snapshot: Arc<Snapshot>, candidates: Arc<Vec<Action>>) -> Self {
        Self {
            snapshot,
            candidates,
            now: None,
        }
    }
}

/// How the published action came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Selected by this cycle.
    Fresh,
    /// This cycle ran but every candidate was vetoed.
    Fallback,
    /// The previous action, because the cycle failed softly or ran over budget.
    Reused,
}

/// What the runtime publishes for each completed tick.
#[derive(Debug, Clone)]
pub struct Decision {
    pub agent: PersonId,
    pub timestamp: f64,
    pub action: Action,
    pub source: DecisionSource,
    /// The visual embedding was replaced by the last known good one (or dropped).
    pub visual_degraded: bool,
    pub output: Option<CycleOutput>,
}

/// Drives one agent's cycle from async code.
pub struct AgentRuntime {
    agent: PersonId,
    person: Arc<Person>,
    cycle: Option<DecisionCycle>,
    visual: Option<Arc<dyn VisualSource>>,
    last_visual: Option<Vec<f32>>,
    fallback: Action,
}

impl AgentRuntime {
    pub fn new(person: Arc<Person>, cycle: DecisionCycle) -> Self {
        let fallback = cycle.reusable_action();
        Self {
            agent: cycle.agent(),
            person,
            cycle: Some(cycle),
            visual: None,
            last_visual: None,
            fallback,
        }
    }

    pub fn with_visual_source(mut self, source: Arc<dyn VisualSource>) -> Self {
        self.visual = Some(source);
        self
    }

    pub fn agent(&self) -> PersonId {
        self.agent
    }

    /// Swap in an updated profile; takes effect on the next tick.
    pub fn set_person(&mut self, person: Arc<Person>) {
        self.person = person;
    }

    /// The cycle, unless a previous tick lost it to a panic.
    pub fn cycle(&self) -> Option<&DecisionCycle> {
        self.cycle.as_ref()
    }

    /// Run one tick: fetch the visual input within the collaborator budget, then run the cycle.
    ///
    /// Soft failures (rejected snapshot, collaborator outage, cycle over budget) still produce
    /// a decision. An outage alone only degrades the input; the previous action is reused
    /// when the cycle itself overruns the latency budget. Fatal errors are returned and end
    /// the agent.
    pub async fn step(&mut self, tick: Tick) -> Result<Decision> {
        let Some(cycle) = self.cycle.as_ref() else {
            return Err(DecisionError::AgentTerminated(self.agent));
        };
        let config = cycle.config().clone();
        let deadline = Instant::now() + config.collaborator_budget();

        let mut visual_degraded = false;
        let visual = match &self.visual {
            Some(source) => {
                match fetch_with_retry(
                    source.as_ref(),
                    tick.snapshot.timestamp,
                    config.collaborator_timeout(),
                    &config.retry,
                    deadline,
                )
                .await
                {
                    Ok(embedding) => {
                        self.last_visual = Some(embedding.clone());
                        Some(embedding)
                    }
                    Err(err) => {
                        warn!(agent = %self.agent, error = %err, "using last known good visual input");
                        visual_degraded = true;
                        self.last_visual.clone()
                    }
                }
            }
            None => None,
        };

        let Some(mut cycle) = self.cycle.take() else {
            return Err(DecisionError::AgentTerminated(self.agent));
        };
        let person = Arc::clone(&self.person);
        let snapshot = Arc::clone(&tick.snapshot);
        let candidates = Arc::clone(&tick.candidates);
        let now = tick.now;

        let joined = tokio::task::spawn_blocking(move || {
            let mut inputs = CycleInputs::new(&candidates);
            if let Some(embedding) = visual.as_deref() {
                inputs = inputs.with_visual(embedding);
            }
            if let Some(now) = now {
                inputs = inputs.at(now);
            }
            let result = cycle.tick(&person, &snapshot, inputs);
            (cycle, result)
        })
        .await;

        let (cycle, result) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                warn!(agent = %self.agent, error = %err, "decision cycle task failed");
                return Err(DecisionError::TaskFailed(err.to_string()));
            }
        };
        let reusable = cycle.reusable_action();
        self.cycle = Some(cycle);

        let output = match result {
            Ok(output) => output,
            Err(err) if err.is_fatal() || matches!(err, DecisionError::AgentTerminated(_)) => {
                return Err(err);
            }
            Err(err) => {
                debug!(agent = %self.agent, error = %err, "cycle skipped, reusing last action");
                return Ok(self.reuse(tick.snapshot.timestamp, visual_degraded, None));
            }
        };

        if output.over_budget {
            // The mental state still advanced; only the published action is held back.
            return Ok(self.reuse(tick.snapshot.timestamp, visual_degraded, Some(output)));
        }

        self.fallback = reusable.clone();
        let source = if output.selection.fallback_used {
            DecisionSource::Fallback
        } else {
            DecisionSource::Fresh
        };
        Ok(Decision {
            agent: self.agent,
            timestamp: output.timestamp,
            action: reusable,
            source,
            visual_degraded,
            output: Some(output),
        })
    }

    fn reuse(&self, timestamp: f64, visual_degraded: bool, output: Option<CycleOutput>) -> Decision {
        Decision {
            agent: self.agent,
            timestamp,
            action: self.fallback.clone(),
            source: DecisionSource::Reused,
            visual_degraded,
            output,
        }
    }

    /// Consume ticks until the feed closes or the agent hits a fatal error.
    ///
    /// If a newer tick arrived while a cycle was running, that cycle's decision is dropped
    /// and the newer tick is processed right away.
    pub async fn run(
        mut self,
        mut feed: watch::Receiver<Option<Tick>>,
        decisions: mpsc::Sender<Decision>,
    ) -> Result<()> {
        loop {
            if feed.changed().await.is_err() {
                debug!(agent = %self.agent, "snapshot feed closed");
                return Ok(());
            }
            let Some(tick) = feed.borrow_and_update().clone() else {
                continue;
            };

            let decision = match self.step(tick).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(agent = %self.agent, error = %err, "agent stopped");
                    return Err(err);
                }
            };

            if feed.has_changed().unwrap_or(false) {
                debug!(
                    agent = %self.agent,
                    timestamp = decision.timestamp,
                    "newer snapshot arrived, discarding decision"
                );
                continue;
            }

            if decisions.send(decision).await.is_err() {
                debug!(agent = %self.agent, "decision receiver dropped");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::mental_state::MentalStateFuser;
    use crate::policy::ActionScorer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tactical_core::Position;

    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
        dim: usize,
    }

    #[async_trait]
    impl VisualSource for FlakySource {
        async fn embedding(&self, _timestamp: f64) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DecisionError::CollaboratorUnavailable("camera offline".into()))
            } else {
                Ok(vec![0.1; self.dim])
            }
        }
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let source = FlakySource {
            failures: 2,
            calls: AtomicUsize::new(0),
            dim: 4,
        };
        let deadline = Instant::now() + Duration::from_secs(1);
        let embedding = fetch_with_retry(
            &source,
            1.0,
            Duration::from_millis(50),
            &RetryPolicy::default(),
            deadline,
        )
        .await
        .unwrap();
        assert_eq!(embedding.len(), 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let source = FlakySource {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            dim: 4,
        };
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = fetch_with_retry(
            &source,
            1.0,
            Duration::from_millis(50),
            &RetryPolicy::default().with_max_attempts(2),
            deadline,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DecisionError::CollaboratorUnavailable(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_step_degrades_without_visual() {
        let fuser = Arc::new(MentalStateFuser::with_defaults().unwrap());
        let person = Arc::new(Person::new("Dragonborn", "player"));
        let cycle = DecisionCycle::new(person.id, fuser, Arc::new(ActionScorer::with_defaults()));
        let source = Arc::new(FlakySource {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            dim: 32,
        });
        let mut runtime = AgentRuntime::new(person, cycle).with_visual_source(source);

        let snapshot = Arc::new(Snapshot::new(1.0, "player", Position::default(), 0.0, 1.0));
        let candidates = Arc::new(vec![Action::new(ActionType::Explore)]);
        let decision = runtime.step(Tick::new(snapshot, candidates)).await.unwrap();

        assert!(decision.visual_degraded);
        assert_eq!(decision.source, DecisionSource::Fresh);
        assert_eq!(decision.action.action_type(), ActionType::Explore);
    }

    #[tokio::test]
    async fn test_rejected_snapshot_reuses_last_action() {
        let fuser = Arc::new(MentalStateFuser::with_defaults().unwrap());
        let person = Arc::new(Person::new("Dragonborn", "player"));
        let cycle = DecisionCycle::new(person.id, fuser, Arc::new(ActionScorer::with_defaults()));
        let mut runtime = AgentRuntime::new(person, cycle);
        let candidates = Arc::new(vec![Action::new(ActionType::Explore)]);

        let fresh = Arc::new(Snapshot::new(2.0, "player", Position::default(), 0.0, 1.0));
        runtime
            .step(Tick::new(fresh, Arc::clone(&candidates)))
            .await
            .unwrap();

        let stale = Arc::new(Snapshot::new(1.0, "player", Position::default(), 0.0, 1.0));
        let decision = runtime.step(Tick::new(stale, candidates)).await.unwrap();
        assert_eq!(decision.source, DecisionSource::Reused);
        assert_eq!(decision.action.action_type(), ActionType::Explore);
        assert!(decision.output.is_none());
    }
}
