//! Append-only training records.
//!
//! Each cycle opens a record for the action it chose; the next cycle closes it with the
//! observed outcome and hands it to a sink. Sinks never fail a cycle.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tactical_core::TacticalFeatures;

use crate::action::{ActionParams, ActionType};
use crate::error::{DecisionError, Result};
use crate::mental_state::{AffectSlice, SelfFeatures};
use crate::person::PersonId;

/// One transition: what was seen, what was done, what followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub agent: PersonId,
    pub timestamp: f64,
    pub tactical_features: TacticalFeatures,
    pub visual_embedding: Option<Vec<f32>>,
    pub self_features: SelfFeatures,
    pub action_type: ActionType,
    pub action_params: ActionParams,
    /// Change in appraised value minus change in threat.
    pub reward_proxy: f32,
    pub next_tactical_features: TacticalFeatures,
    pub next_visual_embedding: Option<Vec<f32>>,
    pub success: bool,
}

/// A record waiting for its outcome.
#[derive(Debug, Clone)]
pub(crate) struct PendingRecord {
    pub agent: PersonId,
    pub timestamp: f64,
    pub tactical_features: TacticalFeatures,
    pub visual_embedding: Option<Vec<f32>>,
    pub self_features: SelfFeatures,
    pub action_type: ActionType,
    pub action_params: ActionParams,
    pub affect: AffectSlice,
}

impl PendingRecord {
    pub fn close(
        self,
        next_tactical_features: TacticalFeatures,
        next_visual_embedding: Option<Vec<f32>>,
        next_affect: &AffectSlice,
    ) -> TrainingRecord {
        let reward_proxy = reward_proxy(&self.affect, next_affect);
        TrainingRecord {
            agent: self.agent,
            timestamp: self.timestamp,
            tactical_features: self.tactical_features,
            visual_embedding: self.visual_embedding,
            self_features: self.self_features,
            action_type: self.action_type,
            action_params: self.action_params,
            reward_proxy,
            next_tactical_features,
            next_visual_embedding,
            success: reward_proxy >= 0.0,
        }
    }
}

/// `(value' - value) - (threat' - threat)`.
pub fn reward_proxy(before: &AffectSlice, after: &AffectSlice) -> f32 {
    (after.value - before.value) - (after.threat - before.threat)
}

/// Destination for closed training records.
pub trait TrainingSink: Send {
    fn append(&mut self, record: &TrainingRecord) -> Result<()>;
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Open (or create) a log file for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> TrainingSink for JsonLinesSink<W> {
    fn append(&mut self, record: &TrainingRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory behind a shared handle.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TrainingRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TrainingRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrainingSink for MemorySink {
    fn append(&mut self, record: &TrainingRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| DecisionError::TaskFailed("training sink lock poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}
