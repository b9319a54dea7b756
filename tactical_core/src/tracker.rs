//! Entity tracking across snapshots.
//!
//! The tracker upserts entities by id on every accepted snapshot and evicts entities that have
//! been absent for a configured number of consecutive snapshots. It keeps the previous table
//! untouched when a snapshot is rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::entities::{Entity, EntityId};
use crate::error::{Result, SnapshotError};
use crate::snapshot::{CellInfo, RawSnapshot, Snapshot};

/// Configuration for entity tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive snapshots an entity may be missing before it is evicted.
    pub eviction_after_missed: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            eviction_after_missed: 3,
        }
    }
}

/// An entity with its tracking bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub entity: Entity,
    pub first_seen: f64,
    pub last_seen: f64,
    /// Consecutive accepted snapshots this entity was absent from.
    pub missed: u32,
}

/// Ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub accepted: u64,
    pub rejected_malformed: u64,
    pub rejected_out_of_order: u64,
    pub evicted: u64,
}

/// Summary of an accepted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub timestamp: f64,
    pub upserted: usize,
    pub evicted: Vec<EntityId>,
    /// The snapshot moved the player into a different cell than the previous one.
    pub cell_changed: bool,
}

/// Maintains the current set of tracked entities.
#[derive(Debug, Clone, Default)]
pub struct EntityTracker {
    config: TrackerConfig,
    entities: BTreeMap<EntityId, TrackedEntity>,
    player_id: Option<EntityId>,
    cell: Option<CellInfo>,
    last_timestamp: Option<f64>,
    stats: TrackerStats,
}

impl EntityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Create a tracker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    /// Accept a validated snapshot.
    ///
    /// Rejects snapshots whose timestamp does not exceed the last accepted one; in that case
    /// the entity table and the watermark are left unchanged.
    pub fn ingest(&mut self, snapshot: &Snapshot) -> Result<IngestReport> {
        if let Some(last_accepted) = self.last_timestamp {
            if snapshot.timestamp <= last_accepted {
                self.stats.rejected_out_of_order += 1;
                debug!(
                    timestamp = snapshot.timestamp,
                    last_accepted, "rejecting out-of-order snapshot"
                );
                return Err(SnapshotError::OutOfOrder {
                    timestamp: snapshot.timestamp,
                    last_accepted,
                });
            }
        }

        let timestamp = snapshot.timestamp;
        let player = snapshot.player();

        // Exactly one player: drop the previous one if the bridge changed its id.
        if let Some(previous) = self.player_id.replace(player.id.clone()) {
            if previous != player.id {
                self.entities.remove(&previous);
            }
        }

        let cell_changed = match &self.cell {
            Some(previous) => previous.id != snapshot.cell.id,
            None => false,
        };
        self.cell = Some(snapshot.cell.clone());

        for tracked in self.entities.values_mut() {
            tracked.missed += 1;
        }

        let mut upserted = 0;
        for entity in snapshot.entities() {
            if entity.as_player().is_none() && entity.id == player.id {
                debug!(entity = %entity.id, "skipping entity that reuses the player id");
                continue;
            }
            let mut entity = entity.clone();
            if entity.distance_to_player.is_none() {
                entity.distance_to_player = Some(entity.position.distance(&player.position));
            }

            match self.entities.get_mut(&entity.id) {
                Some(tracked) => {
                    tracked.entity = entity;
                    tracked.last_seen = timestamp;
                    tracked.missed = 0;
                }
                None => {
                    self.entities.insert(
                        entity.id.clone(),
                        TrackedEntity {
                            entity,
                            first_seen: timestamp,
                            last_seen: timestamp,
                            missed: 0,
                        },
                    );
                }
            }
            upserted += 1;
        }

        let threshold = self.config.eviction_after_missed;
        let evicted: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, tracked)| tracked.missed >= threshold)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &evicted {
            self.entities.remove(id);
            debug!(entity = %id, "evicted stale entity");
        }

        self.stats.accepted += 1;
        self.stats.evicted += evicted.len() as u64;
        self.last_timestamp = Some(timestamp);

        Ok(IngestReport {
            timestamp,
            upserted,
            evicted,
            cell_changed,
        })
    }

    /// Validate and accept a raw snapshot.
    ///
    /// Malformed snapshots are counted and logged; the prior table is kept.
    pub fn ingest_raw(&mut self, raw: RawSnapshot) -> Result<IngestReport> {
        match Snapshot::from_raw(raw) {
            Ok(snapshot) => self.ingest(&snapshot),
            Err(err) => {
                self.stats.rejected_malformed += 1;
                warn!(error = %err, "rejecting malformed snapshot");
                Err(err)
            }
        }
    }

    /// Parse, validate and accept a JSON snapshot payload.
    pub fn ingest_json(&mut self, payload: &str) -> Result<IngestReport> {
        match serde_json::from_str::<RawSnapshot>(payload) {
            Ok(raw) => self.ingest_raw(raw),
            Err(err) => {
                self.stats.rejected_malformed += 1;
                warn!(error = %err, "rejecting unparseable snapshot");
                Err(err.into())
            }
        }
    }

    /// The tracked player entity, present after the first accepted snapshot.
    pub fn player(&self) -> Option<&Entity> {
        self.player_id
            .as_ref()
            .and_then(|id| self.entities.get(id))
            .map(|tracked| &tracked.entity)
    }

    pub fn get(&self, id: &EntityId) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    /// Iterate tracked entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().map(|tracked| &tracked.entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn cell(&self) -> Option<&CellInfo> {
        self.cell.as_ref()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Forget all entities and the timestamp watermark (session boundary). Counters survive.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.player_id = None;
        self.cell = None;
        self.last_timestamp = None;
    }
}
