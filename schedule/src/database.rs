//! Record database seen by the search.
//!
//! A database maps task keys to ranked tuning records. The search only needs
//! `top_k` with a stable cost-ascending order; persistence format is the
//! database's concern. Two implementations are provided: an in-memory store
//! for tests and ephemeral sessions, and a sled-backed store that survives
//! process restarts.

use std::collections::BTreeMap;

use kuzna_ir::ScheduleDescriptor;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::*;

/// One stored schedule for a task: descriptor bytes plus its cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningRecord {
    pub task_key: String,
    /// Descriptor byte form; decodes via [`TuningRecord::descriptor`].
    pub trace: Vec<u8>,
    /// Measured or predicted latency; lower is better.
    pub predicted_cost: f64,
}

impl TuningRecord {
    pub fn new(task_key: &str, descriptor: &ScheduleDescriptor, predicted_cost: f64) -> Result<Self> {
        let trace = descriptor.to_bytes().context(RecordCodecSnafu)?;
        Ok(Self { task_key: task_key.to_owned(), trace, predicted_cost })
    }

    /// Decode the stored descriptor.
    pub fn descriptor(&self) -> Result<ScheduleDescriptor> {
        ScheduleDescriptor::from_bytes(&self.trace).context(RecordCodecSnafu)
    }
}

/// Ranked record store consumed by the search.
pub trait Database {
    /// Up to `k` best records for the task, cost ascending; ties keep
    /// insertion order. `k == 0` yields an empty list.
    fn top_k(&self, task_key: &str, k: usize) -> Vec<TuningRecord>;

    /// Persist one record.
    fn add_record(&mut self, record: TuningRecord) -> Result<()>;

    /// Number of records stored for the task.
    fn count(&self, task_key: &str) -> usize;
}

/// In-memory database; per-task vectors kept sorted by cost.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    records: BTreeMap<String, Vec<TuningRecord>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemoryDatabase {
    fn top_k(&self, task_key: &str, k: usize) -> Vec<TuningRecord> {
        if k == 0 {
            return Vec::new();
        }
        self.records.get(task_key).map(|v| v.iter().take(k).cloned().collect()).unwrap_or_default()
    }

    fn add_record(&mut self, record: TuningRecord) -> Result<()> {
        let slot = self.records.entry(record.task_key.clone()).or_default();
        // Stable: a tie lands after the records already holding that cost.
        let at = slot.partition_point(|r| r.predicted_cost <= record.predicted_cost);
        slot.insert(at, record);
        Ok(())
    }

    fn count(&self, task_key: &str) -> usize {
        self.records.get(task_key).map_or(0, Vec::len)
    }
}

/// Order-preserving byte encoding of an `f64` cost: lexicographic key order
/// equals numeric order.
fn cost_key_bits(cost: f64) -> u64 {
    let bits = cost.to_bits();
    if bits >> 63 == 1 { !bits } else { bits | (1 << 63) }
}

fn record_key(task_key: &str, cost: f64, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(task_key.len() + 17);
    key.extend_from_slice(task_key.as_bytes());
    key.push(0);
    key.extend_from_slice(&cost_key_bits(cost).to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn scan_prefix(task_key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(task_key.len() + 1);
    prefix.extend_from_slice(task_key.as_bytes());
    prefix.push(0);
    prefix
}

/// Durable database on a sled tree.
///
/// Keys embed the cost in order-preserving form, so `top_k` is a prefix scan
/// with no sort; a monotonic id breaks cost ties by insertion order. Writes
/// flush eagerly so records survive crashes between sessions.
#[derive(Debug)]
pub struct SledDatabase {
    db: sled::Db,
}

impl SledDatabase {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| DatabaseOpenSnafu { message: e.to_string() }.build())?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| DatabaseWriteSnafu { message: e.to_string() }.build())?;
        Ok(())
    }
}

impl Database for SledDatabase {
    fn top_k(&self, task_key: &str, k: usize) -> Vec<TuningRecord> {
        if k == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(k);
        for item in self.db.scan_prefix(scan_prefix(task_key)) {
            if out.len() == k {
                break;
            }
            let value = match item {
                Ok((_, value)) => value,
                Err(e) => {
                    tracing::warn!(task_key, error = %e, "record scan failed; stopping early");
                    break;
                }
            };
            match bincode::deserialize::<TuningRecord>(&value) {
                Ok(record) => out.push(record),
                Err(e) => tracing::warn!(task_key, error = %e, "undecodable record skipped"),
            }
        }
        out
    }

    fn add_record(&mut self, record: TuningRecord) -> Result<()> {
        let seq = self.db.generate_id().map_err(|e| DatabaseWriteSnafu { message: e.to_string() }.build())?;
        let key = record_key(&record.task_key, record.predicted_cost, seq);
        let value =
            bincode::serialize(&record).map_err(|e| DatabaseWriteSnafu { message: e.to_string() }.build())?;
        self.db.insert(key, value).map_err(|e| DatabaseWriteSnafu { message: e.to_string() }.build())?;
        self.flush()
    }

    fn count(&self, task_key: &str) -> usize {
        self.db.scan_prefix(scan_prefix(task_key)).count()
    }
}
