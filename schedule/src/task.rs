//! Tuning tasks and the task registry.
//!
//! The registry is an explicit handle, not hidden global state: task
//! registration completes before any search session starts, the registry is
//! read-only while sessions run, and no session outlives it. A [`TuneTask`]
//! captures its module handle at construction, so the search core itself
//! never consults the registry again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kuzna_ir::Module;
use parking_lot::RwLock;

use crate::error::*;

/// Hardware the schedule is tuned for. Sketch rules consult this to decide
/// between CPU-style parallelization and GPU thread binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Cpu { num_cores: usize },
    Gpu { max_threads_per_block: usize },
}

impl Target {
    /// A conventional multi-core host target.
    pub fn host() -> Self {
        Self::Cpu { num_cores: 16 }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu { .. })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu { num_cores } => write!(f, "cpu(cores={num_cores})"),
            Self::Gpu { max_threads_per_block } => write!(f, "gpu(threads={max_threads_per_block})"),
        }
    }
}

/// Immutable description of one tuning task.
///
/// Cheap to clone: the module is shared behind an `Arc` and never mutated
/// (schedules deep-copy it before transforming).
#[derive(Debug, Clone)]
pub struct TuneTask {
    serialized_key: String,
    module: Arc<Module>,
    target: Target,
    metadata: Option<String>,
}

impl TuneTask {
    /// Resolve a registered task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` when the key was never registered.
    pub fn new(registry: &TaskRegistry, task_key: &str, target: Target) -> Result<Self> {
        let module = registry.get(task_key)?;
        Ok(Self { serialized_key: task_key.to_owned(), module, target, metadata: None })
    }

    pub fn with_metadata(mut self, metadata: &str) -> Self {
        self.metadata = Some(metadata.to_owned());
        self
    }

    pub fn key(&self) -> &str {
        &self.serialized_key
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }
}

/// Directory from task keys to base IR modules.
///
/// Many readers may share one registry across concurrent sessions; writes
/// happen only during task discovery.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    modules: RwLock<HashMap<String, Arc<Module>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the base module for a task key.
    pub fn register(&self, task_key: &str, module: Module) {
        self.modules.write().insert(task_key.to_owned(), Arc::new(module));
    }

    /// Shared handle to a registered base module.
    pub fn get(&self, task_key: &str) -> Result<Arc<Module>> {
        self.modules.read().get(task_key).cloned().ok_or_else(|| TaskNotFoundSnafu { task_key }.build())
    }

    pub fn contains(&self, task_key: &str) -> bool {
        self.modules.read().contains_key(task_key)
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}
