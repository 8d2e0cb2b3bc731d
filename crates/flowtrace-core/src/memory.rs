// ABOUTME: Two-slot trace memory: the recorded step sequence and the retrieved function corpus.
// ABOUTME: Every write replaces the slot; reading a slot that was never written is NotFound.

use crate::{FlowTraceError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which of the two stores an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySlot {
    Steps,
    Impls,
}

impl fmt::Display for MemorySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySlot::Steps => write!(f, "steps"),
            MemorySlot::Impls => write!(f, "function implementations"),
        }
    }
}

/// Durable state of one in-flight trace.
///
/// The step slot holds the serialized step sequence, the impl slot holds free
/// text. Each slot is a single value, not a log.
pub trait TraceMemory: Send + Sync {
    fn read_steps(&self) -> Result<String>;
    fn write_steps(&self, content: &str) -> Result<()>;
    fn read_impls(&self) -> Result<String>;
    fn write_impls(&self, content: &str) -> Result<()>;
}

/// File-backed memory, one file per slot, addressed by flow id.
#[derive(Debug, Clone)]
pub struct FileTraceMemory {
    steps_path: PathBuf,
    impls_path: PathBuf,
}

impl FileTraceMemory {
    /// Memory files for `flow_id` inside `dir`. Distinct flow ids never share files.
    pub fn new(dir: impl AsRef<Path>, flow_id: u32) -> Self {
        let dir = dir.as_ref();
        Self {
            steps_path: dir.join(format!("memory_data_flow_{}.json", flow_id)),
            impls_path: dir.join(format!("memory_func_impl_{}.txt", flow_id)),
        }
    }

    pub fn steps_path(&self) -> &Path {
        &self.steps_path
    }

    pub fn impls_path(&self) -> &Path {
        &self.impls_path
    }

    /// Delete both backing files. Missing files are not an error.
    pub fn cleanup(&self) -> Result<()> {
        for path in [&self.steps_path, &self.impls_path] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed trace memory file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(FlowTraceError::Io(e)),
            }
        }
        Ok(())
    }

    fn read_slot(path: &Path, slot: MemorySlot) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FlowTraceError::MemoryNotFound(slot),
            _ => FlowTraceError::Io(e),
        })
    }

    fn write_slot(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl TraceMemory for FileTraceMemory {
    fn read_steps(&self) -> Result<String> {
        Self::read_slot(&self.steps_path, MemorySlot::Steps)
    }

    fn write_steps(&self, content: &str) -> Result<()> {
        Self::write_slot(&self.steps_path, content)
    }

    fn read_impls(&self) -> Result<String> {
        Self::read_slot(&self.impls_path, MemorySlot::Impls)
    }

    fn write_impls(&self, content: &str) -> Result<()> {
        Self::write_slot(&self.impls_path, content)
    }
}

/// Process-local memory, for tests and for callers that do not need durability.
#[derive(Debug, Default)]
pub struct InMemoryTraceMemory {
    steps: RwLock<Option<String>>,
    impls: RwLock<Option<String>>,
}

impl InMemoryTraceMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceMemory for InMemoryTraceMemory {
    fn read_steps(&self) -> Result<String> {
        self.steps
            .read()
            .clone()
            .ok_or(FlowTraceError::MemoryNotFound(MemorySlot::Steps))
    }

    fn write_steps(&self, content: &str) -> Result<()> {
        *self.steps.write() = Some(content.to_string());
        Ok(())
    }

    fn read_impls(&self) -> Result<String> {
        self.impls
            .read()
            .clone()
            .ok_or(FlowTraceError::MemoryNotFound(MemorySlot::Impls))
    }

    fn write_impls(&self, content: &str) -> Result<()> {
        *self.impls.write() = Some(content.to_string());
        Ok(())
    }
}
