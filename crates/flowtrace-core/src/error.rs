use crate::memory::MemorySlot;
use thiserror::Error;

/// Failures that abort a trace. Malformed replies and inference failures are
/// trace outcomes, not errors.
#[derive(Error, Debug)]
pub enum FlowTraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Memory slot not written yet: {0}")]
    MemoryNotFound(MemorySlot),
}

pub type Result<T> = std::result::Result<T, FlowTraceError>;
