//! Error definitions for the synchronization core

use thiserror::Error;

/// Errors raised by the attribute store, the pending input queue and the coordinator
///
/// The `Unknown*` variants are contract violations: the caller used a name
/// outside the vocabulary agreed at construction. They are not meant to be
/// recovered from at runtime.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Attribute name is not part of the vocabulary
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Command name is not part of the vocabulary
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Pending input slot does not exist
    #[error("Unknown input slot: {0}")]
    UnknownSlot(String),

    /// The consumer thread could not be started
    #[error("Failed to start coordinator thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}
