//! Error types for the IPC bridge.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, IpcError>;

/// Errors that can occur while driving the bridge.
///
/// `ChannelFull` and `ChannelEmpty` are recoverable and normally
/// handled inside the transport shim's retry loop; the remaining
/// variants surface to the frontend operation that triggered them.
#[derive(Debug, Error)]
pub enum IpcError {
    /// A producer attempted to write more than the available space.
    ///
    /// Command writes are all-or-nothing, so the channel contents are
    /// unchanged when this is returned.
    #[error("channel full: {needed} bytes needed, {available} available")]
    ChannelFull {
        /// Bytes the write required.
        needed: usize,
        /// Bytes of space available at the time of the write.
        available: usize,
    },

    /// A consumer attempted to read with nothing buffered.
    #[error("channel empty")]
    ChannelEmpty,

    /// The bounded retry loop exhausted its iteration cap without the
    /// worker producing data.
    #[error("protocol stall: no response after {iterations} worker steps")]
    ProtocolStall {
        /// Number of worker steps attempted before giving up.
        iterations: usize,
    },

    /// A phase received a message shape it did not expect.
    #[error("protocol violation: {detail}")]
    ProtocolViolation {
        /// Human-readable description including the offending phase.
        detail: String,
    },

    /// The worker core terminated; no further response data will come.
    #[error("worker terminated with status {status}")]
    WorkerTerminated {
        /// Exit status the core reported through the termination trap.
        status: i32,
    },

    /// An endpoint id with no ring channel or registered stream.
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(u32),

    /// Passthrough stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed emulation configuration record.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure reported by the worker core collaborator.
    #[error("worker core error: {0}")]
    Core(String),
}

impl IpcError {
    /// Build a `ProtocolViolation` with the offending phase named.
    pub(crate) fn violation(phase: impl std::fmt::Debug, detail: impl Into<String>) -> Self {
        IpcError::ProtocolViolation {
            detail: format!("{:?}: {}", phase, detail.into()),
        }
    }
}
