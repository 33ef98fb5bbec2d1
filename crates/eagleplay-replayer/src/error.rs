//! Error types for song loading and playback.

use eagleplay_ipc::IpcError;
use std::fmt;

/// Result type for replayer operations.
pub type Result<T> = std::result::Result<T, ReplayerError>;

/// Errors that can occur while loading and playing songs.
#[derive(Debug)]
pub enum ReplayerError {
    /// The worker refused to play the uploaded song
    Rejected {
        /// Reason reported by the worker
        reason: String,
    },

    /// No song has been loaded yet
    NotLoaded,

    /// Requested subsong is outside the admitted range
    InvalidSubsong {
        /// Requested subsong number
        requested: u32,
        /// Lowest valid subsong number
        min: u32,
        /// Highest valid subsong number
        max: u32,
    },

    /// The worker answered with a record the exchange does not allow
    UnexpectedReply(String),

    /// Failure in the underlying IPC bridge
    Bridge(IpcError),
}

impl fmt::Display for ReplayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "Song rejected: {reason}"),
            Self::NotLoaded => write!(f, "No song loaded"),
            Self::InvalidSubsong { requested, min, max } => {
                write!(f, "Invalid subsong {requested} (available: {min}-{max})")
            }
            Self::UnexpectedReply(detail) => write!(f, "Unexpected worker reply: {detail}"),
            Self::Bridge(err) => write!(f, "Bridge error: {err}"),
        }
    }
}

impl std::error::Error for ReplayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bridge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IpcError> for ReplayerError {
    fn from(err: IpcError) -> Self {
        Self::Bridge(err)
    }
}
