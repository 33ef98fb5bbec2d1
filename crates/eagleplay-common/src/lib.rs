//! Common traits and types for Amiga exotic-format music replayers.
//!
//! This crate provides the shared abstractions used by the eagleplay
//! frontend and any host embedding it (CLI players, game engines, web
//! bridges).
//!
//! # Traits
//!
//! - [`SongPlayer`] - Object-safe playback interface
//! - [`MetadataFields`] - Metadata access (title, format, subsongs)
//!
//! # Example
//!
//! ```ignore
//! use eagleplay_common::{PlaybackState, SongPlayer};
//!
//! fn play_any(player: &mut dyn SongPlayer) {
//!     player.play();
//!     let mut buffer = vec![0i16; 4096];
//!     while player.state() == PlaybackState::Playing {
//!         player.generate_samples_into(&mut buffer);
//!         // ... hand buffer to the audio device
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod metadata;
mod player;

pub use metadata::{MetadataFields, SongMetadata, SubsongRange};
pub use player::{PlaybackState, SongPlayer};

/// Standard audio sample rate (44.1 kHz CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// PAL vertical blank rate (50 Hz) - the native tick rate of most
/// Amiga players.
pub const FRAME_RATE_PAL: u32 = 50;

/// NTSC vertical blank rate (60 Hz).
pub const FRAME_RATE_NTSC: u32 = 60;

/// Paula master clock on a PAL Amiga, in Hz.
pub const PAULA_CLOCK_PAL: u32 = 3_546_895;

/// Number of hardware audio voices on the Amiga.
pub const PAULA_VOICES: usize = 4;

/// Bytes per interleaved stereo 16-bit frame.
pub const BYTES_PER_FRAME: usize = 4;
