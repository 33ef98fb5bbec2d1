//! # eagleplay-replayer
//!
//! High-level Amiga song player built on the `eagleplay-ipc` bridge.
//!
//! The bridge speaks a record-level protocol; this crate wraps it in
//! the player surface a host application wants:
//!
//! - **Song loading**: upload score and module data, collect the
//!   worker's admission verdict and metadata
//! - **Playback control**: play, pause, stop, subsong switching
//! - **Audio rendering**: fill interleaved stereo i16 buffers on demand
//!
//! ## Example
//!
//! ```rust,ignore
//! use eagleplay_replayer::Replayer;
//! use eagleplay_common::SongPlayer;
//!
//! let mut player = Replayer::new(core)?;
//! let meta = player.load_song("mod.theme", &score, Some(&module))?;
//! println!("{} ({} subsongs)", meta.format, meta.subsongs.count());
//!
//! player.play();
//! let mut buffer = vec![0i16; 2048];
//! player.generate_samples_into(&mut buffer);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod replayer;

pub use error::{ReplayerError, Result};
pub use replayer::Replayer;
