//! # eagleplay-ipc
//!
//! Single-process bridge between an Amiga music frontend and its 68k
//! worker core.
//!
//! Natively the player runs as two processes: a frontend that owns the
//! UI and audio device, and a worker that boots a 68k environment to
//! run the original player code, the two joined by a socket pair. This
//! crate collapses that arrangement into one single-threaded process:
//!
//! - **Ring channels** ([`ring`]): one bounded byte ring per direction
//!   replaces the socket pair. Writes are all-or-nothing; reads never
//!   block.
//! - **Message codec** ([`message`]): tagged, length-prefixed records
//!   grouped into token-terminated exchanges.
//! - **Transport shim** ([`shim`]): the frontend's endpoint-addressed
//!   read/write surface. A read with nothing buffered steps the
//!   cooperative worker in a bounded loop instead of blocking.
//! - **Worker host** ([`worker`]): the worker main loop restructured as
//!   a phase state machine that is resumable one bounded step at a
//!   time, with a backpressure budget tracking the frontend's
//!   outstanding PCM request.
//! - **Termination trap** ([`trap`]): intercepts the worker's
//!   process-exit primitive and converts it into a control-flow event.
//!
//! ## Example
//!
//! ```rust,ignore
//! use eagleplay_ipc::{EmuConfig, Message, Tag, TransportShim, COMMAND_ENDPOINT};
//!
//! let mut shim = TransportShim::new(core)?;
//! let mut exchange = Vec::new();
//! Message::new(Tag::Config, EmuConfig::default().to_payload()?).encode_into(&mut exchange);
//! Message::token().encode_into(&mut exchange);
//! shim.write_to_endpoint(COMMAND_ENDPOINT, &exchange)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod message;
pub mod ring;
pub mod shim;
pub mod trap;
pub mod worker;

pub use config::EmuConfig;
pub use error::{IpcError, Result};
pub use message::{Message, Tag, HEADER_LEN, MAX_PAYLOAD};
pub use ring::{channel_pair, ChannelConsumer, ChannelProducer, RingChannel, DEFAULT_CAPACITY};
pub use shim::{ByteStream, TransportShim, COMMAND_ENDPOINT, MAX_DRIVE_ITERATIONS, RESPONSE_ENDPOINT};
pub use trap::{ExitOutcome, ExitSignal, ExitTrap};
pub use worker::{
    Admission, CoreIo, Phase, RuntimeOption, SongBundle, StepOutcome, WorkerCore, WorkerHost,
};
