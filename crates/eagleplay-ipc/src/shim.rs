//! Endpoint-addressed transport shim.
//!
//! The frontend was written against a byte-stream transport addressed
//! by numeric endpoint ids, with one id per direction. The shim keeps
//! that surface: writes to the command endpoint land in the command
//! ring channel, reads from the response endpoint drain the response
//! ring channel. What changes is what happens when the response side
//! runs dry. Natively the read would block while the worker process
//! caught up; here the shim *is* the scheduler, so it steps the
//! cooperative worker in a bounded retry loop until data appears, the
//! worker reports quit, or the iteration cap trips.
//!
//! Endpoint ids other than the two bridge ids can be registered as
//! passthrough byte streams, so file-style traffic the frontend
//! performs over the same addressing scheme keeps working.

use crate::error::{IpcError, Result};
use crate::message::Message;
use crate::ring::{channel_pair, ChannelConsumer, ChannelProducer, DEFAULT_CAPACITY};
use crate::worker::{StepOutcome, WorkerCore, WorkerHost};
use std::collections::HashMap;
use std::io::{Read, Write};

/// Endpoint id for frontend → worker commands.
pub const COMMAND_ENDPOINT: u32 = 9001;

/// Endpoint id for worker → frontend responses.
pub const RESPONSE_ENDPOINT: u32 = 9002;

/// Cap on worker steps per read before declaring a stall.
///
/// A healthy worker satisfies a read request in far fewer slices; the
/// cap exists so a wedged core surfaces as an error instead of an
/// infinite loop.
pub const MAX_DRIVE_ITERATIONS: usize = 10_000;

/// Byte stream usable as a passthrough endpoint.
pub trait ByteStream: Read + Write {}

impl<T: Read + Write> ByteStream for T {}

/// Single-process stand-in for the two-process transport.
///
/// Owns both ring channels and the [`WorkerHost`]; all worker progress
/// happens inside the read path of this shim.
pub struct TransportShim<C> {
    cmd: ChannelProducer,
    rsp: ChannelConsumer,
    worker: WorkerHost<C>,
    passthrough: HashMap<u32, Box<dyn ByteStream>>,
}

impl<C: WorkerCore> TransportShim<C> {
    /// Build a shim around `core` with default channel capacities.
    pub fn new(core: C) -> Result<Self> {
        Self::with_capacity(core, DEFAULT_CAPACITY)
    }

    /// Build a shim with explicit per-direction channel capacity.
    pub fn with_capacity(core: C, capacity: usize) -> Result<Self> {
        let (cmd_tx, cmd_rx) = channel_pair(capacity)?;
        let (rsp_tx, rsp_rx) = channel_pair(capacity)?;
        Ok(TransportShim {
            cmd: cmd_tx,
            rsp: rsp_rx,
            worker: WorkerHost::new(core, cmd_rx, rsp_tx),
            passthrough: HashMap::new(),
        })
    }

    /// Register a passthrough byte stream under an endpoint id.
    ///
    /// The bridge endpoint ids are reserved.
    pub fn register_stream(&mut self, endpoint: u32, stream: Box<dyn ByteStream>) -> Result<()> {
        if endpoint == COMMAND_ENDPOINT || endpoint == RESPONSE_ENDPOINT {
            return Err(IpcError::Config(format!(
                "endpoint {endpoint} is reserved for the bridge"
            )));
        }
        self.passthrough.insert(endpoint, stream);
        Ok(())
    }

    /// Access the worker host, e.g. for phase inspection.
    pub fn worker(&self) -> &WorkerHost<C> {
        &self.worker
    }

    /// Write bytes to an endpoint.
    ///
    /// The command endpoint takes the whole buffer or fails; callers
    /// batch whole records per call so the worker never observes a
    /// partial one. A successful push is followed by exactly one
    /// worker step: in the synchronous model, writing a command is
    /// the trigger for the worker to act on it. If the channel is
    /// full, buffered commands are drained by stepping the worker
    /// before retrying.
    pub fn write_to_endpoint(&mut self, endpoint: u32, data: &[u8]) -> Result<usize> {
        if endpoint == COMMAND_ENDPOINT {
            let mut iterations = 0;
            loop {
                match self.cmd.push(data) {
                    Ok(()) => {
                        if self.worker.step()? == StepOutcome::Quit {
                            return Err(self.terminated());
                        }
                        return Ok(data.len());
                    }
                    Err(IpcError::ChannelFull { .. }) => {
                        iterations += 1;
                        if iterations > MAX_DRIVE_ITERATIONS {
                            return Err(IpcError::ProtocolStall { iterations });
                        }
                        match self.worker.step()? {
                            StepOutcome::Quit => {
                                return Err(self.terminated());
                            }
                            StepOutcome::Idle => {
                                // Worker wants input it cannot get while
                                // the command buffer will not fit; the
                                // exchange is oversized for the channel.
                                return self.cmd.push(data).map(|()| data.len());
                            }
                            StepOutcome::Progress => {}
                        }
                    }
                    Err(other) => return Err(other),
                }
            }
        }
        if endpoint == RESPONSE_ENDPOINT {
            return Err(IpcError::violation(
                "transport",
                "response endpoint is read-only for the frontend",
            ));
        }

        let stream = self
            .passthrough
            .get_mut(&endpoint)
            .ok_or(IpcError::UnknownEndpoint(endpoint))?;
        stream.write_all(data)?;
        Ok(data.len())
    }

    /// Read bytes from an endpoint.
    ///
    /// On the response endpoint, already-buffered data is returned
    /// without stepping the worker at all. Only a dry channel enters
    /// the drive loop.
    pub fn read_from_endpoint(&mut self, endpoint: u32, dest: &mut [u8]) -> Result<usize> {
        if endpoint == COMMAND_ENDPOINT {
            return Err(IpcError::violation(
                "transport",
                "command endpoint is write-only for the frontend",
            ));
        }
        if endpoint == RESPONSE_ENDPOINT {
            if dest.is_empty() {
                return Ok(0);
            }
            self.drive_until(|rsp| rsp.available_data() > 0)?;
            return self.rsp.pop(dest);
        }

        let stream = self
            .passthrough
            .get_mut(&endpoint)
            .ok_or(IpcError::UnknownEndpoint(endpoint))?;
        Ok(stream.read(dest)?)
    }

    /// Read one complete protocol record from the response endpoint,
    /// driving the worker as needed.
    pub fn read_response_message(&mut self) -> Result<Message> {
        loop {
            match Message::receive(&self.rsp) {
                Err(IpcError::ChannelEmpty) => {
                    self.drive_until(|rsp| rsp.available_data() > 0)?;
                }
                other => return other,
            }
        }
    }

    /// Clear both channels and rewind the worker for a fresh song load.
    ///
    /// Stale records from previous play/stop cycles or failed loads are
    /// discarded in both directions.
    pub fn reset_for_load(&mut self) {
        self.cmd.clear();
        self.rsp.clear();
        self.worker.reset_for_load();
    }

    fn terminated(&self) -> IpcError {
        IpcError::WorkerTerminated {
            status: self.worker.quit_status().unwrap_or(0),
        }
    }

    /// Step the worker until `done` holds on the response channel.
    fn drive_until(&mut self, done: impl Fn(&ChannelConsumer) -> bool) -> Result<()> {
        let mut idle_streak = 0;
        for iteration in 0..MAX_DRIVE_ITERATIONS {
            if done(&self.rsp) {
                if iteration > 0 {
                    log::trace!("response ready after {iteration} worker steps");
                }
                return Ok(());
            }
            match self.worker.step()? {
                StepOutcome::Progress => idle_streak = 0,
                StepOutcome::Idle => {
                    idle_streak += 1;
                    // An idle worker cannot make the condition true on
                    // its own; a couple of confirming steps is enough.
                    if idle_streak >= 2 {
                        return Err(IpcError::ProtocolStall {
                            iterations: iteration + 1,
                        });
                    }
                }
                StepOutcome::Quit => return Err(self.terminated()),
            }
        }
        if done(&self.rsp) {
            return Ok(());
        }
        Err(IpcError::ProtocolStall {
            iterations: MAX_DRIVE_ITERATIONS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Core that never produces anything; the shim's stall and
    /// passthrough behavior do not depend on a working core.
    struct InertCore;

    impl WorkerCore for InertCore {
        fn configure(&mut self, _config: &crate::config::EmuConfig) -> Result<()> {
            Ok(())
        }
        fn admit_song(&mut self, _song: &crate::worker::SongBundle) -> crate::worker::Admission {
            crate::worker::Admission::Rejected { reason: "inert".into() }
        }
        fn apply_option(&mut self, _option: crate::worker::RuntimeOption) -> Result<()> {
            Ok(())
        }
        fn reset(&mut self) {}
        fn run_slice(&mut self, _io: &mut crate::worker::CoreIo<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unknown_endpoint_is_an_error() {
        let mut shim = TransportShim::new(InertCore).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            shim.read_from_endpoint(1234, &mut buf),
            Err(IpcError::UnknownEndpoint(1234))
        ));
        assert!(matches!(
            shim.write_to_endpoint(1234, b"data"),
            Err(IpcError::UnknownEndpoint(1234))
        ));
    }

    #[test]
    fn test_bridge_endpoints_are_directional() {
        let mut shim = TransportShim::new(InertCore).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            shim.read_from_endpoint(COMMAND_ENDPOINT, &mut buf),
            Err(IpcError::ProtocolViolation { .. })
        ));
        assert!(matches!(
            shim.write_to_endpoint(RESPONSE_ENDPOINT, b"data"),
            Err(IpcError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn test_reserved_endpoints_refuse_stream_registration() {
        let mut shim = TransportShim::new(InertCore).unwrap();
        let stream = Box::new(Cursor::new(Vec::new()));
        assert!(shim.register_stream(COMMAND_ENDPOINT, stream).is_err());
    }

    #[test]
    fn test_passthrough_stream_round_trip() {
        let mut shim = TransportShim::new(InertCore).unwrap();
        shim.register_stream(42, Box::new(Cursor::new(b"module bytes".to_vec())))
            .unwrap();

        let mut buf = [0u8; 6];
        assert_eq!(shim.read_from_endpoint(42, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"module");
    }

    #[test]
    fn test_read_with_idle_worker_stalls() {
        let mut shim = TransportShim::new(InertCore).unwrap();
        let mut buf = [0u8; 16];
        // No config was ever sent, so the worker can make no progress.
        assert!(matches!(
            shim.read_from_endpoint(RESPONSE_ENDPOINT, &mut buf),
            Err(IpcError::ProtocolStall { .. })
        ));
    }

    #[test]
    fn test_zero_length_read_is_trivial() {
        let mut shim = TransportShim::new(InertCore).unwrap();
        let mut buf = [0u8; 0];
        assert_eq!(
            shim.read_from_endpoint(RESPONSE_ENDPOINT, &mut buf).unwrap(),
            0
        );
    }
}
