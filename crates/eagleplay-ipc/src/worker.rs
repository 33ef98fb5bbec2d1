//! Phase-driven cooperative worker host.
//!
//! Natively the worker runs as a separate process: it blocks reading
//! commands, runs the CPU core, and blocks writing replies. Here the
//! whole worker is a resumable state machine. Each [`WorkerHost::step`]
//! call performs one bounded unit of work for the current [`Phase`] and
//! returns control to the caller; "blocking" never happens.
//!
//! Phase progression mirrors the native worker main loop, split at the
//! points where the original blocked on its socket:
//!
//! 1. `AwaitingConfig` — receive the configuration record, perform
//!    one-time hardware initialization.
//! 2. `AwaitingSongAdmission` — receive score/module records, admit or
//!    reject the song, reset the core.
//! 3. `ExchangingConfig` — receive runtime options up to the token.
//! 4. `Running` — execute bounded CPU slices; the audio path streams
//!    `Data` records into the response channel and raises the yield
//!    flag once the frontend's current request is satisfied.
//!
//! The only back-edge is the reboot from `Running` (or a reboot
//! request observed during the option exchange) to song admission.

use crate::config::EmuConfig;
use crate::error::{IpcError, Result};
use crate::message::{Message, Tag, MAX_PAYLOAD};
use crate::ring::{ChannelConsumer, ChannelProducer};
use crate::trap::{ExitOutcome, ExitTrap};
use eagleplay_common::SubsongRange;

/// The bridge's position in its handshake-to-streaming lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bridge just created; the configuration record has not arrived.
    AwaitingConfig,
    /// Configuration applied; waiting for score/module data.
    AwaitingSongAdmission,
    /// Admission reply sent; reading runtime options.
    ExchangingConfig,
    /// Streaming. Persists until a reboot or quit condition.
    Running,
}

/// What one `step()` call accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A bounded unit of work was performed.
    Progress,
    /// Input the current phase needs has not arrived yet.
    Idle,
    /// The worker core terminated; no further progress is possible.
    Quit,
}

/// Song data collected during the admission exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongBundle {
    /// Score/player binary. Required.
    pub score: Vec<u8>,
    /// Module data. Empty when the score is self-contained.
    pub module: Vec<u8>,
}

/// Worker core's verdict on an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The song can be played.
    Accepted {
        /// Detected format name.
        format: String,
        /// Player binary name, if meaningful.
        player: String,
        /// Valid subsong range.
        subsongs: SubsongRange,
    },
    /// The song cannot be played.
    Rejected {
        /// Reason reported back to the frontend.
        reason: String,
    },
}

/// Runtime option applied during the config exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeOption {
    /// Select a subsong.
    Subsong(u32),
    /// Output frequency in Hz.
    Frequency(u32),
    /// Filter emulation mode.
    FilterMode(u32),
    /// Resampling mode.
    ResamplingMode(u32),
    /// Enable the speed hack.
    SpeedHack,
}

impl RuntimeOption {
    /// Decode an option from its protocol record, or `None` if the tag
    /// is not an option tag.
    pub fn from_message(msg: &Message) -> Result<Option<RuntimeOption>> {
        Ok(Some(match msg.tag {
            Tag::Subsong => RuntimeOption::Subsong(msg.u32_arg()?),
            Tag::SetFrequency => RuntimeOption::Frequency(msg.u32_arg()?),
            Tag::FilterMode => RuntimeOption::FilterMode(msg.u32_arg()?),
            Tag::ResamplingMode => RuntimeOption::ResamplingMode(msg.u32_arg()?),
            Tag::SpeedHack => RuntimeOption::SpeedHack,
            _ => return Ok(None),
        }))
    }

    /// Encode the option as its protocol record.
    pub fn to_message(self) -> Message {
        match self {
            RuntimeOption::Subsong(n) => Message::with_u32(Tag::Subsong, n),
            RuntimeOption::Frequency(hz) => Message::with_u32(Tag::SetFrequency, hz),
            RuntimeOption::FilterMode(m) => Message::with_u32(Tag::FilterMode, m),
            RuntimeOption::ResamplingMode(m) => Message::with_u32(Tag::ResamplingMode, m),
            RuntimeOption::SpeedHack => Message::bare(Tag::SpeedHack),
        }
    }
}

/// Outstanding PCM request from the frontend.
#[derive(Debug, Default, Clone, Copy)]
struct ReadBudget {
    requested: usize,
    delivered: usize,
}

impl ReadBudget {
    fn set(&mut self, bytes: usize) {
        self.requested = bytes;
        self.delivered = 0;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn remaining(&self) -> usize {
        self.requested - self.delivered
    }

    fn active(&self) -> bool {
        self.requested > 0 && self.delivered < self.requested
    }
}

/// Channel access handed to the worker core for one execution slice.
///
/// This is the audio backend's path into the bridge: PCM is appended
/// to the response channel as `Data` records, counted against the
/// frontend's outstanding `Read` budget. When the budget is satisfied
/// the exchange-ending token is appended and the yield flag raised,
/// telling the core to return from its slice.
pub struct CoreIo<'a> {
    rsp: &'a ChannelProducer,
    trap: &'a ExitTrap,
    budget: &'a mut ReadBudget,
    yielded: &'a mut bool,
    reboot: &'a mut bool,
}

impl CoreIo<'_> {
    /// Bytes of PCM still wanted by the current request.
    pub fn remaining_bytes(&self) -> usize {
        self.budget.remaining()
    }

    /// Whether the core should return from its slice.
    pub fn should_yield(&self) -> bool {
        *self.yielded || *self.reboot
    }

    /// Append PCM to the response channel.
    ///
    /// Delivers at most the remaining budget, chunked into `Data`
    /// records, and returns how many bytes were consumed. Satisfying
    /// the budget appends the token and raises the yield flag.
    pub fn push_pcm(&mut self, bytes: &[u8]) -> Result<usize> {
        let take = bytes.len().min(self.budget.remaining());
        for chunk in bytes[..take].chunks(MAX_PAYLOAD) {
            Message::new(Tag::Data, chunk).send(self.rsp)?;
        }
        self.budget.delivered += take;

        if self.budget.requested > 0 && self.budget.remaining() == 0 {
            Message::token().send(self.rsp)?;
            *self.yielded = true;
        }
        Ok(take)
    }

    /// Report that the current song ended and request a reboot.
    ///
    /// Emits a `SongEnd` record; the host appends the closing token
    /// when it observes the reboot condition.
    pub fn signal_song_end(&mut self, code: u32, reason: &str) -> Result<()> {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        Message::new(Tag::SongEnd, payload).send(self.rsp)?;
        *self.reboot = true;
        Ok(())
    }

    /// Request a reboot without reporting a song end.
    pub fn request_reboot(&mut self) {
        *self.reboot = true;
    }

    /// The termination trap, for cores whose deep call paths need the
    /// intercepted exit primitive.
    pub fn trap(&self) -> &ExitTrap {
        self.trap
    }
}

/// The instruction-set emulator and everything it drives, seen from
/// the bridge.
///
/// The bridge treats the core as opaque: it only needs configuration,
/// admission, option application, reset, and the ability to run one
/// bounded slice of execution that may produce audio through
/// [`CoreIo`].
pub trait WorkerCore {
    /// Apply the global emulation configuration and perform one-time
    /// hardware/memory initialization.
    fn configure(&mut self, config: &EmuConfig) -> Result<()>;

    /// Validate the uploaded song and prepare it for playback.
    fn admit_song(&mut self, song: &SongBundle) -> Admission;

    /// Apply one runtime option.
    fn apply_option(&mut self, option: RuntimeOption) -> Result<()>;

    /// Reset CPU core and peripheral state after admission.
    fn reset(&mut self);

    /// Execute one bounded slice of emulation.
    ///
    /// The core should poll [`CoreIo::should_yield`] and return
    /// promptly once it is set, once its internal cycle budget for a
    /// single slice is exhausted, or once it has requested a reboot.
    fn run_slice(&mut self, io: &mut CoreIo<'_>) -> Result<()>;
}

/// Cooperative host driving a [`WorkerCore`] through the bridge
/// protocol.
pub struct WorkerHost<C> {
    core: C,
    phase: Phase,
    cmd: ChannelConsumer,
    rsp: ChannelProducer,
    trap: ExitTrap,
    budget: ReadBudget,
    yielded: bool,
    reboot: bool,
    configured: bool,
    quit_status: Option<i32>,
    /// Admission exchange received so far, when the song upload spans
    /// multiple channel writes.
    pending_song: Option<SongBundle>,
}

impl<C: WorkerCore> WorkerHost<C> {
    /// Create a host reading commands from `cmd` and writing replies
    /// to `rsp`.
    pub fn new(core: C, cmd: ChannelConsumer, rsp: ChannelProducer) -> Self {
        Self {
            core,
            phase: Phase::AwaitingConfig,
            cmd,
            rsp,
            trap: ExitTrap::new(),
            budget: ReadBudget::default(),
            yielded: false,
            reboot: false,
            configured: false,
            quit_status: None,
            pending_song: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Exit status if the core terminated through the trap.
    pub fn quit_status(&self) -> Option<i32> {
        self.quit_status
    }

    /// Access the worker core.
    pub fn core(&self) -> &C {
        &self.core
    }

    /// Rewind the phase machine for a fresh song load.
    ///
    /// One-time hardware initialization survives; the phase returns to
    /// song admission (or to configuration if it never happened). The
    /// caller is responsible for clearing both ring channels.
    pub fn reset_for_load(&mut self) {
        self.budget.clear();
        self.yielded = false;
        self.reboot = false;
        self.pending_song = None;
        self.phase = if self.configured {
            Phase::AwaitingSongAdmission
        } else {
            Phase::AwaitingConfig
        };
        log::debug!("worker rewound for load, phase {:?}", self.phase);
    }

    /// Perform one bounded unit of work for the current phase.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.quit_status.is_some() {
            return Ok(StepOutcome::Quit);
        }
        match self.phase {
            Phase::AwaitingConfig => self.step_config(),
            Phase::AwaitingSongAdmission => self.step_admission(),
            Phase::ExchangingConfig => self.step_option_exchange(),
            Phase::Running => self.step_running(),
        }
    }

    /// Receive the first record of an exchange; `Idle` if none arrived.
    fn first_record(&mut self) -> Result<Option<Message>> {
        match Message::receive(&self.cmd) {
            Err(IpcError::ChannelEmpty) => Ok(None),
            other => other.map(Some),
        }
    }

    /// Receive a mid-exchange record. The frontend writes each
    /// exchange atomically, so a dry channel here is a framing bug.
    fn exchange_record(&mut self, context: &str) -> Result<Message> {
        Message::receive(&self.cmd).map_err(|e| match e {
            IpcError::ChannelEmpty => IpcError::violation(self.phase, format!("truncated {context} exchange")),
            other => other,
        })
    }

    fn expect_token(&mut self, context: &str) -> Result<()> {
        let msg = self.exchange_record(context)?;
        if !msg.is_token() {
            return Err(IpcError::violation(
                self.phase,
                format!("expected token closing {context} exchange, got {:?}", msg.tag),
            ));
        }
        Ok(())
    }

    fn transition(&mut self, next: Phase) {
        log::debug!("phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn step_config(&mut self) -> Result<StepOutcome> {
        let Some(msg) = self.first_record()? else {
            return Ok(StepOutcome::Idle);
        };
        if msg.tag != Tag::Config {
            return Err(IpcError::violation(
                self.phase,
                format!("expected Config record, got {:?}", msg.tag),
            ));
        }

        let config = EmuConfig::from_payload(&msg.payload)?;
        self.expect_token("configuration")?;
        self.core.configure(&config)?;
        self.configured = true;
        self.transition(Phase::AwaitingSongAdmission);
        Ok(StepOutcome::Progress)
    }

    fn step_admission(&mut self) -> Result<StepOutcome> {
        let mut song = self.pending_song.take().unwrap_or_default();
        let mut consumed = false;

        // Song uploads can span several channel writes, so the
        // admission exchange is the one exchange that may legitimately
        // run dry mid-way: the portion received so far is stashed and
        // the step resumes when more records arrive.
        loop {
            let msg = match Message::receive(&self.cmd) {
                Err(IpcError::ChannelEmpty) => {
                    if !song.score.is_empty() || !song.module.is_empty() {
                        self.pending_song = Some(song);
                    }
                    return Ok(if consumed { StepOutcome::Progress } else { StepOutcome::Idle });
                }
                other => other?,
            };
            consumed = true;
            match msg.tag {
                Tag::Score => song.score.extend_from_slice(&msg.payload),
                Tag::Module => song.module.extend_from_slice(&msg.payload),
                Tag::Token => break,
                other => {
                    return Err(IpcError::violation(
                        self.phase,
                        format!("unexpected {other:?} record in admission exchange"),
                    ))
                }
            }
        }

        if song.score.is_empty() {
            return Err(IpcError::violation(self.phase, "admission exchange carried no score"));
        }

        match self.core.admit_song(&song) {
            Admission::Accepted { format, player, subsongs } => {
                let mut payload = Vec::with_capacity(12);
                payload.extend_from_slice(&subsongs.min.to_be_bytes());
                payload.extend_from_slice(&subsongs.max.to_be_bytes());
                payload.extend_from_slice(&subsongs.current.to_be_bytes());
                Message::new(Tag::CanPlay, payload).send(&self.rsp)?;
                if !format.is_empty() {
                    Message::new(Tag::FormatName, format.into_bytes()).send(&self.rsp)?;
                }
                if !player.is_empty() {
                    Message::new(Tag::PlayerName, player.into_bytes()).send(&self.rsp)?;
                }
                Message::token().send(&self.rsp)?;

                self.core.reset();
                self.budget.clear();
                self.yielded = false;
                self.reboot = false;
                self.transition(Phase::ExchangingConfig);
            }
            Admission::Rejected { reason } => {
                log::warn!("song rejected: {reason}");
                Message::new(Tag::CantPlay, reason.into_bytes()).send(&self.rsp)?;
                Message::token().send(&self.rsp)?;
                // Stay in admission; the frontend may retry.
            }
        }
        Ok(StepOutcome::Progress)
    }

    fn step_option_exchange(&mut self) -> Result<StepOutcome> {
        let Some(first) = self.first_record()? else {
            return Ok(StepOutcome::Idle);
        };

        let mut msg = first;
        while !msg.is_token() {
            if msg.tag == Tag::Reboot {
                self.reboot = true;
            } else {
                match RuntimeOption::from_message(&msg)? {
                    Some(option) => self.core.apply_option(option)?,
                    None => {
                        return Err(IpcError::violation(
                            self.phase,
                            format!("unexpected {:?} record in option exchange", msg.tag),
                        ))
                    }
                }
            }
            msg = self.exchange_record("option")?;
        }

        if self.reboot {
            self.reboot = false;
            self.transition(Phase::AwaitingSongAdmission);
        } else {
            self.transition(Phase::Running);
        }
        Ok(StepOutcome::Progress)
    }

    fn step_running(&mut self) -> Result<StepOutcome> {
        // The yield flag set (or no budget yet) means the previous
        // request was fully answered: exactly one resume exchange must
        // be consumed before more emulation runs.
        if self.yielded || !self.budget.active() {
            let Some(msg) = self.first_record()? else {
                return Ok(StepOutcome::Idle);
            };
            match msg.tag {
                Tag::Read => {
                    let bytes = msg.u32_arg()? as usize;
                    self.expect_token("read")?;
                    self.budget.set(bytes);
                    self.yielded = false;
                }
                Tag::Reboot => {
                    self.expect_token("reboot")?;
                    // Already-queued PCM stays in the response channel.
                    Message::token().send(&self.rsp)?;
                    self.budget.clear();
                    self.yielded = false;
                    self.transition(Phase::AwaitingSongAdmission);
                }
                other => {
                    return Err(IpcError::violation(
                        self.phase,
                        format!("expected Read or Reboot in resume exchange, got {other:?}"),
                    ))
                }
            }
            return Ok(StepOutcome::Progress);
        }

        // Run one bounded emulation slice under the termination trap.
        let core = &mut self.core;
        let mut io = CoreIo {
            rsp: &self.rsp,
            trap: &self.trap,
            budget: &mut self.budget,
            yielded: &mut self.yielded,
            reboot: &mut self.reboot,
        };
        match self.trap.catch_exit(|| core.run_slice(&mut io)) {
            ExitOutcome::Completed(result) => result?,
            ExitOutcome::Terminated(status) => {
                log::warn!("worker core terminated with status {status}");
                self.quit_status = Some(status);
                return Ok(StepOutcome::Quit);
            }
        }

        if self.reboot {
            // A reboot raised mid-slice ends the exchange with a token
            // and returns to admission without touching queued PCM.
            Message::token().send(&self.rsp)?;
            self.reboot = false;
            self.budget.clear();
            self.yielded = false;
            self.transition(Phase::AwaitingSongAdmission);
        }
        Ok(StepOutcome::Progress)
    }
}
