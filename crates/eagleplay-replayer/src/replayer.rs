//! High-level song player over the IPC bridge.
//!
//! [`Replayer`] is what a host application talks to: it hides the
//! record-level protocol behind load/play/render calls and implements
//! the shared [`SongPlayer`] trait. Internally every operation is one
//! or more token-terminated exchanges on the transport shim.

use crate::error::{ReplayerError, Result};
use eagleplay_common::{PlaybackState, SongMetadata, SongPlayer, SubsongRange};
use eagleplay_ipc::{
    EmuConfig, Message, RuntimeOption, Tag, TransportShim, WorkerCore, COMMAND_ENDPOINT,
    MAX_PAYLOAD,
};

/// Bytes of PCM requested per read exchange. Large render buffers are
/// split into requests of this size so one exchange never approaches
/// the response channel capacity.
const READ_CHUNK: usize = 32 * 1024;

struct StoredSong {
    name: String,
    score: Vec<u8>,
    module: Vec<u8>,
}

/// Song player driving a [`WorkerCore`] through the bridge protocol.
///
/// The stored song bytes are kept so that stop, subsong switches and
/// replay after a song end can re-run the admission exchange without
/// the host re-supplying the data.
pub struct Replayer<C> {
    shim: TransportShim<C>,
    config: EmuConfig,
    metadata: Option<SongMetadata>,
    stored: Option<StoredSong>,
    state: PlaybackState,
    /// Worker is back at song admission; the next play must re-admit.
    needs_reload: bool,
}

impl<C: WorkerCore> Replayer<C> {
    /// Create a replayer with the default emulation configuration.
    pub fn new(core: C) -> Result<Self> {
        Self::with_config(core, EmuConfig::default())
    }

    /// Create a replayer and perform the one-time configuration
    /// exchange.
    pub fn with_config(core: C, config: EmuConfig) -> Result<Self> {
        let mut shim = TransportShim::new(core)?;

        let payload = config.to_payload()?;
        let mut exchange = Vec::new();
        Message::new(Tag::Config, payload).encode_into(&mut exchange);
        Message::token().encode_into(&mut exchange);
        shim.write_to_endpoint(COMMAND_ENDPOINT, &exchange)?;

        Ok(Replayer {
            shim,
            config,
            metadata: None,
            stored: None,
            state: PlaybackState::Stopped,
            needs_reload: false,
        })
    }

    /// Metadata of the currently admitted song.
    pub fn metadata(&self) -> Option<&SongMetadata> {
        self.metadata.as_ref()
    }

    /// Upload a song and run the admission exchange.
    ///
    /// `score` is the player/score binary; `module` carries the song
    /// data for formats where the two are separate files. On success
    /// the song is admitted and stopped; call [`SongPlayer::play`] to
    /// start producing audio.
    pub fn load_song(&mut self, name: &str, score: &[u8], module: Option<&[u8]>) -> Result<&SongMetadata> {
        self.metadata = None;
        self.state = PlaybackState::Stopped;
        self.stored = Some(StoredSong {
            name: name.to_owned(),
            score: score.to_vec(),
            module: module.unwrap_or_default().to_vec(),
        });

        let meta = self.admit(None)?;
        self.needs_reload = false;
        Ok(self.metadata.insert(meta))
    }

    /// Write one token-terminated exchange in a single channel push.
    fn write_exchange(&mut self, records: &[Message]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            record.encode_into(&mut buf);
        }
        Message::token().encode_into(&mut buf);
        self.shim.write_to_endpoint(COMMAND_ENDPOINT, &buf)?;
        Ok(())
    }

    fn write_record(&mut self, record: &Message) -> Result<()> {
        self.shim.write_to_endpoint(COMMAND_ENDPOINT, &record.encode())?;
        Ok(())
    }

    /// Re-run the admission and option exchanges from the stored song.
    fn admit(&mut self, subsong: Option<u32>) -> Result<SongMetadata> {
        let song = self.stored.take().ok_or(ReplayerError::NotLoaded)?;

        self.shim.reset_for_load();
        let admitted = self.upload_and_admit(&song, subsong);
        let name = song.name.clone();
        self.stored = Some(song);

        let mut meta = admitted?;
        meta.module = name;
        if let Some(n) = subsong {
            meta.subsongs.current = n;
        }
        Ok(meta)
    }

    fn upload_and_admit(&mut self, song: &StoredSong, subsong: Option<u32>) -> Result<SongMetadata> {
        // Bulk data is chunked into individual record writes; the shim
        // steps the worker when the command channel fills, so uploads
        // larger than the channel still go through.
        for chunk in song.score.chunks(MAX_PAYLOAD) {
            self.write_record(&Message::new(Tag::Score, chunk))?;
        }
        for chunk in song.module.chunks(MAX_PAYLOAD) {
            self.write_record(&Message::new(Tag::Module, chunk))?;
        }
        self.write_record(&Message::token())?;

        let meta = self.read_admission()?;

        let mut options = Vec::new();
        if let Some(n) = subsong {
            options.push(RuntimeOption::Subsong(n).to_message());
        }
        self.write_exchange(&options)?;
        Ok(meta)
    }

    fn read_admission(&mut self) -> Result<SongMetadata> {
        let first = self.shim.read_response_message()?;
        match first.tag {
            Tag::CanPlay => {
                if first.payload.len() != 12 {
                    return Err(ReplayerError::UnexpectedReply(format!(
                        "CanPlay payload of {} bytes, expected 12",
                        first.payload.len()
                    )));
                }
                let word = |i: usize| {
                    u32::from_be_bytes([
                        first.payload[i],
                        first.payload[i + 1],
                        first.payload[i + 2],
                        first.payload[i + 3],
                    ])
                };
                let mut meta = SongMetadata {
                    subsongs: SubsongRange { min: word(0), max: word(4), current: word(8) },
                    ..Default::default()
                };
                loop {
                    let msg = self.shim.read_response_message()?;
                    match msg.tag {
                        Tag::FormatName => meta.format = msg.str_arg()?.to_owned(),
                        Tag::PlayerName => meta.player = msg.str_arg()?.to_owned(),
                        Tag::Token => return Ok(meta),
                        other => {
                            return Err(ReplayerError::UnexpectedReply(format!(
                                "{other:?} in admission reply"
                            )))
                        }
                    }
                }
            }
            Tag::CantPlay => {
                let reason = first.str_arg()?.to_owned();
                // Consume the closing token before reporting.
                loop {
                    if self.shim.read_response_message()?.is_token() {
                        break;
                    }
                }
                Err(ReplayerError::Rejected { reason })
            }
            other => Err(ReplayerError::UnexpectedReply(format!(
                "{other:?} as admission verdict"
            ))),
        }
    }

    /// Switch to a different subsong, re-admitting the stored song.
    ///
    /// Playback state is preserved: a playing song keeps playing from
    /// the start of the new subsong.
    ///
    /// # Errors
    ///
    /// [`ReplayerError::NotLoaded`] when no song was admitted;
    /// [`ReplayerError::InvalidSubsong`] when `subsong` falls outside
    /// the admitted range.
    pub fn select_subsong(&mut self, subsong: u32) -> Result<()> {
        let meta = self.metadata.as_ref().ok_or(ReplayerError::NotLoaded)?;
        let range = meta.subsongs;
        if !range.contains(subsong) {
            return Err(ReplayerError::InvalidSubsong {
                requested: subsong,
                min: range.min,
                max: range.max,
            });
        }
        let was_playing = self.state == PlaybackState::Playing;

        // admit() rewinds the worker through reset_for_load, so no
        // explicit reboot exchange is needed even mid-playback.
        match self.admit(Some(subsong)) {
            Ok(meta) => {
                self.metadata = Some(meta);
                self.needs_reload = false;
                self.state = if was_playing {
                    PlaybackState::Playing
                } else {
                    PlaybackState::Stopped
                };
                Ok(())
            }
            Err(err) => {
                self.state = PlaybackState::Stopped;
                self.needs_reload = true;
                Err(err)
            }
        }
    }

    /// Send the reboot exchange and wait for the worker's closing
    /// token, discarding any PCM still queued ahead of it.
    fn reboot(&mut self) -> Result<()> {
        self.write_exchange(&[Message::bare(Tag::Reboot)])?;
        loop {
            let msg = self.shim.read_response_message()?;
            match msg.tag {
                Tag::Token => return Ok(()),
                Tag::Data | Tag::SongEnd => {}
                other => {
                    return Err(ReplayerError::UnexpectedReply(format!(
                        "{other:?} while awaiting reboot token"
                    )))
                }
            }
        }
    }

    /// Pull PCM from the worker into `buffer`, returning the number of
    /// samples written. A short count means the song ended mid-request.
    fn render_frames(&mut self, buffer: &mut [i16]) -> Result<usize> {
        let mut filled = 0;
        let mut ended = false;

        while filled < buffer.len() && !ended {
            let want = ((buffer.len() - filled) * 2).min(READ_CHUNK) as u32;
            self.write_exchange(&[Message::with_u32(Tag::Read, want)])?;

            loop {
                let msg = self.shim.read_response_message()?;
                match msg.tag {
                    Tag::Data => {
                        for pair in msg.payload.chunks_exact(2) {
                            if filled == buffer.len() {
                                break;
                            }
                            buffer[filled] = i16::from_le_bytes([pair[0], pair[1]]);
                            filled += 1;
                        }
                    }
                    Tag::SongEnd => ended = true,
                    Tag::Token => break,
                    other => {
                        return Err(ReplayerError::UnexpectedReply(format!(
                            "{other:?} in data exchange"
                        )))
                    }
                }
            }
        }

        if ended {
            // The worker already rebooted itself back to admission.
            self.state = PlaybackState::Ended;
            self.needs_reload = true;
        }
        Ok(filled)
    }
}

impl<C: WorkerCore> SongPlayer for Replayer<C> {
    fn play(&mut self) {
        let Some(meta) = &self.metadata else {
            log::warn!("play requested with no song loaded");
            return;
        };
        if self.needs_reload {
            let subsong = meta.subsongs.current;
            match self.admit(Some(subsong)) {
                Ok(meta) => {
                    self.metadata = Some(meta);
                    self.needs_reload = false;
                }
                Err(err) => {
                    log::error!("reload for play failed: {err}");
                    self.state = PlaybackState::Stopped;
                    return;
                }
            }
        }
        self.state = PlaybackState::Playing;
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn stop(&mut self) {
        if self.metadata.is_some() && !self.needs_reload {
            if let Err(err) = self.reboot() {
                log::warn!("reboot on stop failed: {err}");
            }
            self.needs_reload = true;
        }
        self.state = PlaybackState::Stopped;
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn generate_samples_into(&mut self, buffer: &mut [i16]) {
        if self.state != PlaybackState::Playing {
            buffer.fill(0);
            return;
        }
        match self.render_frames(buffer) {
            Ok(filled) => buffer[filled..].fill(0),
            Err(err) => {
                log::error!("render failed: {err}");
                self.state = PlaybackState::Stopped;
                buffer.fill(0);
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.config.frequency
    }

    fn subsong_count(&self) -> usize {
        self.metadata
            .as_ref()
            .map(|m| m.subsongs.count() as usize)
            .unwrap_or(1)
    }

    fn current_subsong(&self) -> u32 {
        self.metadata
            .as_ref()
            .map(|m| m.subsongs.current)
            .unwrap_or(0)
    }

    fn set_subsong(&mut self, subsong: u32) -> bool {
        match self.select_subsong(subsong) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("subsong switch refused: {err}");
                false
            }
        }
    }
}
