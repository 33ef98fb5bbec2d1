//! Protocol message codec.
//!
//! Every command and reply on the bridge is a tagged, length-implied
//! byte record: a fixed 8-byte header (big-endian tag, big-endian
//! payload size) followed by the payload. A logical multi-message
//! exchange is terminated by a bodyless [`Tag::Token`] record; both
//! sides use it to know that no more messages follow in this turn.
//!
//! A record is always pushed to a ring channel with a single
//! all-or-nothing write, so a consumer that can read a header is
//! guaranteed the payload is buffered too.

use crate::error::{IpcError, Result};
use crate::ring::{ChannelConsumer, ChannelProducer};

/// Size of the record header: tag (4 bytes) + payload size (4 bytes).
pub const HEADER_LEN: usize = 8;

/// Maximum payload carried by one record. PCM is chunked to this size.
pub const MAX_PAYLOAD: usize = 4096;

/// Record tags.
///
/// Commands flow frontend → worker, replies worker → frontend.
/// `Token` is valid in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Tag {
    // Commands
    /// Emulation configuration (serialized [`EmuConfig`]).
    ///
    /// [`EmuConfig`]: crate::config::EmuConfig
    Config = 0x01,
    /// Score/player binary to upload into the worker.
    Score = 0x02,
    /// Module (song file) data.
    Module = 0x03,
    /// Select a subsong (u32 payload).
    Subsong = 0x04,
    /// Request `n` bytes of PCM (u32 payload).
    Read = 0x05,
    /// Discard the current song and return to admission.
    Reboot = 0x06,
    /// Change the output frequency (u32 payload, Hz).
    SetFrequency = 0x07,
    /// Select the filter emulation mode (u32 payload).
    FilterMode = 0x08,
    /// Select the resampling mode (u32 payload).
    ResamplingMode = 0x09,
    /// Enable the speed hack.
    SpeedHack = 0x0A,

    // Replies
    /// Song admitted; payload is min/max/current subsong (3 × u32).
    CanPlay = 0x40,
    /// Song rejected; payload is a UTF-8 reason.
    CantPlay = 0x41,
    /// Detected format name (UTF-8).
    FormatName = 0x42,
    /// Player binary name (UTF-8).
    PlayerName = 0x43,
    /// PCM payload (interleaved stereo i16, little-endian).
    Data = 0x44,
    /// The current song ended; payload is a u32 code + UTF-8 reason.
    SongEnd = 0x45,

    /// End of one logical exchange. Bodyless.
    Token = 0x7F,
}

impl Tag {
    fn from_u32(raw: u32) -> Option<Tag> {
        Some(match raw {
            0x01 => Tag::Config,
            0x02 => Tag::Score,
            0x03 => Tag::Module,
            0x04 => Tag::Subsong,
            0x05 => Tag::Read,
            0x06 => Tag::Reboot,
            0x07 => Tag::SetFrequency,
            0x08 => Tag::FilterMode,
            0x09 => Tag::ResamplingMode,
            0x0A => Tag::SpeedHack,
            0x40 => Tag::CanPlay,
            0x41 => Tag::CantPlay,
            0x42 => Tag::FormatName,
            0x43 => Tag::PlayerName,
            0x44 => Tag::Data,
            0x45 => Tag::SongEnd,
            0x7F => Tag::Token,
            _ => return None,
        })
    }
}

/// One protocol record: a tag and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Record tag.
    pub tag: Tag,
    /// Tag-defined payload bytes.
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a record with a payload.
    pub fn new(tag: Tag, payload: impl Into<Vec<u8>>) -> Self {
        Message { tag, payload: payload.into() }
    }

    /// Build a bodyless record.
    pub fn bare(tag: Tag) -> Self {
        Message { tag, payload: Vec::new() }
    }

    /// The exchange-terminating sentinel.
    pub fn token() -> Self {
        Self::bare(Tag::Token)
    }

    /// Build a record whose payload is one big-endian u32.
    pub fn with_u32(tag: Tag, value: u32) -> Self {
        Message { tag, payload: value.to_be_bytes().to_vec() }
    }

    /// Whether this record is the exchange terminator.
    pub fn is_token(&self) -> bool {
        self.tag == Tag::Token
    }

    /// Interpret the payload as a single big-endian u32.
    pub fn u32_arg(&self) -> Result<u32> {
        let bytes: [u8; 4] = self.payload.as_slice().try_into().map_err(|_| {
            IpcError::ProtocolViolation {
                detail: format!(
                    "{:?} record: expected 4-byte payload, got {}",
                    self.tag,
                    self.payload.len()
                ),
            }
        })?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Interpret the payload as UTF-8 text.
    pub fn str_arg(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload).map_err(|_| IpcError::ProtocolViolation {
            detail: format!("{:?} record: payload is not valid UTF-8", self.tag),
        })
    }

    /// Serialize the record into header + payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&(self.tag as u32).to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Append the encoded record to `buf`.
    ///
    /// Exchanges are assembled into one buffer and pushed with a
    /// single channel write so the consumer never sees a partial
    /// exchange.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.encode());
    }

    /// Push the encoded record onto a channel in one atomic write.
    pub fn send(&self, channel: &ChannelProducer) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(IpcError::ProtocolViolation {
                detail: format!(
                    "{:?} record: payload of {} bytes exceeds MAX_PAYLOAD ({MAX_PAYLOAD})",
                    self.tag,
                    self.payload.len()
                ),
            });
        }
        channel.push(&self.encode())
    }

    /// Read one complete record from a channel.
    ///
    /// # Errors
    ///
    /// `ChannelEmpty` when no complete record has been buffered yet;
    /// `ProtocolViolation` on an unknown tag or an oversized payload.
    pub fn receive(channel: &ChannelConsumer) -> Result<Message> {
        let mut header = [0u8; HEADER_LEN];
        channel.pop_exact(&mut header)?;

        let raw_tag = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let tag = Tag::from_u32(raw_tag).ok_or_else(|| IpcError::ProtocolViolation {
            detail: format!("unknown record tag 0x{raw_tag:02X}"),
        })?;
        if size > MAX_PAYLOAD {
            return Err(IpcError::ProtocolViolation {
                detail: format!("{tag:?} record: payload size {size} exceeds MAX_PAYLOAD"),
            });
        }

        let mut payload = vec![0u8; size];
        // Records are pushed atomically, so a shortfall here means the
        // producer broke the framing contract.
        channel.pop_exact(&mut payload).map_err(|_| IpcError::ProtocolViolation {
            detail: format!("{tag:?} record: truncated payload ({size} bytes advertised)"),
        })?;

        Ok(Message { tag, payload })
    }
}
