//! Bounded byte ring channels for the command and response directions.
//!
//! Each channel is a fixed-capacity circular byte buffer with
//! monotonically increasing head (write) and tail (read) cursors,
//! masked by `capacity - 1`. One slot is permanently reserved so a full
//! buffer is distinguishable from an empty one.
//!
//! The two bridge channels are single-producer/single-consumer by
//! protocol design. [`channel_pair`] hands out a [`ChannelProducer`]
//! and a [`ChannelConsumer`] over the same shared ring so the roles are
//! enforced structurally rather than by code-path discipline.

use crate::error::{IpcError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Default channel capacity: 256 KiB per direction.
pub const DEFAULT_CAPACITY: usize = 1 << 18;

/// Fixed-capacity circular byte buffer.
#[derive(Debug)]
pub struct RingChannel {
    buffer: Box<[u8]>,
    /// Monotonic write cursor; index is `head & mask`.
    head: usize,
    /// Monotonic read cursor; index is `tail & mask`.
    tail: usize,
    capacity: usize,
    mask: usize,
}

impl RingChannel {
    /// Create a ring channel. Capacity is rounded up to the next power
    /// of two.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested capacity is 0 or would exceed
    /// the maximum safe allocation (16 MiB — far beyond what the
    /// protocol ever buffers).
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(IpcError::Config(
                "ring channel capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();

        const MAX_CAPACITY: usize = 16 * 1024 * 1024;
        if capacity > MAX_CAPACITY {
            return Err(IpcError::Config(format!(
                "ring channel capacity {capacity} exceeds maximum safe size {MAX_CAPACITY}"
            )));
        }

        Ok(RingChannel {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            capacity,
            mask: capacity - 1,
        })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes buffered and readable.
    pub fn available_data(&self) -> usize {
        self.head.wrapping_sub(self.tail)
    }

    /// Number of bytes writable. One slot stays reserved.
    pub fn available_space(&self) -> usize {
        self.capacity - 1 - self.available_data()
    }

    /// Write all of `src`, or nothing.
    ///
    /// Commands must never be partially delivered, so the write is
    /// all-or-nothing: on `ChannelFull` the cursors are untouched.
    pub fn push(&mut self, src: &[u8]) -> Result<()> {
        let space = self.available_space();
        if space < src.len() {
            return Err(IpcError::ChannelFull {
                needed: src.len(),
                available: space,
            });
        }

        let write_idx = self.head & self.mask;
        if write_idx + src.len() <= self.capacity {
            self.buffer[write_idx..write_idx + src.len()].copy_from_slice(src);
        } else {
            // Wrap-around write
            let first_part = self.capacity - write_idx;
            self.buffer[write_idx..].copy_from_slice(&src[..first_part]);
            self.buffer[..src.len() - first_part].copy_from_slice(&src[first_part..]);
        }

        self.head = self.head.wrapping_add(src.len());
        Ok(())
    }

    /// Read up to `dest.len()` bytes, returning how many were copied.
    ///
    /// # Errors
    ///
    /// Returns `ChannelEmpty` when nothing is buffered; the caller is
    /// expected to drive the worker and retry rather than block.
    pub fn pop(&mut self, dest: &mut [u8]) -> Result<usize> {
        let available = self.available_data();
        if available == 0 {
            return Err(IpcError::ChannelEmpty);
        }

        let to_read = dest.len().min(available);
        let read_idx = self.tail & self.mask;
        if read_idx + to_read <= self.capacity {
            dest[..to_read].copy_from_slice(&self.buffer[read_idx..read_idx + to_read]);
        } else {
            // Wrap-around read
            let first_part = self.capacity - read_idx;
            dest[..first_part].copy_from_slice(&self.buffer[read_idx..]);
            dest[first_part..to_read].copy_from_slice(&self.buffer[..to_read - first_part]);
        }

        self.tail = self.tail.wrapping_add(to_read);
        Ok(to_read)
    }

    /// Read exactly `dest.len()` bytes, or nothing.
    ///
    /// Returns `ChannelEmpty` when fewer bytes than requested are
    /// buffered, leaving the cursors untouched. Used by the message
    /// codec, which relies on records being pushed atomically.
    pub fn pop_exact(&mut self, dest: &mut [u8]) -> Result<()> {
        if self.available_data() < dest.len() {
            return Err(IpcError::ChannelEmpty);
        }
        let n = self.pop(dest)?;
        debug_assert_eq!(n, dest.len());
        Ok(())
    }

    /// Discard all buffered data and rewind both cursors.
    ///
    /// Called on each new song-load cycle to remove stale records from
    /// previous play/stop cycles or failed loads.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

/// Create a shared ring channel split into its producer and consumer
/// handles.
pub fn channel_pair(capacity: usize) -> Result<(ChannelProducer, ChannelConsumer)> {
    let ring = Arc::new(Mutex::new(RingChannel::new(capacity)?));
    Ok((
        ChannelProducer { ring: Arc::clone(&ring) },
        ChannelConsumer { ring },
    ))
}

/// Write-side handle to a shared ring channel.
#[derive(Debug, Clone)]
pub struct ChannelProducer {
    ring: Arc<Mutex<RingChannel>>,
}

impl ChannelProducer {
    /// All-or-nothing write of `src`.
    pub fn push(&self, src: &[u8]) -> Result<()> {
        self.ring.lock().push(src)
    }

    /// Writable space in bytes.
    pub fn available_space(&self) -> usize {
        self.ring.lock().available_space()
    }

    /// Discard everything buffered in the channel.
    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}

/// Read-side handle to a shared ring channel.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    ring: Arc<Mutex<RingChannel>>,
}

impl ChannelConsumer {
    /// Read up to `dest.len()` bytes.
    pub fn pop(&self, dest: &mut [u8]) -> Result<usize> {
        self.ring.lock().pop(dest)
    }

    /// Read exactly `dest.len()` bytes, or nothing.
    pub fn pop_exact(&self, dest: &mut [u8]) -> Result<()> {
        self.ring.lock().pop_exact(dest)
    }

    /// Readable bytes currently buffered.
    pub fn available_data(&self) -> usize {
        self.ring.lock().available_data()
    }

    /// Discard everything buffered in the channel.
    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}
