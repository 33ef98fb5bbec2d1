//! Object-safe playback interface.
//!
//! Hosts drive a replayer through this trait without caring which
//! worker core sits behind it. The trait mirrors the lifecycle of the
//! underlying bridge: a song is loaded, runtime options applied, then
//! audio is pulled in bounded requests.

/// Playback state for song players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No song admitted, or playback stopped.
    #[default]
    Stopped,
    /// Actively producing audio on request.
    Playing,
    /// Paused; the worker keeps its state but render calls emit silence.
    Paused,
    /// The current song reached its end.
    Ended,
}

/// Object-safe player interface.
///
/// All playback functionality without associated types, usable as a
/// trait object (`Box<dyn SongPlayer>`).
pub trait SongPlayer {
    /// Start or resume playback.
    fn play(&mut self);

    /// Pause playback (keeps worker state).
    fn pause(&mut self);

    /// Stop playback and discard the current song's progress.
    fn stop(&mut self);

    /// Current playback state.
    fn state(&self) -> PlaybackState;

    /// Check if currently playing.
    fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Fill `buffer` with interleaved stereo 16-bit frames.
    ///
    /// When stopped, paused or ended the buffer is filled with silence.
    fn generate_samples_into(&mut self, buffer: &mut [i16]);

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32 {
        crate::DEFAULT_SAMPLE_RATE
    }

    /// Number of subsongs in the admitted song.
    fn subsong_count(&self) -> usize {
        1
    }

    /// Currently selected subsong number.
    fn current_subsong(&self) -> u32 {
        0
    }

    /// Switch to a different subsong.
    ///
    /// Returns `true` on success. Default returns `false` (no subsong
    /// support).
    fn set_subsong(&mut self, _subsong: u32) -> bool {
        false
    }

    /// Whether the admitted song exposes more than one subsong.
    fn has_subsongs(&self) -> bool {
        self.subsong_count() > 1
    }
}
