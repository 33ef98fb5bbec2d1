//! Song metadata shared between the worker admission reply and hosts.
//!
//! Exotic Amiga formats rarely carry rich tags; what the worker can
//! report reliably is the detected format, the replayer (player binary)
//! name and the subsong range, so that is what lives here.

/// Inclusive subsong range reported by the worker at admission time.
///
/// Subsong numbering is format-defined; many formats start at 0, some
/// at 1. `current` is the subsong the worker selected for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsongRange {
    /// Lowest valid subsong number.
    pub min: u32,
    /// Highest valid subsong number.
    pub max: u32,
    /// Subsong currently selected.
    pub current: u32,
}

impl SubsongRange {
    /// Number of subsongs in the range.
    pub fn count(&self) -> u32 {
        self.max.saturating_sub(self.min) + 1
    }

    /// Whether `subsong` falls inside the range.
    pub fn contains(&self, subsong: u32) -> bool {
        (self.min..=self.max).contains(&subsong)
    }
}

impl Default for SubsongRange {
    fn default() -> Self {
        Self { min: 0, max: 0, current: 0 }
    }
}

/// Read access to playback metadata.
pub trait MetadataFields {
    /// Detected format name (e.g. "Protracker", "Future Composer 1.4").
    fn format(&self) -> &str;

    /// Name of the player binary driving the song, if known.
    fn player(&self) -> &str {
        ""
    }

    /// Module (song file) name, if known.
    fn module(&self) -> &str {
        ""
    }

    /// Subsong range for the admitted song.
    fn subsongs(&self) -> SubsongRange {
        SubsongRange::default()
    }
}

/// Metadata container filled in from the worker's admission reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongMetadata {
    /// Detected format name.
    pub format: String,
    /// Player binary name.
    pub player: String,
    /// Module name.
    pub module: String,
    /// Subsong range.
    pub subsongs: SubsongRange,
}

impl MetadataFields for SongMetadata {
    fn format(&self) -> &str {
        &self.format
    }

    fn player(&self) -> &str {
        &self.player
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn subsongs(&self) -> SubsongRange {
        self.subsongs
    }
}
