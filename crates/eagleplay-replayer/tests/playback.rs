//! End-to-end playback through the public crate surface: load a song
//! into a scripted worker core, drive it with the `SongPlayer` trait,
//! and check the PCM that comes back.

use anyhow::Result;
use eagleplay_common::{PlaybackState, SongPlayer, SubsongRange};
use eagleplay_ipc::{Admission, CoreIo, EmuConfig, RuntimeOption, SongBundle, WorkerCore};
use eagleplay_replayer::{Replayer, ReplayerError};

/// Scripted core: each subsong plays a distinct deterministic byte
/// ramp so renders are checkable sample by sample across switches.
struct RampCore {
    subsong: u32,
    produced: usize,
    song_len: usize,
}

impl RampCore {
    fn new(song_len: usize) -> Self {
        RampCore { subsong: 0, produced: 0, song_len }
    }

    fn byte_at(&self, index: usize) -> u8 {
        (self.subsong as u8).wrapping_mul(50).wrapping_add(index as u8)
    }
}

impl WorkerCore for RampCore {
    fn configure(&mut self, _config: &EmuConfig) -> eagleplay_ipc::Result<()> {
        Ok(())
    }

    fn admit_song(&mut self, song: &SongBundle) -> Admission {
        if song.score.is_empty() || song.score == b"noise" {
            return Admission::Rejected { reason: "not a ramp score".into() };
        }
        Admission::Accepted {
            format: "Ramp".into(),
            player: "ramp-player".into(),
            subsongs: SubsongRange { min: 0, max: 2, current: 0 },
        }
    }

    fn apply_option(&mut self, option: RuntimeOption) -> eagleplay_ipc::Result<()> {
        if let RuntimeOption::Subsong(n) = option {
            self.subsong = n;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.subsong = 0;
        self.produced = 0;
    }

    fn run_slice(&mut self, io: &mut CoreIo<'_>) -> eagleplay_ipc::Result<()> {
        while !io.should_yield() {
            if self.produced >= self.song_len {
                io.signal_song_end(0, "ramp complete")?;
                break;
            }
            let want = io
                .remaining_bytes()
                .min(128)
                .min(self.song_len - self.produced);
            let chunk: Vec<u8> = (0..want).map(|i| self.byte_at(self.produced + i)).collect();
            let taken = io.push_pcm(&chunk)?;
            self.produced += taken;
        }
        Ok(())
    }
}

fn expected_samples(subsong: u32, samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let lo = (subsong as u8).wrapping_mul(50).wrapping_add((i * 2) as u8);
            let hi = (subsong as u8).wrapping_mul(50).wrapping_add((i * 2 + 1) as u8);
            i16::from_le_bytes([lo, hi])
        })
        .collect()
}

#[test]
fn test_load_play_render_cycle() -> Result<()> {
    let mut player = Replayer::new(RampCore::new(1 << 16))?;
    let meta = player.load_song("ramp.mod", b"ramp score", None)?;
    assert_eq!(meta.format, "Ramp");
    assert_eq!(meta.player, "ramp-player");
    assert_eq!(meta.module, "ramp.mod");
    assert_eq!(meta.subsongs.count(), 3);

    player.play();
    assert_eq!(player.state(), PlaybackState::Playing);

    let mut buffer = vec![0i16; 256];
    player.generate_samples_into(&mut buffer);
    assert_eq!(buffer, expected_samples(0, 256));
    Ok(())
}

#[test]
fn test_subsong_switch_changes_audio() -> Result<()> {
    let mut player = Replayer::new(RampCore::new(1 << 16))?;
    player.load_song("ramp.mod", b"ramp score", None)?;
    player.play();

    player.select_subsong(2)?;
    assert_eq!(player.current_subsong(), 2);
    assert!(player.is_playing());

    let mut buffer = vec![0i16; 64];
    player.generate_samples_into(&mut buffer);
    assert_eq!(buffer, expected_samples(2, 64));
    Ok(())
}

#[test]
fn test_invalid_subsong_is_rejected_without_side_effects() -> Result<()> {
    let mut player = Replayer::new(RampCore::new(1 << 16))?;
    player.load_song("ramp.mod", b"ramp score", None)?;
    player.play();

    let err = player.select_subsong(7).unwrap_err();
    assert!(matches!(
        err,
        ReplayerError::InvalidSubsong { requested: 7, min: 0, max: 2 }
    ));
    assert!(player.is_playing());

    let mut buffer = vec![0i16; 32];
    player.generate_samples_into(&mut buffer);
    assert_eq!(buffer, expected_samples(0, 32));
    Ok(())
}

#[test]
fn test_rejected_score_surfaces_reason() -> Result<()> {
    let mut player = Replayer::new(RampCore::new(64))?;
    match player.load_song("noise.mod", b"noise", None) {
        Err(ReplayerError::Rejected { reason }) => assert_eq!(reason, "not a ramp score"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(player.metadata().is_none());
    Ok(())
}

#[test]
fn test_stop_and_replay_restart_the_song() -> Result<()> {
    let mut player = Replayer::new(RampCore::new(1 << 16))?;
    player.load_song("ramp.mod", b"ramp score", None)?;
    player.play();

    let mut buffer = vec![0i16; 128];
    player.generate_samples_into(&mut buffer);

    player.stop();
    assert_eq!(player.state(), PlaybackState::Stopped);

    player.play();
    player.generate_samples_into(&mut buffer);
    assert_eq!(buffer, expected_samples(0, 128));
    Ok(())
}

#[test]
fn test_song_end_is_reported_and_replayable() -> Result<()> {
    // 200 bytes = 100 samples; the first render outlives the song.
    let mut player = Replayer::new(RampCore::new(200))?;
    player.load_song("short.mod", b"ramp score", None)?;
    player.play();

    let mut buffer = vec![55i16; 128];
    player.generate_samples_into(&mut buffer);
    assert_eq!(&buffer[..100], &expected_samples(0, 100)[..]);
    assert!(buffer[100..].iter().all(|&s| s == 0));
    assert_eq!(player.state(), PlaybackState::Ended);

    player.play();
    let mut buffer = vec![0i16; 64];
    player.generate_samples_into(&mut buffer);
    assert_eq!(buffer, expected_samples(0, 64));
    Ok(())
}
