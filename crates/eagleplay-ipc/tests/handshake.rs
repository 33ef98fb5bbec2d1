//! End-to-end exercises of the bridge through the transport shim: the
//! full handshake, streaming reads, reboot cycles, and failure paths.

use eagleplay_ipc::{
    Admission, CoreIo, EmuConfig, IpcError, Message, RuntimeOption, SongBundle, Tag,
    TransportShim, WorkerCore, COMMAND_ENDPOINT, RESPONSE_ENDPOINT,
};

/// Deterministic stand-in for the 68k core: each admitted song plays a
/// wrapping byte counter starting at zero, so sample continuity across
/// read requests and reboots is checkable byte by byte.
struct CounterCore {
    next_byte: u8,
    slices: usize,
}

impl CounterCore {
    fn new() -> Self {
        CounterCore { next_byte: 0, slices: 0 }
    }
}

impl WorkerCore for CounterCore {
    fn configure(&mut self, _config: &EmuConfig) -> eagleplay_ipc::Result<()> {
        Ok(())
    }

    fn admit_song(&mut self, song: &SongBundle) -> Admission {
        if song.score == b"bad" {
            return Admission::Rejected { reason: "unrecognized score".into() };
        }
        Admission::Accepted {
            format: "Counter".into(),
            player: "counter-player".into(),
            subsongs: eagleplay_common::SubsongRange { min: 1, max: 4, current: 1 },
        }
    }

    fn apply_option(&mut self, _option: RuntimeOption) -> eagleplay_ipc::Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.next_byte = 0;
    }

    fn run_slice(&mut self, io: &mut CoreIo<'_>) -> eagleplay_ipc::Result<()> {
        self.slices += 1;
        while !io.should_yield() {
            let want = io.remaining_bytes().min(64);
            let chunk: Vec<u8> = (0..want)
                .map(|i| self.next_byte.wrapping_add(i as u8))
                .collect();
            let taken = io.push_pcm(&chunk)?;
            self.next_byte = self.next_byte.wrapping_add(taken as u8);
        }
        Ok(())
    }
}

fn write_exchange(shim: &mut TransportShim<CounterCore>, records: &[Message]) {
    let mut buf = Vec::new();
    for record in records {
        record.encode_into(&mut buf);
    }
    Message::token().encode_into(&mut buf);
    shim.write_to_endpoint(COMMAND_ENDPOINT, &buf).unwrap();
}

/// Drive the handshake up to the Running phase and return the shim.
fn running_shim() -> TransportShim<CounterCore> {
    let mut shim = TransportShim::new(CounterCore::new()).unwrap();

    let config = EmuConfig::default().to_payload().unwrap();
    write_exchange(&mut shim, &[Message::new(Tag::Config, config)]);

    write_exchange(&mut shim, &[Message::new(Tag::Score, b"counter song".to_vec())]);
    let reply = shim.read_response_message().unwrap();
    assert_eq!(reply.tag, Tag::CanPlay);
    loop {
        let msg = shim.read_response_message().unwrap();
        if msg.is_token() {
            break;
        }
        assert!(matches!(msg.tag, Tag::FormatName | Tag::PlayerName));
    }

    write_exchange(&mut shim, &[Message::with_u32(Tag::Subsong, 1)]);
    shim
}

/// Read one full PCM exchange of `bytes` bytes and return the samples.
fn read_pcm(shim: &mut TransportShim<CounterCore>, bytes: u32) -> Vec<u8> {
    write_exchange(shim, &[Message::with_u32(Tag::Read, bytes)]);
    let mut pcm = Vec::new();
    loop {
        let msg = shim.read_response_message().unwrap();
        match msg.tag {
            Tag::Data => pcm.extend_from_slice(&msg.payload),
            Tag::Token => return pcm,
            other => panic!("unexpected {other:?} in data exchange"),
        }
    }
}

#[test]
fn test_full_handshake_reaches_streaming() {
    let mut shim = running_shim();

    let pcm = read_pcm(&mut shim, 512);
    assert_eq!(pcm.len(), 512);
    let expected: Vec<u8> = (0..512).map(|i| i as u8).collect();
    assert_eq!(pcm, expected);
}

#[test]
fn test_admission_reply_carries_names_and_range() -> anyhow::Result<()> {
    let mut shim = TransportShim::new(CounterCore::new())?;
    let config = EmuConfig::default().to_payload()?;
    write_exchange(&mut shim, &[Message::new(Tag::Config, config)]);
    write_exchange(&mut shim, &[Message::new(Tag::Score, b"song".to_vec())]);

    let canplay = shim.read_response_message()?;
    assert_eq!(canplay.tag, Tag::CanPlay);
    assert_eq!(canplay.payload.len(), 12);
    assert_eq!(&canplay.payload[0..4], &1u32.to_be_bytes());
    assert_eq!(&canplay.payload[4..8], &4u32.to_be_bytes());

    let format = shim.read_response_message()?;
    assert_eq!(format.tag, Tag::FormatName);
    assert_eq!(format.str_arg()?, "Counter");

    let player = shim.read_response_message()?;
    assert_eq!(player.tag, Tag::PlayerName);
    assert_eq!(player.str_arg()?, "counter-player");

    assert!(shim.read_response_message()?.is_token());
    Ok(())
}

#[test]
fn test_rejected_song_reports_reason() -> anyhow::Result<()> {
    let mut shim = TransportShim::new(CounterCore::new())?;
    let config = EmuConfig::default().to_payload()?;
    write_exchange(&mut shim, &[Message::new(Tag::Config, config)]);
    write_exchange(&mut shim, &[Message::new(Tag::Score, b"bad".to_vec())]);

    let reply = shim.read_response_message()?;
    assert_eq!(reply.tag, Tag::CantPlay);
    assert_eq!(reply.str_arg()?, "unrecognized score");
    assert!(shim.read_response_message()?.is_token());
    Ok(())
}

#[test]
fn test_buffered_data_needs_no_worker_steps() {
    let mut shim = running_shim();
    let _ = read_pcm(&mut shim, 256);

    // The next request fills the channel in full before we drain it.
    write_exchange(&mut shim, &[Message::with_u32(Tag::Read, 128)]);
    let first = shim.read_response_message().unwrap();
    assert_eq!(first.tag, Tag::Data);

    let slices_before = shim.worker().core().slices;
    let mut raw = [0u8; 32];
    let n = shim.read_from_endpoint(RESPONSE_ENDPOINT, &mut raw).unwrap();
    assert!(n > 0);
    assert_eq!(shim.worker().core().slices, slices_before);
}

#[test]
fn test_sample_continuity_across_read_requests() {
    let mut shim = running_shim();
    let mut all = Vec::new();
    for request in [100u32, 256, 33, 4096] {
        let pcm = read_pcm(&mut shim, request);
        assert_eq!(pcm.len(), request as usize);
        all.extend_from_slice(&pcm);
    }
    for (i, byte) in all.iter().enumerate() {
        assert_eq!(*byte, i as u8, "discontinuity at byte {i}");
    }
}

#[test]
fn test_reboot_and_reload_restarts_stream() {
    let mut shim = running_shim();
    let mut delivered = Vec::new();
    for _ in 0..3 {
        delivered.extend_from_slice(&read_pcm(&mut shim, 256));
    }
    // Nothing lost or duplicated across the three completed cycles.
    let expected: Vec<u8> = (0..768).map(|i| i as u8).collect();
    assert_eq!(delivered, expected);

    write_exchange(&mut shim, &[Message::bare(Tag::Reboot)]);
    assert!(shim.read_response_message().unwrap().is_token());

    // Fresh load from admission; the counter restarts at zero with no
    // leftover bytes from the previous song.
    shim.reset_for_load();
    write_exchange(&mut shim, &[Message::new(Tag::Score, b"again".to_vec())]);
    loop {
        if shim.read_response_message().unwrap().is_token() {
            break;
        }
    }
    write_exchange(&mut shim, &[]);

    let pcm = read_pcm(&mut shim, 128);
    let expected: Vec<u8> = (0..128).map(|i| i as u8).collect();
    assert_eq!(pcm, expected);
}

#[test]
fn test_unknown_tag_surfaces_as_violation() {
    let mut shim = running_shim();

    let mut raw = Vec::new();
    raw.extend_from_slice(&0x99u32.to_be_bytes());
    raw.extend_from_slice(&0u32.to_be_bytes());
    Message::token().encode_into(&mut raw);

    // The write's own worker step trips over the bogus tag.
    assert!(matches!(
        shim.write_to_endpoint(COMMAND_ENDPOINT, &raw),
        Err(IpcError::ProtocolViolation { .. })
    ));
}

#[test]
fn test_read_without_request_stalls() {
    let mut shim = running_shim();
    let mut buf = [0u8; 16];
    assert!(matches!(
        shim.read_from_endpoint(RESPONSE_ENDPOINT, &mut buf),
        Err(IpcError::ProtocolStall { .. })
    ));
}
