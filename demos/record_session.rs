//! Recording Session Demo
//!
//! Simulates a sender that fragments H.264 frames onto the wire alongside a
//! raw audio stream, feeds everything through a framesync session backed by
//! an in-memory sink, and prints the sync assessment at teardown.
//!
//! To run: cargo run --example record_session

use anyhow::Context;
use framesync::{
    FormatMetadata, FrameSync, GlobalConfig, ManualClock, MediaStreamParams, MemorySink,
    PresentationTime, SessionConfig, SyncAnalyzer, WireFormat,
};

const FPS: i64 = 30;
const SECONDS: i64 = 3;
// 1024 mono 16-bit samples
const AUDIO_UNIT_BYTES: usize = 2048;

fn main() -> anyhow::Result<()> {
    let framesync = FrameSync::init_with(
        GlobalConfig::default()
            .with_debug_logging(true)
            .with_log_filter("framesync_media=debug,info"),
    )?;

    let clock = ManualClock::new(0);
    let session_clock = clock.clone();
    let session = framesync.open_session_with::<MemorySink>(
        "demo.mp4",
        SessionConfig::new(MediaStreamParams::new(1280, 720, FPS as u32).with_need_encode(true)),
        move |options| options.with_clock(session_clock),
    )?;

    println!("Recording session {}", session.session_id());

    let metadata = FormatMetadata::new(vec![0x67, 0x42, 0x00, 0x1F], vec![0x68, 0xCE, 0x3C, 0x80]);
    session
        .write_video(&metadata.to_unit(), false)
        .context("format metadata rejected")?;

    for frame in 0..=FPS * SECONDS {
        let nal_type = if frame % FPS == 0 { 0x65 } else { 0x41 };
        let mut payload = vec![0, 0, 0x04, 0x00, nal_type];
        payload.resize(4 + 1024, 0xAB);

        let unit = WireFormat::encode_video_unit(PresentationTime::new(frame * 3000, 90_000), &payload);
        for fragment in WireFormat::fragment_unit(&unit, 300)? {
            session.write_video(&fragment, true)?;
        }

        // Audio trails video by a few frames
        if frame % 4 == 3 {
            let outcome = session.write_audio(&vec![0x10; AUDIO_UNIT_BYTES])?;
            if outcome.silence_units > 0 {
                println!(
                    "frame {:>3}: {} silence unit(s) inserted",
                    frame, outcome.silence_units
                );
            }
        }
        clock.advance(33);
    }

    let report = session.close()?;
    let assessment = SyncAnalyzer::new().analyze(&report);

    println!(
        "video {}/{} frames, audio {}/{} units",
        report.video_frame_count,
        report.expected_video_frames,
        report.audio_sample_count,
        report.expected_audio_samples
    );
    println!("{}", assessment.to_json()?);
    Ok(())
}
