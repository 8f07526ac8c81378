//! Integration tests for the facade: configuration, shared handles and
//! async wrappers

use framesync::*;
use std::thread;

fn metadata_unit() -> bytes::Bytes {
    FormatMetadata::new(vec![0x67, 0x42, 0x00, 0x1E], vec![0x68, 0xCE, 0x38, 0x80]).to_unit()
}

fn frame_unit(ms: i64, key: bool) -> bytes::Bytes {
    let nal_type = if key { 0x65 } else { 0x41 };
    WireFormat::encode_video_unit(PresentationTime::new(ms, 1000), &[0, 0, 0, 2, nal_type, 0x88])
}

fn open(framesync: &FrameSync, config: SessionConfig) -> SharedSession<MemorySink> {
    framesync
        .open_session_with::<MemorySink>("shared.mp4", config, |options| {
            options.with_clock(ManualClock::new(0))
        })
        .unwrap()
}

// ============================================================================
// SHARED HANDLE
// ============================================================================

#[test]
fn test_concurrent_audio_writers_are_serialized() {
    let framesync = FrameSync::init().unwrap();
    let session = open(
        &framesync,
        SessionConfig::new(MediaStreamParams::default().with_need_encode(true))
            .with_audio_unit(125, 4),
    );

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    session.write_audio(&[1, 2, 3, 4]).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let timeline = session.timeline().unwrap();
    assert_eq!(timeline.audio_chunk_count(), 100);
    assert_eq!(timeline.audio_sample_count(), 100);

    let report = session.close().unwrap();
    assert_eq!(report.audio_sample_count, 100);
    assert!(session.is_closed());
}

#[test]
fn test_end_to_end_through_facade() {
    let framesync = FrameSync::init_with(
        GlobalConfig::default().with_default_params(MediaStreamParams::new(1920, 1080, 30)),
    )
    .unwrap();
    let session = open(&framesync, framesync.session_config());

    session.write_video(&metadata_unit(), false).unwrap();
    for (ms, key) in [(0, true), (33, false), (66, false)] {
        let fragments = WireFormat::fragment_unit(&frame_unit(ms, key), 8).unwrap();
        for fragment in fragments {
            session.write_video(&fragment, true).unwrap();
        }
    }

    assert_eq!(
        session.state(),
        SessionState::Open(TimelinePhase::VideoStarted)
    );
    let report = session.close().unwrap();
    assert_eq!(report.video_frame_count, 3);
    assert_eq!(report.last_video_remote_ms, 66);
    assert!(matches!(
        session.write_video(&frame_unit(99, false), false),
        Err(MediaError::InvalidState { .. })
    ));
}

// ============================================================================
// ASYNC WRAPPERS
// ============================================================================

#[tokio::test]
async fn test_async_writes() {
    let framesync = FrameSync::init().unwrap();
    let session = open(&framesync, SessionConfig::default());

    let outcome = session.write_video_async(metadata_unit(), false).await.unwrap();
    assert_eq!(outcome, VideoOutcome::FormatUpdated { update_count: 1 });

    let outcome = session.write_video_async(frame_unit(0, true), false).await.unwrap();
    assert!(matches!(
        outcome,
        VideoOutcome::Written {
            is_key_frame: true,
            ..
        }
    ));

    let outcome = session.write_audio_async(vec![9u8; 32]).await.unwrap();
    assert_eq!(outcome.units_written, 1);

    let report = session.close_async().await.unwrap();
    assert_eq!(report.video_frame_count, 1);
    assert!(session.close_async().await.is_err());
}

#[test]
fn test_async_with_block_on() {
    let framesync = FrameSync::init().unwrap();
    let session = open(&framesync, SessionConfig::default());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let result = runtime.block_on(session.write_audio_async(vec![1u8; 8]));
    assert_eq!(result.unwrap().units_written, 1);

    // Immediate futures resolve without a runtime
    assert!(tokio_test::block_on(async { session.report() }).is_ok());
}
