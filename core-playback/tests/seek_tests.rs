//! Two-party seek coordination between the engine and the reader.

mod support;

use bridge_traits::engine::EngineEvent;
use bridge_traits::error::{ReaderError, SeekRejection};
use bridge_traits::media::{SeekTarget, TrackType};
use core_playback::{ErrorSeverity, SeekError, StateKind};
use core_runtime::events::{CoordinatorEvent, NextFrameStatus};
use std::time::Duration;
use support::*;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

async fn running(reader: std::sync::Arc<FakeReader>) -> Harness {
    let h = Harness::start(reader, FakeEngineFactory::new());
    h.wait_for_state(StateKind::RunningEngine).await;
    h
}

#[tokio::test]
async fn test_seek_completes_when_engine_and_reader_arrive() {
    let reader = FakeReader::new(audio_only());
    let mut h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let seek = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(5))));
    h.next_event(|e| *e == CoordinatorEvent::SeekStarted { target: secs(5) })
        .await;
    h.next_event(|e| {
        *e == CoordinatorEvent::NextFrameStatus {
            status: NextFrameStatus::UnavailableSeeking,
        }
    })
    .await;
    assert!(engine.calls().contains(&EngineCall::Seek(secs(5))));
    eventually(|| reader.seeks.outstanding() == 1).await;
    assert!(!reader.resets.lock().is_empty());

    engine.set_position(Duration::from_millis(5020));
    engine.emit(EngineEvent::Seeked);
    settle().await;
    assert!(!seek.is_finished());
    assert_eq!(h.coordinator.snapshot().state, StateKind::SeekingData);

    assert!(reader.seeks.release(Ok(secs(5))));
    assert_eq!(seek.await.unwrap(), Ok(()));
    h.next_event(|e| *e == CoordinatorEvent::SeekCompleted { position: secs(5) })
        .await;
    h.wait_for_state(StateKind::RunningEngine).await;

    assert_eq!(h.coordinator.snapshot().position, secs(5));
    // Pumping restarts from the new position.
    eventually(|| reader.audio.outstanding() == 1).await;
}

#[tokio::test]
async fn test_engine_seeked_before_target_is_ignored() {
    let reader = FakeReader::new(audio_only());
    let h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let seek = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(5))));
    eventually(|| reader.seeks.outstanding() == 1).await;
    assert!(reader.seeks.release(Ok(secs(5))));

    engine.set_position(secs(4));
    engine.emit(EngineEvent::Seeked);
    settle().await;
    assert!(!seek.is_finished());

    engine.set_position(secs(5));
    engine.emit(EngineEvent::Seeked);
    assert_eq!(seek.await.unwrap(), Ok(()));
    h.wait_for_state(StateKind::RunningEngine).await;
}

#[tokio::test]
async fn test_newer_seek_supersedes_in_flight_seek() {
    let reader = FakeReader::new(audio_only());
    let h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let first = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(3))));
    eventually(|| reader.seeks.outstanding() == 1).await;
    let second = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(7))));

    assert_eq!(first.await.unwrap(), Err(SeekError::Superseded));
    eventually(|| reader.seeks.calls() == 2).await;
    assert_eq!(
        reader
            .seek_targets
            .lock()
            .iter()
            .map(|t| t.time)
            .collect::<Vec<_>>(),
        vec![secs(3), secs(7)]
    );
    // The first reader seek was abandoned with its request.
    eventually(|| reader.seeks.outstanding() == 1).await;

    engine.set_position(secs(7));
    engine.emit(EngineEvent::Seeked);
    assert!(reader.seeks.release(Ok(secs(7))));
    assert_eq!(second.await.unwrap(), Ok(()));
    assert_eq!(h.coordinator.snapshot().position, secs(7));
}

#[tokio::test]
async fn test_seeks_before_engine_ready_are_coalesced() {
    let reader = FakeReader::new(audio_only());
    let h = Harness::start(reader.clone(), FakeEngineFactory::holding_init());
    h.wait_for_state(StateKind::InitEngine).await;
    eventually(|| h.factory.init.outstanding() == 1).await;

    let first = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(3))));
    let second = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(7))));
    assert_eq!(first.await.unwrap(), Err(SeekError::Superseded));
    assert_eq!(reader.seeks.calls(), 0);

    assert!(h.factory.init.release(Ok(())));
    eventually(|| reader.seeks.outstanding() == 1).await;

    let engine = h.factory.latest();
    assert!(engine.calls().contains(&EngineCall::Seek(secs(7))));
    assert!(!engine.calls().contains(&EngineCall::Seek(secs(3))));
    assert_eq!(reader.seek_targets.lock()[0].time, secs(7));

    engine.set_position(secs(7));
    engine.emit(EngineEvent::Seeked);
    assert!(reader.seeks.release(Ok(secs(7))));
    assert_eq!(second.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_unsupported_seek_kinds_are_rejected() {
    let reader = FakeReader::new(audio_video());
    let h = running(reader.clone()).await;

    assert_eq!(
        h.coordinator.seek(SeekTarget::next_frame(secs(1))).await,
        Err(SeekError::Unsupported)
    );
    assert_eq!(
        h.coordinator
            .seek(SeekTarget::accurate(secs(1)).with_video_only(true))
            .await,
        Err(SeekError::Unsupported)
    );
    assert_eq!(reader.seeks.calls(), 0);
    assert_eq!(h.coordinator.snapshot().state, StateKind::RunningEngine);
}

#[tokio::test]
async fn test_reader_seek_waits_for_data_then_retries() {
    let reader = FakeReader::new(audio_only());
    reader.seeks.queue(Err(SeekRejection::new(
        TrackType::Audio,
        ReaderError::WaitingForData,
    )));
    let h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let seek = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(5))));
    eventually(|| reader.waits.outstanding() == 1).await;
    assert_eq!(*reader.waited_tracks.lock(), vec![TrackType::Audio]);
    assert_eq!(reader.seeks.calls(), 1);

    assert!(reader.waits.release(Ok(TrackType::Audio)));
    eventually(|| reader.seeks.outstanding() == 1).await;
    assert_eq!(reader.seeks.calls(), 2);

    engine.set_position(secs(5));
    engine.emit(EngineEvent::Seeked);
    assert!(reader.seeks.release(Ok(secs(5))));
    assert_eq!(seek.await.unwrap(), Ok(()));

    // The engine is only asked to seek once.
    let engine_seeks = engine
        .calls()
        .into_iter()
        .filter(|c| matches!(c, EngineCall::Seek(_)))
        .count();
    assert_eq!(engine_seeks, 1);
}

#[tokio::test]
async fn test_canceled_reader_seek_is_reissued() {
    let reader = FakeReader::new(audio_only());
    reader.seeks.queue(Err(SeekRejection::new(
        TrackType::Audio,
        ReaderError::Canceled,
    )));
    let h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let seek = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(5))));
    eventually(|| reader.seeks.calls() == 2).await;
    eventually(|| reader.seeks.outstanding() == 1).await;
    assert_eq!(
        reader
            .seek_targets
            .lock()
            .iter()
            .map(|t| t.time)
            .collect::<Vec<_>>(),
        vec![secs(5), secs(5)]
    );
    assert!(!h.coordinator.snapshot().has_error());
    assert_eq!(h.coordinator.snapshot().state, StateKind::SeekingData);

    engine.set_position(secs(5));
    engine.emit(EngineEvent::Seeked);
    assert!(reader.seeks.release(Ok(secs(5))));
    assert_eq!(seek.await.unwrap(), Ok(()));
    assert!(!h.coordinator.snapshot().has_error());
}

#[tokio::test]
async fn test_reader_seek_past_end_completes_reader_side() {
    let reader = FakeReader::new(audio_only());
    reader.seeks.queue(Err(SeekRejection::new(
        TrackType::Audio,
        ReaderError::EndOfStream,
    )));
    let h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let seek = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(60))));
    eventually(|| engine.calls().contains(&EngineCall::EndOfStream(TrackType::Audio))).await;

    engine.set_position(secs(60));
    engine.emit(EngineEvent::Seeked);
    assert_eq!(seek.await.unwrap(), Ok(()));
    assert!(!h.coordinator.snapshot().has_error());
}

#[tokio::test]
async fn test_reader_seek_failure_is_fatal() {
    let reader = FakeReader::new(audio_only());
    reader.seeks.queue(Err(SeekRejection::new(
        TrackType::Audio,
        ReaderError::Demux("bad index".to_string()),
    )));
    let mut h = running(reader.clone()).await;

    let result = h.coordinator.seek(SeekTarget::accurate(secs(5))).await;
    assert!(matches!(result, Err(SeekError::Failed(_))));

    match h
        .next_event(|e| matches!(e, CoordinatorEvent::Error { .. }))
        .await
    {
        CoordinatorEvent::Error { severity, name, .. } => {
            assert_eq!(severity, ErrorSeverity::Fatal);
            assert_eq!(name, "DEMUX_ERR");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(h.coordinator.snapshot().has_fatal_error());
}

#[tokio::test]
async fn test_timeupdate_ignored_while_seeking() {
    let reader = FakeReader::new(audio_only());
    let h = running(reader.clone()).await;
    let engine = h.factory.latest();

    let _seek = tokio::spawn(h.coordinator.seek(SeekTarget::accurate(secs(5))));
    h.wait_for_state(StateKind::SeekingData).await;

    engine.set_position(secs(2));
    engine.emit(EngineEvent::Timeupdate);
    settle().await;
    assert_eq!(h.coordinator.snapshot().position, Duration::ZERO);
}
