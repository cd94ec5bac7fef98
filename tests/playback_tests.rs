//! Playback and say: dispatch, job bracketing, break handling.

mod common;

use common::{MockSession, scripted_vad, wait_for};
use ivs_engine::{
    EngineError, EngineEvent, EventKind, IvsInstance, PlaybackHandle, ProcessContext, VadState,
};
use std::sync::Arc;

fn setup() -> (Arc<MockSession>, IvsInstance, Arc<ProcessContext>) {
    let session = MockSession::new();
    let process = ProcessContext::new();
    let instance = IvsInstance::new(session.clone(), Arc::clone(&process)).unwrap();
    (session, instance, process)
}

fn drain(instance: &IvsInstance) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Some(e) = instance.get_event() {
        events.push(e);
    }
    events
}

#[test]
fn test_sync_playback_of_existing_file() {
    let (session, instance, process) = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompt.wav");
    std::fs::write(&path, b"riff").unwrap();
    let path = path.to_str().unwrap().to_string();

    let handle = instance.playback(&path, false, false).unwrap();
    assert_eq!(handle, PlaybackHandle::Done);
    assert_eq!(*session.played.lock(), vec![path]);
    assert!(!instance.is_playing());
    process.shutdown();
}

#[test]
fn test_missing_file_is_not_found() {
    let (session, instance, process) = setup();
    let err = instance
        .playback("/nonexistent/prompt.wav", false, false)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert!(session.played.lock().is_empty());
    process.shutdown();
}

#[test]
fn test_stream_url_skips_existence_check() {
    let (session, instance, process) = setup();
    let url = "http://media.example/prompt.wav";
    instance.playback(url, false, false).unwrap();
    assert_eq!(*session.played.lock(), vec![url.to_string()]);
    process.shutdown();
}

#[test]
fn test_say_requires_a_tts_engine() {
    let (_session, instance, process) = setup();
    let err = instance.say("hello", None, false).unwrap_err();
    assert!(matches!(err, EngineError::Initialization(_)));
    process.shutdown();
}

#[test]
fn test_say_requires_a_language() {
    let (session, instance, process) = setup();
    instance.set_tts_engine(Some("piper".into()));
    let err = instance.say("hello", None, false).unwrap_err();
    assert!(matches!(err, EngineError::Initialization(_)));
    assert!(session.spoken.lock().is_empty());
    process.shutdown();
}

#[test]
fn test_say_uses_configured_engine_and_language() {
    let (session, instance, process) = setup();
    instance.set_tts_engine(Some("piper".into()));
    instance.set_language(Some("sv".into()));

    instance.say("hej", None, false).unwrap();
    instance.say("hi", Some("en"), false).unwrap();

    let spoken = session.spoken.lock();
    assert_eq!(spoken[0], ("piper".into(), "sv".into(), "hej".into()));
    assert_eq!(spoken[1], ("piper".into(), "en".into(), "hi".into()));
    process.shutdown();
}

#[test]
fn test_say_prefix_routes_playback_to_tts() {
    let (session, instance, process) = setup();
    instance.set_tts_engine(Some("piper".into()));
    instance.set_language(Some("en".into()));
    instance.playback("say://good morning", false, false).unwrap();

    assert!(session.played.lock().is_empty());
    assert_eq!(session.spoken.lock()[0].2, "good morning");
    process.shutdown();
}

#[test]
fn test_async_job_is_bracketed_by_events() {
    let (session, instance, process) = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompt.wav");
    std::fs::write(&path, b"riff").unwrap();
    let path = path.to_str().unwrap().to_string();

    let PlaybackHandle::Job(job_id) = instance.playback(&path, false, true).unwrap() else {
        panic!("expected an async job");
    };
    assert!(job_id >= 1);

    let mut events = Vec::new();
    assert!(wait_for(
        || {
            events.extend(drain(&instance));
            events.iter().any(|e| e.kind.name() == "playback-stop")
        },
        3000
    ));

    let start = events
        .iter()
        .position(|e| e.kind.name() == "playback-start")
        .unwrap();
    let stop = events
        .iter()
        .position(|e| e.kind.name() == "playback-stop")
        .unwrap();
    assert!(start < stop);
    for i in [start, stop] {
        assert_eq!(events[i].job_id, job_id);
        match &events[i].kind {
            EventKind::PlaybackStart { tag } | EventKind::PlaybackStop { tag } => {
                assert_eq!(*tag, path)
            }
            other => panic!("unexpected kind {}", other.name()),
        }
    }
    assert_eq!(*session.played.lock(), vec![path]);
    process.shutdown();
}

#[test]
fn test_async_say_job_is_tagged() {
    let (session, instance, process) = setup();
    instance.set_tts_engine(Some("piper".into()));
    instance.set_language(Some("en".into()));

    let PlaybackHandle::Job(job_id) = instance.say("hello", None, true).unwrap() else {
        panic!("expected an async job");
    };

    let mut events = Vec::new();
    assert!(wait_for(
        || {
            events.extend(drain(&instance));
            events.iter().any(|e| e.kind.name() == "playback-stop")
        },
        3000
    ));
    let stop = events
        .iter()
        .find(|e| e.kind.name() == "playback-stop")
        .unwrap();
    assert_eq!(stop.job_id, job_id);
    assert!(matches!(&stop.kind, EventKind::PlaybackStop { tag } if tag == "SAY"));
    assert_eq!(session.spoken.lock()[0].2, "hello");
    process.shutdown();
}

#[test]
fn test_playback_stop_breaks_a_blocking_play() {
    let (session, instance, process) = setup();
    session.set_play_block(true);

    instance
        .playback("http://media.example/stream.wav", false, true)
        .unwrap();
    assert!(wait_for(|| instance.is_playing(), 2000));

    instance.playback_stop().unwrap();
    assert!(wait_for(|| !instance.is_playing(), 2000));
    process.shutdown();
}

#[test]
fn test_playback_stop_without_playback_is_a_no_op() {
    let (_session, instance, process) = setup();
    instance.playback_stop().unwrap();
    process.shutdown();
}

#[test]
fn test_async_job_deletes_the_file_afterwards() {
    let (_session, instance, process) = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("once.wav");
    std::fs::write(&path, b"riff").unwrap();

    instance
        .playback(path.to_str().unwrap(), true, true)
        .unwrap();
    assert!(wait_for(|| !path.exists(), 3000));
    process.shutdown();
}

#[test]
fn test_playback_frames_feed_an_active_capture() {
    let (session, instance, process) = setup();
    instance.set_vad_factory(scripted_vad(vec![VadState::StartTalking, VadState::Talking]));
    instance.capture_start("audio", None, None).unwrap();
    assert!(instance.is_capture_active());

    session.set_play_frames(5);
    instance
        .playback("http://media.example/stream.wav", false, false)
        .unwrap();

    assert!(wait_for(
        || drain(&instance)
            .iter()
            .any(|e| e.kind.name() == "speaking-start"),
        3000
    ));
    process.shutdown();
}
