//! Playback and TTS, synchronous and as background jobs.
//!
//! Playback itself blocks inside the media session; this module owns the
//! bracketing around it: the playback flag, the break signal, the callbacks
//! that keep live media flowing into the capture queues, and the
//! start/stop event pair published around an async job.

use crate::core::audio::AudioBuffer;
use crate::core::event::{EngineEvent, EventKind};
use crate::core::instance::InstanceShared;
use crate::core::session::{Frame, PlaybackArgs};
use crate::errors::{EngineError, EngineResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Passes waited for a broken playback to unwind, 10ms each
const STOP_WAIT_PASSES: u32 = 500;

/// Frames discarded from the channel before playback starts
const STALE_FRAME_FLUSH: usize = 10;

const SAY_PREFIX: &str = "say://";
const SAY_TAG: &str = "SAY";

/// Play a file, stream URL or `say://` text to the channel, blocking until
/// done or interrupted.
pub(crate) fn playback(shared: &Arc<InstanceShared>, path: &str) -> EngineResult<()> {
    if !shared.take() {
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }
    let result = dispatch(shared, path, None);
    shared.release();
    result
}

/// Speak text through the configured TTS engine, blocking until done
pub(crate) fn say(
    shared: &Arc<InstanceShared>,
    text: &str,
    language: Option<&str>,
) -> EngineResult<()> {
    if !shared.take() {
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }
    let result = with_playback_flag(shared, |args| speak(shared, text, language, args));
    shared.release();
    result
}

/// Spawn an async playback job; `PlaybackStart`/`PlaybackStop` events with
/// the returned job id bracket it.
pub(crate) fn spawn_playback_job(
    shared: &Arc<InstanceShared>,
    path: &str,
    delete_after: bool,
) -> EngineResult<u32> {
    if !shared.take() {
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }

    let job_id = shared.gen_job_id();
    let worker = Arc::clone(shared);
    let path = path.to_string();
    let spawned = shared.process.spawn("ivs-playback", move || {
        worker.push_event(EngineEvent::with_job(
            job_id,
            EventKind::PlaybackStart { tag: path.clone() },
        ));

        if let Err(e) = dispatch(&worker, &path, None) {
            debug!("playback job {job_id} failed: {e}");
        }

        worker.push_event(EngineEvent::with_job(
            job_id,
            EventKind::PlaybackStop { tag: path.clone() },
        ));

        if delete_after {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("played file not deleted: {e}");
            }
        }
        worker.release();
    });

    if let Err(e) = spawned {
        shared.release();
        return Err(EngineError::ResourceUnavailable(format!(
            "playback worker spawn failed: {e}"
        )));
    }
    Ok(job_id)
}

/// Spawn an async say job, bracketed like a playback job with tag `SAY`
pub(crate) fn spawn_say_job(
    shared: &Arc<InstanceShared>,
    text: &str,
    language: Option<&str>,
) -> EngineResult<u32> {
    if !shared.take() {
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }

    let job_id = shared.gen_job_id();
    let worker = Arc::clone(shared);
    let text = text.to_string();
    let language = language.map(str::to_string);
    let spawned = shared.process.spawn("ivs-say", move || {
        worker.push_event(EngineEvent::with_job(
            job_id,
            EventKind::PlaybackStart {
                tag: SAY_TAG.into(),
            },
        ));

        let result = with_playback_flag(&worker, |args| {
            speak(&worker, &text, language.as_deref(), args)
        });
        if let Err(e) = result {
            debug!("say job {job_id} failed: {e}");
        }

        worker.push_event(EngineEvent::with_job(
            job_id,
            EventKind::PlaybackStop {
                tag: SAY_TAG.into(),
            },
        ));
        worker.release();
    });

    if let Err(e) = spawned {
        shared.release();
        return Err(EngineError::ResourceUnavailable(format!(
            "say worker spawn failed: {e}"
        )));
    }
    Ok(job_id)
}

/// Interrupt an in-progress playback and wait for it to unwind
pub(crate) fn playback_stop(shared: &Arc<InstanceShared>) -> EngineResult<()> {
    if !shared.take() {
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }
    let result = stop_and_wait(shared);
    shared.release();
    result
}

fn stop_and_wait(shared: &Arc<InstanceShared>) -> EngineResult<()> {
    if !shared.general.lock().flags.playback {
        return Ok(());
    }

    info!("breaking in-progress playback");
    shared.session.break_playback();

    for _ in 0..STOP_WAIT_PASSES {
        if !shared.general.lock().flags.playback {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    warn!("playback did not stop in time");
    Err(EngineError::Timeout("playback stop".into()))
}

/// Route a playback target: `say://` text, a stream URL, or a local file
fn dispatch(shared: &Arc<InstanceShared>, path: &str, language: Option<&str>) -> EngineResult<()> {
    if let Some(text) = path.strip_prefix(SAY_PREFIX) {
        return with_playback_flag(shared, |args| speak(shared, text, language, args));
    }

    if !path.contains("://") && !shared.session.file_exists(path) {
        return Err(EngineError::NotFound(format!("playback file: {path}")));
    }

    with_playback_flag(shared, |args| shared.session.play_file(path, args))
}

fn speak(
    shared: &Arc<InstanceShared>,
    text: &str,
    language: Option<&str>,
    args: &PlaybackArgs<'_>,
) -> EngineResult<()> {
    let (engine, config_language) = {
        let g = shared.general.lock();
        (g.config.tts_engine.clone(), g.config.language.clone())
    };
    let engine = engine.ok_or_else(|| {
        EngineError::Initialization("no TTS engine configured".into())
    })?;
    let language = language
        .map(str::to_string)
        .or(config_language)
        .ok_or_else(|| EngineError::Initialization("no language configured".into()))?;

    shared.session.speak_text(&engine, &language, text, args)
}

/// Acquire the playback flag, run `f` with the capture-feeding callbacks
/// wired up, then clear the flag.
///
/// A playback already in progress is broken first; two racing callers still
/// resolve to exactly one holder of the flag.
fn with_playback_flag<F>(shared: &Arc<InstanceShared>, f: F) -> EngineResult<()>
where
    F: FnOnce(&PlaybackArgs<'_>) -> EngineResult<()>,
{
    if shared.general.lock().flags.playback {
        stop_and_wait(shared)?;
    }

    {
        let mut g = shared.general.lock();
        if g.flags.playback {
            return Err(EngineError::ConcurrencyConflict("playback already active"));
        }
        g.flags.playback = true;
    }

    shared.session.clear_break();
    flush_stale_frames(shared);

    let samplerate = shared.session.samplerate();
    let channels = shared.session.channels();

    let capture_wants_media = |shared: &InstanceShared| {
        let g = shared.general.lock();
        g.flags.capture_active && !g.flags.capture_pause
    };

    let on_frame = |frame: &Frame| {
        if !frame.cng && !frame.data.is_empty() && capture_wants_media(shared) {
            shared
                .audioq
                .try_push(AudioBuffer::new(frame.data.clone(), samplerate, channels));
        }
    };
    let on_dtmf = |digit: char| {
        if capture_wants_media(shared) {
            shared.dtmfq.try_push(digit.to_string());
        }
    };
    let args = PlaybackArgs {
        on_frame: &on_frame,
        on_dtmf: &on_dtmf,
    };

    let result = f(&args);
    shared.general.lock().flags.playback = false;
    result
}

/// Discard whatever the channel buffered while nobody was reading
fn flush_stale_frames(shared: &Arc<InstanceShared>) {
    for _ in 0..STALE_FRAME_FLUSH {
        match shared.session.read_frame() {
            Ok(Some(_)) => {}
            _ => break,
        }
    }
}
