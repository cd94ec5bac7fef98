//! Events published to the driving layer.
//!
//! Every worker produces these; the owning script thread is the single
//! consumer via `IvsInstance::get_event`. The payload lives inside the
//! variant, so popping an event transfers ownership and dropping it frees
//! everything — there is no separate destructor plumbing.

use serde::Serialize;
use std::path::PathBuf;

/// Job id attached to events that do not belong to an async job
pub const JOB_NONE: u32 = 0;

/// Payload of an `AudioChunkReady` event
#[derive(Debug, Clone, Serialize)]
pub struct AudioChunk {
    pub samplerate: u32,
    pub channels: u16,
    /// Chunk duration in whole seconds (recovered pre-roll included)
    pub time_sec: u32,
    /// Size of the captured PCM in bytes, before encoding
    pub length: usize,
    pub data: ChunkData,
}

/// Where the chunk payload ended up
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkData {
    /// Inline payload, already in the configured encoding
    Bytes(Vec<u8>),
    /// Path of the written chunk file
    File(PathBuf),
}

/// Event kinds with their payloads
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    SpeakingStart,
    SpeakingStop,
    SilenceTimeout,
    SessionTimeout,
    PlaybackStart { tag: String },
    PlaybackStop { tag: String },
    DtmfBufferReady { digits: String },
    TimerTimeout { timer_id: usize },
    AudioChunkReady(AudioChunk),
}

impl EventKind {
    /// Stable wire name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SpeakingStart => "speaking-start",
            EventKind::SpeakingStop => "speaking-stop",
            EventKind::SilenceTimeout => "silence-timeout",
            EventKind::SessionTimeout => "session-timeout",
            EventKind::PlaybackStart { .. } => "playback-start",
            EventKind::PlaybackStop { .. } => "playback-stop",
            EventKind::DtmfBufferReady { .. } => "dtmf-buffer-ready",
            EventKind::TimerTimeout { .. } => "timer-timeout",
            EventKind::AudioChunkReady(_) => "audio-chunk-ready",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One record on the event queue
#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    /// Async job this event belongs to, or [`JOB_NONE`]
    pub job_id: u32,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            job_id: JOB_NONE,
            kind,
        }
    }

    pub fn with_job(job_id: u32, kind: EventKind) -> Self {
        Self { job_id, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::SpeakingStart.name(), "speaking-start");
        assert_eq!(
            EventKind::DtmfBufferReady {
                digits: "12".into()
            }
            .name(),
            "dtmf-buffer-ready"
        );
        assert_eq!(EventKind::TimerTimeout { timer_id: 3 }.name(), "timer-timeout");
    }

    #[test]
    fn test_serializes_with_tag() {
        let evt = EngineEvent::with_job(
            7,
            EventKind::PlaybackStart {
                tag: "SAY".into(),
            },
        );
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["job_id"], 7);
        assert_eq!(json["type"], "playback-start");
        assert_eq!(json["tag"], "SAY");
    }

    #[test]
    fn test_chunk_event_payload() {
        let chunk = AudioChunk {
            samplerate: 8000,
            channels: 1,
            time_sec: 1,
            length: 16000,
            data: ChunkData::Bytes(vec![0u8; 4]),
        };
        let evt = EngineEvent::new(EventKind::AudioChunkReady(chunk));
        assert_eq!(evt.job_id, JOB_NONE);
        assert_eq!(evt.kind.name(), "audio-chunk-ready");
    }
}
