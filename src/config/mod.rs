//! Per-instance configuration.
//!
//! Every field here is a scalar the driving layer can read and change at any
//! time through the instance accessors; workers snapshot what they need under
//! the general lock. Defaults mirror a freshly constructed instance.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of addressable timer slots per instance
pub const TIMER_SLOTS: usize = 10;

/// Capacity of the event, audio and DTMF queues
pub const QUEUE_CAPACITY: usize = 64;

/// Frames kept in the pre-roll ring while the channel is silent
pub const VAD_STORE_FRAMES: usize = 64;

/// Pre-roll frames recovered into a chunk on speech onset
pub const VAD_RECOVERY_FRAMES: usize = 15;

/// Where an emitted audio chunk ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Payload carried inline in the event
    #[default]
    Buffer,
    /// Payload written to a file; the event carries the path
    File,
}

impl ChunkType {
    /// Lenient name lookup; unknown names fall back to the default
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "file" => ChunkType::File,
            _ => ChunkType::Buffer,
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkType::Buffer => write!(f, "buffer"),
            ChunkType::File => write!(f, "file"),
        }
    }
}

/// Encoding applied to an emitted audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkEncoding {
    /// Raw 16-bit PCM
    #[default]
    Raw,
    /// WAV container
    Wav,
    /// MP3; no encoder in the stack, chunks with this encoding are dropped with a warning
    Mp3,
    /// Base64 over raw PCM
    B64,
}

impl ChunkEncoding {
    /// Lenient name lookup; unknown names fall back to the default
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "wav" => ChunkEncoding::Wav,
            "mp3" => ChunkEncoding::Mp3,
            "b64" => ChunkEncoding::B64,
            _ => ChunkEncoding::Raw,
        }
    }
}

impl std::fmt::Display for ChunkEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkEncoding::Raw => write!(f, "raw"),
            ChunkEncoding::Wav => write!(f, "wav"),
            ChunkEncoding::Mp3 => write!(f, "mp3"),
            ChunkEncoding::B64 => write!(f, "b64"),
        }
    }
}

/// Tunables handed to the VAD factory when a capture starts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadSettings {
    /// Voiced milliseconds required before start-talking
    pub voice_ms: u32,
    /// Silent milliseconds required before stop-talking
    pub silence_ms: u32,
    /// Energy threshold; frames with mean absolute amplitude above it count as voiced
    pub threshold: u32,
    /// Emit per-frame trace output
    pub debug: bool,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            voice_ms: 200,
            silence_ms: 350,
            threshold: 200,
            debug: false,
        }
    }
}

/// Scalar configuration of one engine instance.
///
/// Guarded by the instance's general lock together with the runtime flags.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Seconds of speech per emitted chunk
    pub chunk_sec: u32,
    /// Chunk destination
    pub chunk_type: ChunkType,
    /// Chunk encoding
    pub chunk_encoding: ChunkEncoding,
    /// Directory for file-type chunks
    pub chunk_dir: PathBuf,
    /// VAD tunables
    pub vad: VadSettings,
    /// Comfort noise level; 0 disables synthesis even when CNG is enabled
    pub cng_level: u32,
    /// Digits per DTMF buffer flush; 0 disables DTMF intake
    pub dtmf_max_digits: u32,
    /// Seconds of digit inactivity before a partial buffer flushes
    pub dtmf_idle_sec: u64,
    /// Seconds of continuous silence before SilenceTimeout; 0 disables
    pub silence_timeout_sec: u64,
    /// Seconds between SessionTimeout events; 0 disables
    pub session_timeout_sec: u64,
    /// TTS engine for say operations
    pub tts_engine: Option<String>,
    /// ASR engine hint carried for the driving layer
    pub asr_engine: Option<String>,
    /// Preferred language for say operations
    pub language: Option<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            chunk_sec: 15,
            chunk_type: ChunkType::default(),
            chunk_encoding: ChunkEncoding::default(),
            chunk_dir: std::env::temp_dir(),
            vad: VadSettings::default(),
            cng_level: 500,
            dtmf_max_digits: 1,
            dtmf_idle_sec: 1,
            silence_timeout_sec: 0,
            session_timeout_sec: 0,
            tts_engine: None,
            asr_engine: None,
            language: None,
        }
    }
}

impl InstanceConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_construction() {
        let config = InstanceConfig::default();
        assert_eq!(config.chunk_sec, 15);
        assert_eq!(config.chunk_type, ChunkType::Buffer);
        assert_eq!(config.chunk_encoding, ChunkEncoding::Raw);
        assert_eq!(config.cng_level, 500);
        assert_eq!(config.dtmf_max_digits, 1);
        assert_eq!(config.dtmf_idle_sec, 1);
        assert_eq!(config.vad.voice_ms, 200);
        assert_eq!(config.vad.silence_ms, 350);
        assert_eq!(config.vad.threshold, 200);
        assert_eq!(config.silence_timeout_sec, 0);
        assert_eq!(config.session_timeout_sec, 0);
    }

    #[test]
    fn test_lenient_name_parsing() {
        assert_eq!(ChunkType::from_name("FILE"), ChunkType::File);
        assert_eq!(ChunkType::from_name("bogus"), ChunkType::Buffer);
        assert_eq!(ChunkEncoding::from_name("b64"), ChunkEncoding::B64);
        assert_eq!(ChunkEncoding::from_name("Wav"), ChunkEncoding::Wav);
        assert_eq!(ChunkEncoding::from_name("nope"), ChunkEncoding::Raw);
    }

    #[test]
    fn test_names_round_trip() {
        for ty in [ChunkType::Buffer, ChunkType::File] {
            assert_eq!(ChunkType::from_name(&ty.to_string()), ty);
        }
        for enc in [
            ChunkEncoding::Raw,
            ChunkEncoding::Wav,
            ChunkEncoding::Mp3,
            ChunkEncoding::B64,
        ] {
            assert_eq!(ChunkEncoding::from_name(&enc.to_string()), enc);
        }
    }
}
