//! Per-call audio capture and voice-activity segmentation engine.
//!
//! Each [`IvsInstance`] sits on top of one live media session and runs up to
//! three worker threads on plain OS threads:
//!
//! - a capture worker that reads frames in packet time, segments speech with
//!   a voice activity detector, assembles bounded PCM chunks with pre-roll
//!   recovery, buffers DTMF digits and synthesizes comfort noise,
//! - a playback worker per async job, bracketing file/TTS playback with
//!   start/stop events,
//! - a service worker driving ten timer slots and the session timeout.
//!
//! Workers never call back into the driving layer; everything they produce
//! lands on a bounded event queue the owner polls through
//! [`IvsInstance::get_event`]. The media side is abstracted behind the
//! [`MediaSession`] trait, so the engine itself carries no codec or channel
//! code.
//!
//! ```no_run
//! use ivs_engine::{IvsInstance, ProcessContext};
//! # use std::sync::Arc;
//! # fn session() -> Arc<dyn ivs_engine::MediaSession> { unimplemented!() }
//!
//! let process = ProcessContext::new();
//! let instance = IvsInstance::new(session(), Arc::clone(&process))?;
//! instance.capture_start("audio", None, Some("b64"))?;
//! while let Some(event) = instance.get_event() {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod core;
pub mod errors;
pub mod process;

pub use config::{ChunkEncoding, ChunkType, InstanceConfig, VadSettings};
pub use core::{
    AudioBuffer, AudioChunk, ChunkData, Clock, EngineEvent, EventKind, Frame, IvsInstance,
    ManualClock, MediaSession, PlaybackArgs, PlaybackHandle, SystemClock, TimerMode, VadFactory,
    VadState, VoiceActivityDetector,
};
pub use errors::{EngineError, EngineResult};
pub use process::ProcessContext;
