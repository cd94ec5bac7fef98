//! Engine core: instance state, workers and the seams they depend on.

pub mod audio;
pub mod capture;
pub mod chunk;
pub mod clock;
pub mod event;
pub mod instance;
pub mod playback;
pub mod queue;
pub mod service;
pub mod session;
pub mod vad;

pub use audio::AudioBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{AudioChunk, ChunkData, EngineEvent, EventKind, JOB_NONE};
pub use instance::{IvsInstance, PlaybackHandle, TimerMode};
pub use queue::BoundedQueue;
pub use session::{Frame, MediaSession, PlaybackArgs};
pub use vad::{EnergyVad, VadFactory, VadState, VoiceActivityDetector};
