//! Engine-wide error type.
//!
//! Frame-level failures (a bad decode, a full queue) are deliberately *not*
//! errors: the capture loop logs and skips them so the real-time path keeps
//! running. `EngineError` covers the operations a caller can actually react
//! to — construction, start/stop requests and playback control.

use thiserror::Error;

/// Result type used across the engine's public API
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Setup-time allocation or wiring failure; aborts construction
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The channel/session is not ready or has no media
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Capture or playback is already active; the caller must stop it first
    #[error("already active: {0}")]
    ConcurrencyConflict(&'static str),

    /// A bounded wait (playback stop, job wait) ran out
    #[error("timed out: {0}")]
    Timeout(String),

    /// A referenced file does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator (codec, playback engine, TTS) failed
    #[error("external failure: {0}")]
    External(String),
}

impl EngineError {
    /// True when the operation failed because another one holds the slot
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_))
    }
}
