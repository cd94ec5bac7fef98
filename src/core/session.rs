//! Collaborator seam towards the call/media layer.
//!
//! The engine never touches codecs, channels or playback engines directly;
//! everything it needs from the surrounding switch is behind [`MediaSession`].
//! Implementations wrap a live call; tests use in-memory mocks.

use crate::errors::EngineResult;

/// One frame read from or written to the channel
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded (wire-side) payload
    pub data: Vec<u8>,
    /// Sample count carried by this frame
    pub samples: u32,
    /// Far-end comfort-noise frame; carries no usable audio
    pub cng: bool,
}

impl Frame {
    pub fn new(data: Vec<u8>, samples: u32) -> Self {
        Self {
            data,
            samples,
            cng: false,
        }
    }
}

/// Callbacks wired into a playback/TTS call so live media keeps flowing
/// into the engine while the channel is busy playing.
pub struct PlaybackArgs<'a> {
    /// Invoked for every live frame read during playback
    pub on_frame: &'a (dyn Fn(&Frame) + Send + Sync),
    /// Invoked for every digit received during playback
    pub on_dtmf: &'a (dyn Fn(char) + Send + Sync),
}

/// Media operations consumed by the engine's workers.
///
/// All methods must be safe to call from any worker thread. Frame-level
/// failures should be reported as errors, not panics; the capture loop
/// skips the frame and keeps running.
pub trait MediaSession: Send + Sync {
    /// Channel sample rate in Hz
    fn samplerate(&self) -> u32;

    /// Channel count
    fn channels(&self) -> u16;

    /// Packet interval in milliseconds; the capture loop ticks at this rate
    fn ptime_ms(&self) -> u64;

    /// Size in bytes of one decoded packet
    fn decoded_frame_size(&self) -> usize;

    /// True while the call is up and has media
    fn ready(&self) -> bool;

    /// Read one frame, blocking at most one packet interval.
    ///
    /// `Ok(None)` means no frame was available in time.
    fn read_frame(&self) -> EngineResult<Option<Frame>>;

    /// Write one encoded frame to the channel
    fn write_frame(&self, frame: &Frame) -> EngineResult<()>;

    /// Decode a wire-side payload to 16-bit PCM
    fn decode(&self, data: &[u8]) -> EngineResult<Vec<u8>>;

    /// Encode 16-bit PCM to the wire-side codec
    fn encode(&self, pcm: &[u8]) -> EngineResult<Vec<u8>>;

    /// True when the channel has queued digits
    fn has_dtmf(&self) -> bool;

    /// Drain the channel's queued digits
    fn dequeue_dtmf(&self) -> String;

    /// Play an audio file or stream URL to the channel, blocking until done
    /// or interrupted
    fn play_file(&self, path: &str, args: &PlaybackArgs<'_>) -> EngineResult<()>;

    /// Speak text through a TTS engine, blocking until done or interrupted
    fn speak_text(
        &self,
        engine: &str,
        language: &str,
        text: &str,
        args: &PlaybackArgs<'_>,
    ) -> EngineResult<()>;

    /// Raise the channel-level break signal, interrupting a blocking playback
    fn break_playback(&self);

    /// Clear a pending break signal
    fn clear_break(&self);

    /// Existence check for local playback paths
    fn file_exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }
}
