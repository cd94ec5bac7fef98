//! Voice activity detection seam.
//!
//! The engine consumes a VAD through an opaque contract: feed it one decoded
//! PCM frame, get back a hysteresis state. The DSP behind that contract is
//! swappable — captures build their detector through an injectable factory,
//! and [`EnergyVad`] is the stock implementation: RMS-style amplitude
//! thresholding with voiced/silent duration hysteresis.

use crate::config::VadSettings;
use serde::Serialize;
use tracing::trace;

/// Hysteresis states reported by a detector.
///
/// `StartTalking` and `StopTalking` are transition states reported for
/// exactly one frame; `Talking` and `None` are the steady states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VadState {
    #[default]
    None,
    StartTalking,
    Talking,
    StopTalking,
}

impl std::fmt::Display for VadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VadState::None => write!(f, "none"),
            VadState::StartTalking => write!(f, "start-talking"),
            VadState::Talking => write!(f, "talking"),
            VadState::StopTalking => write!(f, "stop-talking"),
        }
    }
}

/// Contract every detector implements
pub trait VoiceActivityDetector: Send {
    /// Classify one frame of 16-bit PCM
    fn process(&mut self, samples: &[i16]) -> VadState;

    /// Drop accumulated hysteresis; call when a new utterance boundary is known
    fn reset(&mut self);
}

/// Builds a detector for one capture run
pub type VadFactory =
    dyn Fn(u32, u16, VadSettings) -> Box<dyn VoiceActivityDetector> + Send + Sync;

/// Stock detector: mean-absolute-amplitude threshold with duration hysteresis
pub struct EnergyVad {
    samplerate: u32,
    channels: u16,
    settings: VadSettings,
    voiced: bool,
    voice_ms_acc: u32,
    silence_ms_acc: u32,
}

impl EnergyVad {
    pub fn new(samplerate: u32, channels: u16, settings: VadSettings) -> Self {
        Self {
            samplerate,
            channels,
            settings,
            voiced: false,
            voice_ms_acc: 0,
            silence_ms_acc: 0,
        }
    }

    fn frame_ms(&self, samples: usize) -> u32 {
        let per_channel = samples as u32 / self.channels.max(1) as u32;
        per_channel * 1000 / self.samplerate.max(1)
    }

    fn frame_energy(samples: &[i16]) -> u32 {
        if samples.is_empty() {
            return 0;
        }
        let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
        (sum / samples.len() as u64) as u32
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process(&mut self, samples: &[i16]) -> VadState {
        let energy = Self::frame_energy(samples);
        let hot = energy > self.settings.threshold;
        let ms = self.frame_ms(samples.len());

        if self.settings.debug {
            trace!(energy, hot, voiced = self.voiced, "vad frame");
        }

        if !self.voiced {
            if hot {
                self.voice_ms_acc += ms;
                if self.voice_ms_acc >= self.settings.voice_ms {
                    self.voiced = true;
                    self.silence_ms_acc = 0;
                    return VadState::StartTalking;
                }
            } else {
                self.voice_ms_acc = 0;
            }
            VadState::None
        } else {
            if !hot {
                self.silence_ms_acc += ms;
                if self.silence_ms_acc >= self.settings.silence_ms {
                    self.voiced = false;
                    self.voice_ms_acc = 0;
                    return VadState::StopTalking;
                }
            } else {
                self.silence_ms_acc = 0;
            }
            VadState::Talking
        }
    }

    fn reset(&mut self) {
        self.voiced = false;
        self.voice_ms_acc = 0;
        self.silence_ms_acc = 0;
    }
}

/// Default factory producing [`EnergyVad`] detectors
pub fn default_vad_factory() -> Box<VadFactory> {
    Box::new(|samplerate, channels, settings| {
        Box::new(EnergyVad::new(samplerate, channels, settings))
    })
}
