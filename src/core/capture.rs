//! Capture worker: media intake, VAD segmentation and chunk assembly.
//!
//! One thread per active capture. Each pass of the loop runs in packet time:
//! stop checks, boundary flush, DTMF intake, audio intake, VAD processing,
//! silence timeout, comfort noise, tick. Everything the worker produces goes
//! out through the instance queues; nothing here blocks on the consumer.

use crate::config::{InstanceConfig, VAD_RECOVERY_FRAMES, VAD_STORE_FRAMES};
use crate::core::chunk;
use crate::core::event::{EngineEvent, EventKind};
use crate::core::instance::{Flags, InstanceShared};
use crate::core::vad::VadState;
use crate::errors::{EngineError, EngineResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Smallest DTMF staging buffer; flushes pre-empt overflow past this
const DTMF_STAGING_MIN: usize = 128;

/// Spawn the capture worker. Fails when a capture is already running or the
/// instance is tearing down.
pub(crate) fn start(shared: &Arc<InstanceShared>) -> EngineResult<()> {
    {
        let mut g = shared.general.lock();
        if g.flags.capture_active {
            return Err(EngineError::ConcurrencyConflict("capture already active"));
        }
        g.flags.capture_active = true;
        g.flags.capture_do_stop = false;
        g.flags.capture_pause = false;
    }

    if !shared.take() {
        let mut g = shared.general.lock();
        g.flags.capture_active = false;
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }

    let worker = Arc::clone(shared);
    let spawned = shared.process.spawn("ivs-capture", move || {
        info!("capture worker started");
        run(&worker);
        let mut g = worker.general.lock();
        g.flags.capture_active = false;
        g.flags.capture_do_stop = false;
        drop(g);
        worker.set_vad_state(VadState::None);
        worker.release();
        info!("capture worker stopped");
    });

    if let Err(e) = spawned {
        let mut g = shared.general.lock();
        g.flags.capture_active = false;
        drop(g);
        shared.release();
        return Err(EngineError::ResourceUnavailable(format!(
            "capture worker spawn failed: {e}"
        )));
    }
    Ok(())
}

fn pcm_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Low-level pseudo-noise frame, `level` caps the absolute amplitude
fn cng_frame(len_samples: usize, level: u32, seed: &mut u32) -> Vec<u8> {
    let level = level.min(i16::MAX as u32) as i32;
    let mut pcm = Vec::with_capacity(len_samples * 2);
    for _ in 0..len_samples {
        *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let r = ((*seed >> 16) & 0x7fff) as i32;
        let sample = ((r - 16_384) * level / 16_384) as i16;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    pcm
}

struct CaptureRun<'a> {
    shared: &'a Arc<InstanceShared>,
    samplerate: u32,
    channels: u16,
    frame_cap: usize,
    chunk_capacity: usize,
    chunk_buf: Vec<u8>,
    pre_roll: VecDeque<Vec<u8>>,
    dtmf_buf: String,
    dtmf_deadline: u64,
    silence_deadline: u64,
    silence_fired: bool,
    last_state: VadState,
    cng_seed: u32,
}

impl CaptureRun<'_> {
    /// Materialize and publish the accumulated chunk, then clear it
    fn emit_chunk(&mut self, cfg: &InstanceConfig) {
        if self.chunk_buf.is_empty() {
            return;
        }
        if let Some(chunk) = chunk::materialize(
            &self.chunk_buf,
            self.samplerate,
            self.channels,
            cfg.chunk_type,
            cfg.chunk_encoding,
            &cfg.chunk_dir,
        ) {
            self.shared
                .push_event(EngineEvent::new(EventKind::AudioChunkReady(chunk)));
        }
        self.chunk_buf.clear();
    }

    /// Append PCM to the chunk, flushing first when the write would push the
    /// chunk strictly past its capacity
    fn push_pcm(&mut self, pcm: &[u8], cfg: &InstanceConfig) {
        if self.chunk_buf.len() + pcm.len() > self.chunk_capacity {
            self.emit_chunk(cfg);
        }
        self.chunk_buf.extend_from_slice(pcm);
    }

    /// Publish the staged digits, if any, and disarm the idle timer
    fn flush_dtmf(&mut self) {
        if self.dtmf_buf.is_empty() {
            return;
        }
        let digits = std::mem::take(&mut self.dtmf_buf);
        debug!("dtmf buffer flushed: {digits}");
        self.shared
            .push_event(EngineEvent::new(EventKind::DtmfBufferReady { digits }));
        self.dtmf_deadline = 0;
    }

    fn intake_dtmf(&mut self, cfg: &InstanceConfig, now: u64) {
        if cfg.dtmf_max_digits == 0 {
            return;
        }

        if self.dtmf_deadline > 0 && now >= self.dtmf_deadline {
            self.flush_dtmf();
        }

        let mut incoming = String::new();
        if let Some(injected) = self.shared.dtmfq.try_pop() {
            incoming.push_str(&injected);
        }
        if self.shared.session.has_dtmf() {
            incoming.push_str(&self.shared.session.dequeue_dtmf());
        }

        let staging_cap = (cfg.dtmf_max_digits as usize).max(DTMF_STAGING_MIN);
        for digit in incoming.chars() {
            if self.dtmf_buf.len() >= staging_cap {
                self.flush_dtmf();
            }
            self.dtmf_buf.push(digit);
            if self.dtmf_buf.len() >= cfg.dtmf_max_digits as usize {
                self.flush_dtmf();
            } else {
                self.dtmf_deadline = now + cfg.dtmf_idle_sec;
            }
        }
    }

    /// Pull one frame of decoded PCM for this pass.
    ///
    /// Injected audio wins over the channel; during playback the channel is
    /// not read directly because the playback callbacks feed the audio queue.
    /// Returns the PCM and whether comfort noise must be suppressed this pass.
    fn intake_audio(&mut self, flags: &Flags) -> (Option<Vec<u8>>, bool) {
        if let Some(injected) = self.shared.audioq.try_pop() {
            let pcm = if injected.data.len() != self.frame_cap {
                match self.shared.session.decode(&injected.data) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        debug!("injected audio decode failed: {e}");
                        return (None, true);
                    }
                }
            } else {
                injected.data
            };
            return (Some(pcm), true);
        }

        if flags.playback {
            return (None, false);
        }

        match self.shared.session.read_frame() {
            Ok(Some(frame)) if !frame.cng && !frame.data.is_empty() => {
                match self.shared.session.decode(&frame.data) {
                    Ok(pcm) => (Some(pcm), false),
                    Err(e) => {
                        debug!("frame decode failed: {e}");
                        (None, false)
                    }
                }
            }
            Ok(_) => (None, false),
            Err(e) => {
                debug!("frame read failed: {e}");
                (None, false)
            }
        }
    }

    /// Move the most recent pre-roll frames into the chunk; speech onset was
    /// detected with hysteresis latency and these frames carry its beginning
    fn recover_pre_roll(&mut self, cfg: &InstanceConfig) {
        let recover = self.pre_roll.len().min(VAD_RECOVERY_FRAMES);
        let skip = self.pre_roll.len() - recover;
        let frames: Vec<Vec<u8>> = self.pre_roll.drain(..).skip(skip).collect();
        for frame in frames {
            self.push_pcm(&frame, cfg);
        }
    }

    fn process_vad(
        &mut self,
        vad: &mut dyn crate::core::vad::VoiceActivityDetector,
        pcm: &[u8],
        cfg: &InstanceConfig,
    ) {
        let stored = matches!(self.last_state, VadState::None | VadState::StopTalking)
            && pcm.len() <= self.frame_cap;
        if stored {
            if self.pre_roll.len() >= VAD_STORE_FRAMES {
                self.pre_roll.pop_front();
            }
            self.pre_roll.push_back(pcm.to_vec());
        }

        let state = vad.process(&pcm_samples(pcm));
        // Transition events fire once; a detector may hold a transition
        // state across frames.
        let changed = state != self.last_state;
        if changed {
            debug!("vad state: {} -> {state}", self.last_state);
            self.shared.set_vad_state(state);
        }

        match state {
            VadState::StartTalking => {
                if changed {
                    self.shared
                        .push_event(EngineEvent::new(EventKind::SpeakingStart));
                    // The trigger frame sits at the tail of the ring;
                    // recovery carries it into the chunk.
                    self.recover_pre_roll(cfg);
                    if !stored {
                        self.push_pcm(pcm, cfg);
                    }
                } else {
                    self.push_pcm(pcm, cfg);
                }
                self.silence_deadline = 0;
                self.silence_fired = false;
            }
            VadState::Talking => {
                self.push_pcm(pcm, cfg);
                self.silence_deadline = 0;
                self.silence_fired = false;
            }
            VadState::StopTalking => {
                // The stop frame is already silence; it is not captured.
                if changed {
                    self.shared
                        .push_event(EngineEvent::new(EventKind::SpeakingStop));
                    vad.reset();
                }
            }
            VadState::None => {}
        }

        self.last_state = state;
    }

    /// Arm on entering silence, fire once per silent period, disarm on voice
    fn check_silence_timeout(&mut self, cfg: &InstanceConfig, now: u64) {
        if cfg.silence_timeout_sec == 0 {
            self.silence_deadline = 0;
            self.silence_fired = false;
            return;
        }
        if matches!(self.last_state, VadState::StartTalking | VadState::Talking) {
            return;
        }
        if self.silence_fired {
            return;
        }
        if self.silence_deadline == 0 {
            self.silence_deadline = now + cfg.silence_timeout_sec;
        } else if now >= self.silence_deadline {
            self.shared
                .push_event(EngineEvent::new(EventKind::SilenceTimeout));
            self.silence_deadline = 0;
            self.silence_fired = true;
        }
    }

    fn send_cng(&mut self, flags: &Flags, cfg: &InstanceConfig) {
        if !flags.cng_enabled || flags.playback || cfg.cng_level == 0 {
            return;
        }
        let pcm = cng_frame(self.frame_cap / 2, cfg.cng_level, &mut self.cng_seed);
        let encoded = match self.shared.session.encode(&pcm) {
            Ok(encoded) => encoded,
            Err(e) => {
                debug!("cng encode failed: {e}");
                return;
            }
        };
        let samples = (self.frame_cap / 2 / self.channels.max(1) as usize) as u32;
        let frame = crate::core::session::Frame::new(encoded, samples);
        if let Err(e) = self.shared.session.write_frame(&frame) {
            debug!("cng write failed: {e}");
        }
    }
}

fn run(shared: &Arc<InstanceShared>) {
    let session = Arc::clone(&shared.session);
    let samplerate = session.samplerate();
    let channels = session.channels();
    let frame_cap = session.decoded_frame_size();
    let tick = Duration::from_millis(session.ptime_ms().max(1));

    let start_cfg = shared.config_snapshot();
    let chunk_capacity =
        start_cfg.chunk_sec as usize * samplerate as usize * channels as usize * 2;

    let mut vad = {
        let factory = shared.vad_factory.lock();
        (*factory)(samplerate, channels, start_cfg.vad)
    };

    let mut cap = CaptureRun {
        shared,
        samplerate,
        channels,
        frame_cap,
        chunk_capacity,
        chunk_buf: Vec::with_capacity(chunk_capacity),
        pre_roll: VecDeque::with_capacity(VAD_STORE_FRAMES),
        dtmf_buf: String::new(),
        dtmf_deadline: 0,
        silence_deadline: 0,
        silence_fired: false,
        last_state: VadState::None,
        cng_seed: 0x2545_f491,
    };

    loop {
        if shared.process.is_shutdown() || !shared.is_ready() || !session.ready() {
            break;
        }

        let (flags, cfg) = {
            let g = shared.general.lock();
            (g.flags, g.config.clone())
        };
        if flags.capture_do_stop {
            break;
        }

        if flags.capture_pause {
            cap.send_cng(&flags, &cfg);
            std::thread::sleep(tick);
            continue;
        }

        // An utterance ended last pass; hand its chunk over before new intake.
        if cap.last_state == VadState::StopTalking && !cap.chunk_buf.is_empty() {
            cap.emit_chunk(&cfg);
        }

        let now = shared.clock.epoch_secs();
        cap.intake_dtmf(&cfg, now);

        let (pcm, skip_cng) = cap.intake_audio(&flags);
        if let Some(pcm) = pcm {
            if !pcm.is_empty() {
                cap.process_vad(vad.as_mut(), &pcm, &cfg);
            }
        }

        cap.check_silence_timeout(&cfg, now);

        if !skip_cng {
            cap.send_cng(&flags, &cfg);
        }

        std::thread::sleep(tick);
    }
}
