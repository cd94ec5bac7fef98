//! Instance state and the operations exposed to the driving layer.
//!
//! `IvsInstance` is the composition root: configuration, runtime flags, the
//! timer table, the three queues and the pin count all live here. The
//! script-visible handle owns the instance; every worker thread holds a
//! borrowed `Arc` plus a pin for its lifetime, so destruction can never race
//! a running worker.

use crate::config::{
    ChunkEncoding, ChunkType, InstanceConfig, QUEUE_CAPACITY, TIMER_SLOTS, VadSettings,
};
use crate::core::audio::AudioBuffer;
use crate::core::clock::{Clock, SystemClock};
use crate::core::event::EngineEvent;
use crate::core::queue::BoundedQueue;
use crate::core::session::MediaSession;
use crate::core::vad::{VadFactory, VadState, default_vad_factory};
use crate::core::{capture, playback, service};
use crate::errors::{EngineError, EngineResult};
use crate::process::ProcessContext;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Result of a playback/say request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackHandle {
    /// Synchronous call ran to completion
    Done,
    /// Asynchronous job was spawned; events carry this id
    Job(u32),
}

/// Firing mode of one timer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    #[default]
    Repeating,
    Once,
}

impl TimerMode {
    /// Lenient name lookup, `"once"` selects [`TimerMode::Once`]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("once") {
            TimerMode::Once
        } else {
            TimerMode::Repeating
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimerSlot {
    pub mode: TimerMode,
    pub interval_sec: u64,
    /// Epoch second the slot fires at; 0 = disarmed
    pub deadline: u64,
}

#[derive(Default)]
pub(crate) struct TimerTable {
    pub slots: [TimerSlot; TIMER_SLOTS],
    /// Armed session-timeout deadline; 0 = not yet armed
    pub session_deadline: u64,
}

/// Discrete runtime flags, test-and-set under the general lock
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Flags {
    pub playback: bool,
    pub cng_enabled: bool,
    pub capture_active: bool,
    pub capture_pause: bool,
    pub capture_do_stop: bool,
    pub service_active: bool,
    pub service_do_stop: bool,
}

/// Everything guarded by the general lock
pub(crate) struct General {
    pub config: InstanceConfig,
    pub flags: Flags,
    pub pin: u32,
    pub jobs_seq: u32,
    /// Last VAD state published by the capture worker
    pub vad_state: VadState,
}

/// Shared body of one instance; workers hold this behind an `Arc`
pub(crate) struct InstanceShared {
    pub session: Arc<dyn MediaSession>,
    pub clock: Arc<dyn Clock>,
    pub process: Arc<ProcessContext>,
    pub general: Mutex<General>,
    pub pin_idle: Condvar,
    pub timers: Mutex<TimerTable>,
    pub events: BoundedQueue<EngineEvent>,
    pub audioq: BoundedQueue<AudioBuffer>,
    pub dtmfq: BoundedQueue<String>,
    pub vad_factory: Mutex<Box<VadFactory>>,
    ready: AtomicBool,
    destroyed: AtomicBool,
}

impl InstanceShared {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Pin the instance; fails once teardown has begun
    pub fn take(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let mut g = self.general.lock();
        if !self.is_ready() {
            return false;
        }
        g.pin += 1;
        true
    }

    /// Drop one pin; wakes a pending destroy when the count reaches zero
    pub fn release(&self) {
        let mut g = self.general.lock();
        if g.pin > 0 {
            g.pin -= 1;
        }
        if g.pin == 0 {
            self.pin_idle.notify_all();
        }
    }

    /// Next async job id (ids start at 1)
    pub fn gen_job_id(&self) -> u32 {
        let mut g = self.general.lock();
        if g.jobs_seq == 0 {
            g.jobs_seq = 1;
        }
        let id = g.jobs_seq;
        g.jobs_seq += 1;
        id
    }

    pub fn push_event(&self, event: EngineEvent) -> bool {
        self.events.try_push(event)
    }

    pub fn config_snapshot(&self) -> InstanceConfig {
        self.general.lock().config.clone()
    }

    pub fn set_vad_state(&self, state: VadState) {
        self.general.lock().vad_state = state;
    }

    pub fn vad_state(&self) -> VadState {
        self.general.lock().vad_state
    }
}

/// Script-visible handle; owns the shared state and destroys it on drop
pub struct IvsInstance {
    shared: Arc<InstanceShared>,
}

impl IvsInstance {
    /// Build an instance over a live media session
    pub fn new(
        session: Arc<dyn MediaSession>,
        process: Arc<ProcessContext>,
    ) -> EngineResult<Self> {
        Self::with_clock(session, process, Arc::new(SystemClock))
    }

    /// Build an instance with an explicit clock (tests use [`ManualClock`])
    ///
    /// [`ManualClock`]: crate::core::clock::ManualClock
    pub fn with_clock(
        session: Arc<dyn MediaSession>,
        process: Arc<ProcessContext>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        if session.samplerate() == 0 || session.decoded_frame_size() == 0 {
            return Err(EngineError::Initialization(
                "session reports no media geometry".into(),
            ));
        }

        let shared = Arc::new(InstanceShared {
            session,
            clock,
            process,
            general: Mutex::new(General {
                config: InstanceConfig::default(),
                flags: Flags::default(),
                pin: 0,
                jobs_seq: 0,
                vad_state: VadState::None,
            }),
            pin_idle: Condvar::new(),
            timers: Mutex::new(TimerTable::default()),
            events: BoundedQueue::new(QUEUE_CAPACITY, "events"),
            audioq: BoundedQueue::new(QUEUE_CAPACITY, "audio"),
            dtmfq: BoundedQueue::new(QUEUE_CAPACITY, "dtmf"),
            vad_factory: Mutex::new(default_vad_factory()),
            ready: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
        });

        debug!("ivs instance created");
        Ok(Self { shared })
    }

    /// Replace the detector factory used by subsequent captures
    pub fn set_vad_factory(&self, factory: Box<VadFactory>) {
        *self.shared.vad_factory.lock() = factory;
    }

    // --- configuration accessors -------------------------------------------

    pub fn chunk_sec(&self) -> u32 {
        self.shared.general.lock().config.chunk_sec
    }

    /// Set the chunk duration; rejects zero
    pub fn set_chunk_sec(&self, sec: u32) -> bool {
        if sec < 1 {
            return false;
        }
        self.shared.general.lock().config.chunk_sec = sec;
        true
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.shared.general.lock().config.chunk_type
    }

    pub fn set_chunk_type(&self, ty: ChunkType) {
        self.shared.general.lock().config.chunk_type = ty;
    }

    pub fn chunk_encoding(&self) -> ChunkEncoding {
        self.shared.general.lock().config.chunk_encoding
    }

    pub fn set_chunk_encoding(&self, enc: ChunkEncoding) {
        self.shared.general.lock().config.chunk_encoding = enc;
    }

    pub fn chunk_dir(&self) -> std::path::PathBuf {
        self.shared.general.lock().config.chunk_dir.clone()
    }

    pub fn set_chunk_dir(&self, dir: std::path::PathBuf) {
        self.shared.general.lock().config.chunk_dir = dir;
    }

    pub fn vad_settings(&self) -> VadSettings {
        self.shared.general.lock().config.vad
    }

    pub fn set_vad_settings(&self, settings: VadSettings) {
        self.shared.general.lock().config.vad = settings;
    }

    /// Last VAD state published by the capture worker
    pub fn vad_state(&self) -> VadState {
        self.shared.vad_state()
    }

    pub fn cng_enabled(&self) -> bool {
        self.shared.general.lock().flags.cng_enabled
    }

    pub fn set_cng_enabled(&self, on: bool) {
        self.shared.general.lock().flags.cng_enabled = on;
    }

    pub fn cng_level(&self) -> u32 {
        self.shared.general.lock().config.cng_level
    }

    pub fn set_cng_level(&self, level: u32) {
        self.shared.general.lock().config.cng_level = level;
    }

    pub fn dtmf_max_digits(&self) -> u32 {
        self.shared.general.lock().config.dtmf_max_digits
    }

    /// Set the flush threshold; rejects zero
    pub fn set_dtmf_max_digits(&self, n: u32) -> bool {
        if n < 1 {
            return false;
        }
        self.shared.general.lock().config.dtmf_max_digits = n;
        true
    }

    pub fn dtmf_idle_sec(&self) -> u64 {
        self.shared.general.lock().config.dtmf_idle_sec
    }

    /// Set the digit idle timeout; rejects zero
    pub fn set_dtmf_idle_sec(&self, sec: u64) -> bool {
        if sec < 1 {
            return false;
        }
        self.shared.general.lock().config.dtmf_idle_sec = sec;
        true
    }

    pub fn silence_timeout_sec(&self) -> u64 {
        self.shared.general.lock().config.silence_timeout_sec
    }

    pub fn set_silence_timeout_sec(&self, sec: u64) {
        self.shared.general.lock().config.silence_timeout_sec = sec;
    }

    pub fn session_timeout_sec(&self) -> u64 {
        self.shared.general.lock().config.session_timeout_sec
    }

    pub fn set_session_timeout_sec(&self, sec: u64) {
        self.shared.general.lock().config.session_timeout_sec = sec;
        // Force a fresh arm on the next service pass.
        self.shared.timers.lock().session_deadline = 0;
    }

    pub fn tts_engine(&self) -> Option<String> {
        self.shared.general.lock().config.tts_engine.clone()
    }

    pub fn set_tts_engine(&self, engine: Option<String>) {
        self.shared.general.lock().config.tts_engine = engine;
    }

    pub fn asr_engine(&self) -> Option<String> {
        self.shared.general.lock().config.asr_engine.clone()
    }

    pub fn set_asr_engine(&self, engine: Option<String>) {
        self.shared.general.lock().config.asr_engine = engine;
    }

    pub fn language(&self) -> Option<String> {
        self.shared.general.lock().config.language.clone()
    }

    pub fn set_language(&self, language: Option<String>) {
        self.shared.general.lock().config.language = language;
    }

    // --- capture ------------------------------------------------------------

    pub fn is_capture_active(&self) -> bool {
        self.shared.general.lock().flags.capture_active
    }

    pub fn is_capture_paused(&self) -> bool {
        self.shared.general.lock().flags.capture_pause
    }

    /// Start capturing. Only the `"audio"` kind is supported; optional
    /// chunk type/encoding overrides apply before the worker spawns.
    pub fn capture_start(
        &self,
        kind: &str,
        chunk_type: Option<&str>,
        chunk_encoding: Option<&str>,
    ) -> EngineResult<()> {
        if !kind.eq_ignore_ascii_case("audio") {
            debug!("capture kind not supported: {kind}");
            return Err(EngineError::ResourceUnavailable(format!(
                "unsupported capture kind: {kind}"
            )));
        }

        {
            let mut g = self.shared.general.lock();
            if let Some(name) = chunk_type {
                g.config.chunk_type = ChunkType::from_name(name);
            }
            if let Some(name) = chunk_encoding {
                g.config.chunk_encoding = ChunkEncoding::from_name(name);
            }
        }

        capture::start(&self.shared)
    }

    fn kind_matches_audio(kind: Option<&str>) -> bool {
        match kind {
            None => true,
            Some(k) => k == "*" || k.eq_ignore_ascii_case("audio"),
        }
    }

    /// Pause capturing; the worker keeps ticking (and sending CNG) but
    /// consumes no media
    pub fn capture_pause(&self, kind: Option<&str>) {
        if Self::kind_matches_audio(kind) {
            self.shared.general.lock().flags.capture_pause = true;
        }
    }

    /// Resume a paused capture
    pub fn capture_resume(&self, kind: Option<&str>) {
        if Self::kind_matches_audio(kind) {
            self.shared.general.lock().flags.capture_pause = false;
        }
    }

    /// Request capture stop; the worker exits on its next cycle
    pub fn capture_stop(&self, kind: Option<&str>) {
        if Self::kind_matches_audio(kind) {
            let mut g = self.shared.general.lock();
            if g.flags.capture_active {
                g.flags.capture_do_stop = true;
            }
        }
    }

    // --- playback -----------------------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.shared.general.lock().flags.playback
    }

    /// Play a file or stream to the channel
    pub fn playback(
        &self,
        path: &str,
        delete_after: bool,
        asynchronous: bool,
    ) -> EngineResult<PlaybackHandle> {
        if asynchronous {
            playback::spawn_playback_job(&self.shared, path, delete_after).map(PlaybackHandle::Job)
        } else {
            let result = playback::playback(&self.shared, path);
            if delete_after {
                let _ = std::fs::remove_file(path);
            }
            result.map(|_| PlaybackHandle::Done)
        }
    }

    /// Speak text through the configured TTS engine
    pub fn say(
        &self,
        text: &str,
        language: Option<&str>,
        asynchronous: bool,
    ) -> EngineResult<PlaybackHandle> {
        let lang = language
            .map(str::to_string)
            .or_else(|| self.shared.general.lock().config.language.clone());

        if asynchronous {
            playback::spawn_say_job(&self.shared, text, lang.as_deref()).map(PlaybackHandle::Job)
        } else {
            playback::say(&self.shared, text, lang.as_deref()).map(|_| PlaybackHandle::Done)
        }
    }

    /// Interrupt an in-progress playback, waiting up to ~5 seconds
    pub fn playback_stop(&self) -> EngineResult<()> {
        playback::playback_stop(&self.shared)
    }

    // --- timers -------------------------------------------------------------

    /// Start the per-instance timer ticker
    pub fn timers_start(&self) -> EngineResult<()> {
        service::start(&self.shared)
    }

    /// Request timer ticker stop
    pub fn timers_stop(&self) {
        let mut g = self.shared.general.lock();
        if g.flags.service_active {
            g.flags.service_do_stop = true;
        }
    }

    pub fn is_timers_active(&self) -> bool {
        self.shared.general.lock().flags.service_active
    }

    fn clamp_timer_id(id: usize) -> usize {
        if id >= TIMER_SLOTS {
            warn!("timer id {id} out of range, clamped to {}", TIMER_SLOTS - 1);
            TIMER_SLOTS - 1
        } else {
            id
        }
    }

    /// Arm a timer slot; out-of-range ids clamp to the last slot
    pub fn timer_setup(&self, id: usize, interval_sec: u64, mode: TimerMode) {
        let id = Self::clamp_timer_id(id);
        let now = self.shared.clock.epoch_secs();
        let mut timers = self.shared.timers.lock();
        timers.slots[id] = TimerSlot {
            mode,
            interval_sec,
            deadline: if interval_sec > 0 {
                now + interval_sec
            } else {
                0
            },
        };
    }

    /// Disarm a timer slot
    pub fn timer_cancel(&self, id: usize) {
        let id = Self::clamp_timer_id(id);
        let mut timers = self.shared.timers.lock();
        timers.slots[id].interval_sec = 0;
        timers.slots[id].deadline = 0;
    }

    // --- queues -------------------------------------------------------------

    /// Pop the next pending event, if any
    pub fn get_event(&self) -> Option<EngineEvent> {
        self.shared.events.try_pop()
    }

    /// Inject externally sourced audio into the capture path.
    ///
    /// Returns false when the queue is full; the buffer is dropped.
    pub fn inject_audio(&self, buffer: AudioBuffer) -> bool {
        self.shared.audioq.try_push(buffer)
    }

    /// Inject externally sourced digits into the DTMF path
    pub fn inject_dtmf(&self, digits: &str) -> bool {
        if digits.is_empty() {
            return false;
        }
        self.shared.dtmfq.try_push(digits.to_string())
    }

    // --- lifecycle ----------------------------------------------------------

    /// Pin the instance against destruction
    pub fn take(&self) -> bool {
        self.shared.take()
    }

    /// Release one pin
    pub fn release(&self) {
        self.shared.release()
    }

    /// Current pin count; destruction waits for it to reach zero
    pub fn pin_count(&self) -> u32 {
        self.shared.general.lock().pin
    }

    /// Tear the instance down: refuse new pins, wait for workers to unwind,
    /// then drain every queue. Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.ready.store(false, Ordering::Release);

        {
            // Nudge the workers; they poll these every cycle.
            let mut g = self.shared.general.lock();
            g.flags.capture_do_stop = g.flags.capture_active;
            g.flags.service_do_stop = g.flags.service_active;

            if g.pin > 0 {
                debug!("waiting for {} pin(s) before destroy", g.pin);
            }
            while g.pin > 0 {
                self.shared.pin_idle.wait(&mut g);
            }
        }

        self.shared.events.drain();
        self.shared.audioq.drain();
        self.shared.dtmfq.drain();
        debug!("ivs instance destroyed");
    }
}

impl Drop for IvsInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}
