//! Shared fixtures: an in-memory media session and a scripted detector.
#![allow(dead_code)]

use ivs_engine::{Frame, MediaSession, PlaybackArgs, VadFactory, VadState, VoiceActivityDetector};
use ivs_engine::errors::EngineResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// In-memory channel: frames and digits are queued by the test, playback
/// and TTS calls are recorded.
pub struct MockSession {
    samplerate: u32,
    channels: u16,
    ptime_ms: u64,
    ready: AtomicBool,
    broke: AtomicBool,
    frames: Mutex<VecDeque<Frame>>,
    pub written: Mutex<Vec<Frame>>,
    dtmf: Mutex<String>,
    pub played: Mutex<Vec<String>>,
    pub spoken: Mutex<Vec<(String, String, String)>>,
    play_frames: AtomicUsize,
    play_block: AtomicBool,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Arc::new(Self {
            samplerate: 8000,
            channels: 1,
            ptime_ms: 20,
            ready: AtomicBool::new(true),
            broke: AtomicBool::new(false),
            frames: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            dtmf: Mutex::new(String::new()),
            played: Mutex::new(Vec::new()),
            spoken: Mutex::new(Vec::new()),
            play_frames: AtomicUsize::new(0),
            play_block: AtomicBool::new(false),
        })
    }

    /// Queue `count` readable frames of `byte`-filled PCM
    pub fn push_frames(&self, count: usize, byte: u8) {
        let size = self.decoded_frame_size();
        let samples = (size / 2 / self.channels as usize) as u32;
        let mut q = self.frames.lock();
        for _ in 0..count {
            q.push_back(Frame::new(vec![byte; size], samples));
        }
    }

    pub fn queue_dtmf(&self, digits: &str) {
        self.dtmf.lock().push_str(digits);
    }

    pub fn hang_up(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Make playback feed this many live frames through the callback
    pub fn set_play_frames(&self, count: usize) {
        self.play_frames.store(count, Ordering::Release);
    }

    /// Make playback block until the break signal is raised
    pub fn set_play_block(&self, on: bool) {
        self.play_block.store(on, Ordering::Release);
    }

    fn run_playback(&self, args: &PlaybackArgs<'_>) {
        let size = self.decoded_frame_size();
        let samples = (size / 2 / self.channels as usize) as u32;
        for _ in 0..self.play_frames.load(Ordering::Acquire) {
            (args.on_frame)(&Frame::new(vec![0x10; size], samples));
        }
        if self.play_block.load(Ordering::Acquire) {
            // Pretend to stream until broken, bounded so a failing test
            // cannot hang the suite.
            for _ in 0..1000 {
                if self.broke.load(Ordering::Acquire) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

impl MediaSession for MockSession {
    fn samplerate(&self) -> u32 {
        self.samplerate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn ptime_ms(&self) -> u64 {
        self.ptime_ms
    }

    fn decoded_frame_size(&self) -> usize {
        (self.samplerate as usize / 1000) * self.ptime_ms as usize * self.channels as usize * 2
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn read_frame(&self) -> EngineResult<Option<Frame>> {
        Ok(self.frames.lock().pop_front())
    }

    fn write_frame(&self, frame: &Frame) -> EngineResult<()> {
        self.written.lock().push(frame.clone());
        Ok(())
    }

    fn decode(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn encode(&self, pcm: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(pcm.to_vec())
    }

    fn has_dtmf(&self) -> bool {
        !self.dtmf.lock().is_empty()
    }

    fn dequeue_dtmf(&self) -> String {
        std::mem::take(&mut *self.dtmf.lock())
    }

    fn play_file(&self, path: &str, args: &PlaybackArgs<'_>) -> EngineResult<()> {
        self.played.lock().push(path.to_string());
        self.run_playback(args);
        Ok(())
    }

    fn speak_text(
        &self,
        engine: &str,
        language: &str,
        text: &str,
        args: &PlaybackArgs<'_>,
    ) -> EngineResult<()> {
        self.spoken
            .lock()
            .push((engine.to_string(), language.to_string(), text.to_string()));
        self.run_playback(args);
        Ok(())
    }

    fn break_playback(&self) {
        self.broke.store(true, Ordering::Release);
    }

    fn clear_break(&self) {
        self.broke.store(false, Ordering::Release);
    }
}

/// Detector that replays a fixed state sequence, one state per frame,
/// then reports `None` forever
pub struct ScriptedVad {
    states: Vec<VadState>,
    idx: usize,
}

impl VoiceActivityDetector for ScriptedVad {
    fn process(&mut self, _samples: &[i16]) -> VadState {
        let state = self.states.get(self.idx).copied().unwrap_or(VadState::None);
        self.idx += 1;
        state
    }

    fn reset(&mut self) {}
}

pub fn scripted_vad(states: Vec<VadState>) -> Box<VadFactory> {
    Box::new(move |_, _, _| {
        Box::new(ScriptedVad {
            states: states.clone(),
            idx: 0,
        })
    })
}

/// Poll `cond` until it holds or `timeout_ms` elapses
pub fn wait_for(mut cond: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
