//! Owned audio payloads moved through the injection queues.

/// One buffer of call audio (or, on the DTMF queue's sibling path, raw
/// digit bytes). Created by frame producers, consumed and freed by the
/// capture worker.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samplerate: u32,
    pub channels: u16,
    pub data: Vec<u8>,
}

impl AudioBuffer {
    pub fn new(data: Vec<u8>, samplerate: u32, channels: u16) -> Self {
        Self {
            samplerate,
            channels,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
