//! Chunk materialization.
//!
//! Turns the capture worker's accumulated PCM into the payload the driving
//! layer asked for: inline raw/WAV/Base64 bytes, or a file path. Failures
//! here cost one chunk, never the capture loop.

use crate::config::{ChunkEncoding, ChunkType};
use crate::core::event::{AudioChunk, ChunkData};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use uuid::Uuid;

fn wav_spec(samplerate: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate: samplerate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn pcm_to_wav(pcm: &[u8], samplerate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(samplerate, channels))?;
        let mut i16_writer = writer.get_i16_writer((pcm.len() / 2) as u32);
        for sample in pcm.chunks_exact(2) {
            i16_writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]));
        }
        i16_writer.flush()?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn write_chunk_file(
    dir: &Path,
    pcm: &[u8],
    samplerate: u32,
    channels: u16,
    encoding: ChunkEncoding,
) -> std::io::Result<PathBuf> {
    let (ext, bytes) = match encoding {
        ChunkEncoding::Wav => {
            let wav = pcm_to_wav(pcm, samplerate, channels)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            ("wav", wav)
        }
        // No encoder for mp3 and nothing to do for raw/b64 files: plain PCM.
        _ => ("pcm", pcm.to_vec()),
    };

    let path = dir.join(format!("ivs-chunk-{}.{ext}", Uuid::new_v4()));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Materialize one chunk, or `None` when it cannot be represented.
pub fn materialize(
    pcm: &[u8],
    samplerate: u32,
    channels: u16,
    chunk_type: ChunkType,
    encoding: ChunkEncoding,
    chunk_dir: &Path,
) -> Option<AudioChunk> {
    if pcm.is_empty() {
        return None;
    }

    let bytes_per_sec = (samplerate as usize) * (channels as usize) * 2;
    let time_sec = (pcm.len() / bytes_per_sec.max(1)) as u32;

    let data = match chunk_type {
        ChunkType::File => match write_chunk_file(chunk_dir, pcm, samplerate, channels, encoding) {
            Ok(path) => ChunkData::File(path),
            Err(e) => {
                error!("chunk file write failed: {e}");
                return None;
            }
        },
        ChunkType::Buffer => match encoding {
            ChunkEncoding::Raw => ChunkData::Bytes(pcm.to_vec()),
            ChunkEncoding::B64 => ChunkData::Bytes(BASE64.encode(pcm).into_bytes()),
            ChunkEncoding::Wav => match pcm_to_wav(pcm, samplerate, channels) {
                Ok(wav) => ChunkData::Bytes(wav),
                Err(e) => {
                    error!("wav encode failed: {e}");
                    return None;
                }
            },
            ChunkEncoding::Mp3 => {
                warn!("unsupported buffer encoding: {encoding}");
                return None;
            }
        },
    };

    Some(AudioChunk {
        samplerate,
        channels,
        time_sec,
        length: pcm.len(),
        data,
    })
}
