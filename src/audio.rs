//! Minimal audio utilities
//!
//! The core never decodes audio. It probes WAV headers during upload
//! validation and writes a silent placeholder clip when the TTS collaborator
//! fails, so the client-side playback path stays uniform.

use std::io::Read;
use std::path::Path;

use crate::error::KioskError;

/// Silent placeholder parameters
const PLACEHOLDER_SAMPLE_RATE: u32 = 16_000;
const SECONDS_PER_CHAR: f64 = 0.1;
const MAX_PLACEHOLDER_SECS: f64 = 10.0;
const MIN_PLACEHOLDER_SECS: f64 = 0.5;

/// Probe the first 12 bytes for a RIFF/WAVE header
pub fn has_wav_header(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; 12];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header[0..4] == b"RIFF" && &header[8..12] == b"WAVE"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Write a silent mono 16-bit WAV whose length is proportional to the text
/// the TTS provider failed to speak, capped at ten seconds.
pub fn write_silent_wav(path: &Path, text: &str) -> Result<(), KioskError> {
    let seconds = (text.chars().count() as f64 * SECONDS_PER_CHAR)
        .clamp(MIN_PLACEHOLDER_SECS, MAX_PLACEHOLDER_SECS);
    let samples = (seconds * PLACEHOLDER_SAMPLE_RATE as f64) as u32;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| KioskError::Audio(format!("placeholder WAV create failed: {}", e)))?;
    for _ in 0..samples {
        writer
            .write_sample(0i16)
            .map_err(|e| KioskError::Audio(format!("placeholder WAV write failed: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| KioskError::Audio(format!("placeholder WAV finalize failed: {}", e)))?;
    Ok(())
}
