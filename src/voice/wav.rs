//! WAV encoding for speech-to-text uploads

use crate::pipeline::AudioSegment;
use crate::{Error, Result};

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    // Convert f32 [-1.0, 1.0] to i16
    #[allow(clippy::cast_possible_truncation)]
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&sample| (sample * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect();
    pcm_to_wav(&pcm, sample_rate)
}

/// Encode signed 16-bit PCM as mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Encode a captured segment as WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn segment_to_wav(segment: &AudioSegment) -> Result<Vec<u8>> {
    samples_to_wav(&segment.samples, segment.sample_rate)
}

/// Decode a 16-bit WAV file into a segment
///
/// # Errors
///
/// Returns error if the file is not 16-bit integer PCM
pub fn wav_to_segment(bytes: &[u8]) -> Result<AudioSegment> {
    let mut reader =
        hound::WavReader::new(std::io::Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported WAV format: {:?} {}-bit",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let channels = usize::from(spec.channels.max(1));
    let interleaved = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    // Downmix to mono
    #[allow(clippy::cast_precision_loss)]
    let samples = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect();

    Ok(AudioSegment {
        samples,
        sample_rate: spec.sample_rate,
    })
}
