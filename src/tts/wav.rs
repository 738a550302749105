use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::TtsError;

/// Encode mono f32 samples in [-1.0, 1.0] as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, TtsError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buffer), spec)
            .map_err(|e| TtsError::Encoding(format!("Failed to create WAV writer: {}", e)))?;

        for sample in samples {
            let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| TtsError::Encoding(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| TtsError::Encoding(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(buffer)
}
