use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use super::voice::Voice;
use super::{SpeechBackend, TtsError, Waveform};

/// A Piper VITS voice running on ONNX Runtime.
///
/// The session is loaded once and shared; inference calls are serialized
/// through the mutex, so the backend can be used from many requests at once.
pub struct PiperBackend {
    voice: Voice,
    session: Mutex<Session>,
    noise_scale: f32,
    length_scale: f32,
    noise_w: f32,
}

impl PiperBackend {
    pub fn load(voices_dir: &Path, voice_id: &str) -> Result<Self, TtsError> {
        let voice = Voice::load(voices_dir, voice_id)?;

        let session = Session::builder()
            .map_err(|e| TtsError::Model(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| TtsError::Model(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| TtsError::Model(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&voice.model_path)
            .map_err(|e| TtsError::Model(format!("Failed to load model: {}", e)))?;

        let inference = voice.config.inference.clone().unwrap_or_default();

        Ok(Self {
            session: Mutex::new(session),
            noise_scale: inference.noise_scale,
            length_scale: inference.length_scale,
            noise_w: inference.noise_w,
            voice,
        })
    }

    fn infer(&self, phoneme_ids: &[i64]) -> Result<Vec<f32>, TtsError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();

        // input: [batch, sequence], input_lengths: [batch], scales: [3]
        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(|e| TtsError::Synthesis(format!("Failed to create input tensor: {}", e)))?;
        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(|e| TtsError::Synthesis(format!("Failed to create lengths tensor: {}", e)))?;
        let scales_value = Value::from_array((
            vec![3],
            vec![self.noise_scale, self.length_scale, self.noise_w],
        ))
        .map_err(|e| TtsError::Synthesis(format!("Failed to create scales tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| TtsError::Synthesis("Voice session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![input_value, lengths_value, scales_value])
            .map_err(|e| TtsError::Synthesis(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| TtsError::Synthesis("Missing output tensor".to_string()))?;

        let audio = output
            .try_extract_tensor::<f32>()
            .map_err(|e| TtsError::Synthesis(format!("Failed to extract output tensor: {}", e)))?;

        Ok(audio.1.iter().copied().collect())
    }
}

impl SpeechBackend for PiperBackend {
    fn synthesize(&self, text: &str) -> Result<Waveform, TtsError> {
        let phonemes = phonemize(text, self.voice.espeak_voice())?;
        let ids = phonemes_to_ids(&phonemes, &self.voice.config.phoneme_id_map);
        let samples = self.infer(&ids)?;

        Ok(Waveform {
            samples,
            sample_rate: self.voice.sample_rate(),
        })
    }

    fn name(&self) -> &str {
        &self.voice.id
    }
}

/// Convert text to IPA phonemes using espeak-ng.
pub fn phonemize(text: &str, espeak_voice: &str) -> Result<String, TtsError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let output = Command::new("espeak-ng")
        .args(["--ipa", "-q", "-v", espeak_voice, text])
        .output()
        .map_err(|e| TtsError::Phonemizer(format!("Failed to run espeak-ng (is it installed?): {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TtsError::Phonemizer(format!("espeak-ng failed: {}", stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Map phonemes to model ids: BOS, each phoneme followed by the pad id, EOS.
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let pad = id_map.get("_");
    let mut ids = id_map.get("^").cloned().unwrap_or_else(|| vec![0]);

    let mut buf = [0u8; 4];
    for ch in phonemes.chars() {
        if let Some(mapped) = id_map.get(&*ch.encode_utf8(&mut buf)) {
            ids.extend(mapped);
        }
        if let Some(pad) = pad {
            ids.extend(pad);
        }
    }

    match id_map.get("$") {
        Some(eos) => ids.extend(eos),
        None => ids.push(0),
    }

    ids
}
