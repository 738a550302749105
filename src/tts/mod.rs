pub mod piper;
pub mod voice;
pub mod wav;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use serde::Deserialize;

pub use piper::PiperBackend;

/// Maximum characters handed to the speech model per request.
pub const MAX_TTS_CHARS: usize = 500;
/// Public route under which saved audio files are served.
pub const AUDIO_URL_PREFIX: &str = "/api/v1/tts/audio";

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Failed to load speech model: {0}")]
    Model(String),

    #[error("Phonemization failed: {0}")]
    Phonemizer(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio encoding failed: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mono audio produced by a speech model.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A text-to-speech model. Implementations must be safe to call from
/// several requests at once.
pub trait SpeechBackend: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Waveform, TtsError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// WAV bytes encoded as base64 inside the JSON response.
    #[default]
    Base64,
    /// WAV bytes returned as-is.
    #[serde(alias = "wav")]
    Bytes,
    /// WAV written to the audio directory, referenced by path and URL.
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub output_format: OutputMode,
    #[serde(default)]
    pub filename: Option<String>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, output_format: OutputMode) -> Self {
        Self {
            text: text.into(),
            output_format,
            filename: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("Text cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechPayload {
    Inline(String),
    Raw(Vec<u8>),
    File { path: PathBuf, url: String },
}

#[derive(Debug, Clone)]
pub struct SpeechResult {
    pub format: &'static str,
    pub sample_rate: u32,
    /// Seconds of audio.
    pub duration: f64,
    pub size_bytes: usize,
    pub payload: SpeechPayload,
}

#[derive(Debug, Clone)]
pub enum SpeechOutcome {
    /// No speech model is loaded; nothing was attempted.
    Unavailable,
    /// The model or the audio writer failed. Details are logged.
    Failed,
    Ready(SpeechResult),
}

/// Sanitizes text, runs the speech model and packages the audio in the
/// requested output mode.
pub struct SpeechSynthesizer {
    backend: Option<Arc<dyn SpeechBackend>>,
    audio_dir: PathBuf,
}

impl SpeechSynthesizer {
    pub fn new(backend: Option<Arc<dyn SpeechBackend>>, audio_dir: PathBuf) -> Self {
        Self { backend, audio_dir }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn synthesize(&self, request: &SpeechRequest) -> SpeechOutcome {
        let Some(backend) = &self.backend else {
            return SpeechOutcome::Unavailable;
        };

        let text = sanitize_text(&request.text);
        if text.is_empty() {
            return SpeechOutcome::Failed;
        }

        match self.render(backend.as_ref(), &text, request) {
            Ok(result) => {
                tracing::info!(
                    "Synthesized {:.2}s of audio ({} bytes) from {} chars",
                    result.duration,
                    result.size_bytes,
                    text.chars().count()
                );
                SpeechOutcome::Ready(result)
            }
            Err(e) => {
                tracing::error!("Speech synthesis failed: {}", e);
                SpeechOutcome::Failed
            }
        }
    }

    fn render(
        &self,
        backend: &dyn SpeechBackend,
        text: &str,
        request: &SpeechRequest,
    ) -> Result<SpeechResult, TtsError> {
        let waveform = backend.synthesize(text)?;
        if waveform.sample_rate == 0 {
            return Err(TtsError::Synthesis("Model reported a zero sample rate".to_string()));
        }

        let duration = waveform.samples.len() as f64 / waveform.sample_rate as f64;
        let wav = wav::encode_wav(&waveform.samples, waveform.sample_rate)?;
        let size_bytes = wav.len();

        let payload = match request.output_format {
            OutputMode::Base64 => {
                SpeechPayload::Inline(base64::engine::general_purpose::STANDARD.encode(&wav))
            }
            OutputMode::Bytes => SpeechPayload::Raw(wav),
            OutputMode::File => {
                let name = audio_file_name(request.filename.as_deref());
                std::fs::create_dir_all(&self.audio_dir)?;
                let path = self.audio_dir.join(&name);
                std::fs::write(&path, &wav)?;
                SpeechPayload::File {
                    url: format!("{}/{}", AUDIO_URL_PREFIX, name),
                    path,
                }
            }
        };

        Ok(SpeechResult {
            format: "wav",
            sample_rate: waveform.sample_rate,
            duration,
            size_bytes,
            payload,
        })
    }
}

/// Collapse whitespace and cap the text at [`MAX_TTS_CHARS`], cutting at the
/// last whole word and appending `...` when shortened.
pub fn sanitize_text(text: &str) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let Some((cut, next)) = cleaned.char_indices().nth(MAX_TTS_CHARS) else {
        return cleaned;
    };

    let head = &cleaned[..cut];
    let kept = if next == ' ' {
        head
    } else {
        // A single word longer than the budget has no boundary to cut at.
        head.rsplit_once(' ').map_or(head, |(words, _)| words)
    };

    format!("{}...", kept)
}

/// File name for saved audio: the caller's name reduced to a safe stem, or a
/// timestamped unique one.
fn audio_file_name(requested: Option<&str>) -> String {
    let stem: String = requested
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy())
        .map(|name| {
            let mut stem: String = name
                .trim_end_matches(".wav")
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                .collect();
            // Names with ".." are refused when served back.
            while stem.contains("..") {
                stem = stem.replace("..", ".");
            }
            stem.trim_matches('.').to_string()
        })
        .unwrap_or_default();

    if stem.is_empty() {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "tts_{}_{}.wav",
            chrono::Utc::now().timestamp_millis(),
            &unique[..8]
        )
    } else {
        format!("{}.wav", stem)
    }
}
