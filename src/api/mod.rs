pub mod handlers;
pub mod routes;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::itinerary::ItineraryRequest;
use crate::story::{StoryMetadata, StoryRequest, StoryResult, StorySections};
use crate::tts::{OutputMode, SpeechPayload, SpeechResult};

/// Sample rate reported when no audio could be produced.
const PLACEHOLDER_SAMPLE_RATE: u32 = 22050;

#[derive(Debug, Deserialize)]
pub struct SimpleStoryRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct StoryWithSpeechRequest {
    #[serde(flatten)]
    pub story: StoryRequest,
    #[serde(default)]
    pub generate_audio: bool,
    #[serde(default)]
    pub audio_format: OutputMode,
}

#[derive(Debug, Serialize)]
pub struct SpeechResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    pub format: String,
    pub sampling_rate: u32,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeechResponse {
    /// A JSON body cannot carry raw bytes, so those are base64-encoded too.
    pub fn from_result(result: SpeechResult) -> Self {
        let mut response = Self {
            audio_base64: None,
            format: result.format.to_string(),
            sampling_rate: result.sample_rate,
            duration: result.duration,
            size_bytes: Some(result.size_bytes),
            file_path: None,
            file_url: None,
            error: None,
        };

        match result.payload {
            SpeechPayload::Inline(encoded) => response.audio_base64 = Some(encoded),
            SpeechPayload::Raw(bytes) => {
                response.audio_base64 =
                    Some(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            SpeechPayload::File { path, url } => {
                response.file_path = Some(path.display().to_string());
                response.file_url = Some(url);
            }
        }

        response
    }

    pub fn missing(error: &str) -> Self {
        Self {
            audio_base64: None,
            format: "wav".to_string(),
            sampling_rate: PLACEHOLDER_SAMPLE_RATE,
            duration: 0.0,
            size_bytes: None,
            file_path: None,
            file_url: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoryWithSpeechResponse {
    pub title: String,
    pub content: String,
    pub sections: Option<StorySections>,
    pub metadata: Option<StoryMetadata>,
    pub audio: Option<SpeechResponse>,
}

impl StoryWithSpeechResponse {
    pub fn new(story: StoryResult, audio: Option<SpeechResponse>) -> Self {
        Self {
            title: story.title,
            content: story.content,
            sections: story.sections,
            metadata: story.metadata,
            audio,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpeechFileResponse {
    pub message: String,
    pub file_url: String,
    pub file_path: String,
    pub duration: f64,
    pub sampling_rate: u32,
    pub size_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct SpeechStatusResponse {
    pub available: bool,
    pub model: Option<String>,
    pub supported_formats: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct BatchItineraryRequest {
    pub inputs: Vec<ItineraryRequest>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub message: String,
}
