use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{
    BannerResponse, BatchItineraryRequest, HealthResponse, SimpleStoryRequest, SpeechFileResponse,
    SpeechResponse, SpeechStatusResponse, StoryWithSpeechRequest, StoryWithSpeechResponse,
};
use crate::api::routes::AppState;
use crate::chat::{ChatMessage, ChatReply};
use crate::error::AppError;
use crate::itinerary::{ItineraryRequest, ItineraryResponse};
use crate::story::{StoryRequest, StoryResult};
use crate::tts::{OutputMode, SpeechOutcome, SpeechPayload, SpeechRequest, SpeechResult};

const SPEECH_UNAVAILABLE: &str =
    "TTS service is not available. Please check if the model is loaded correctly.";
const SPEECH_FAILED: &str = "Failed to generate TTS audio";
const AUDIO_EXTENSIONS: [&str; 3] = ["wav", "mp3", "ogg"];

pub async fn generate_story(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SimpleStoryRequest>,
) -> Result<Json<StoryResult>, AppError> {
    if request.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("Prompt cannot be empty".into()));
    }

    let result = state.orchestrator.generate_simple(&request.prompt).await;
    story_response(result).map(Json)
}

pub async fn generate_advanced_story(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StoryRequest>,
) -> Result<Json<StoryResult>, AppError> {
    request.validate().map_err(AppError::BadRequest)?;

    let result = state.orchestrator.generate_advanced(request).await;
    story_response(result).map(Json)
}

pub async fn generate_story_with_speech(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StoryWithSpeechRequest>,
) -> Result<Json<StoryWithSpeechResponse>, AppError> {
    request.story.validate().map_err(AppError::BadRequest)?;

    let story = story_response(state.orchestrator.generate_advanced(request.story).await)?;

    let audio = if request.generate_audio && !story.content.is_empty() {
        let speech_request = SpeechRequest::new(story.content.clone(), request.audio_format);
        let audio = match synthesize(&state, speech_request).await? {
            SpeechOutcome::Ready(result) => SpeechResponse::from_result(result),
            SpeechOutcome::Unavailable => SpeechResponse::missing("TTS service is not available"),
            SpeechOutcome::Failed => SpeechResponse::missing(SPEECH_FAILED),
        };
        Some(audio)
    } else {
        None
    };

    Ok(Json(StoryWithSpeechResponse::new(story, audio)))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ChatMessage>,
) -> Result<Json<ChatReply>, AppError> {
    if message.content.trim().is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".into()));
    }

    Ok(Json(state.chat.reply(message).await))
}

pub async fn generate_itinerary(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ItineraryRequest>,
) -> Result<Json<ItineraryResponse>, AppError> {
    request.validate().map_err(AppError::BadRequest)?;

    let result = state.itinerary.plan(&request).await?;

    Ok(Json(ItineraryResponse {
        destination: request.destination,
        result: Some(result),
        error: None,
    }))
}

pub async fn batch_itinerary(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<BatchItineraryRequest>,
) -> Json<Vec<ItineraryResponse>> {
    Json(state.itinerary.plan_batch(batch.inputs).await)
}

pub async fn speech_status(State(state): State<Arc<AppState>>) -> Json<SpeechStatusResponse> {
    Json(SpeechStatusResponse {
        available: state.speech.is_available(),
        model: state.speech.model_name().map(str::to_string),
        supported_formats: vec!["base64", "bytes", "wav", "file"],
    })
}

pub async fn generate_speech(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeechRequest>,
) -> Result<Json<SpeechResponse>, AppError> {
    let result = require_speech(&state, request).await?;
    Ok(Json(SpeechResponse::from_result(result)))
}

pub async fn generate_speech_wav(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<SpeechRequest>,
) -> Result<Response, AppError> {
    request.output_format = OutputMode::Bytes;
    let result = require_speech(&state, request).await?;

    let SpeechPayload::Raw(wav) = result.payload else {
        return Err(AppError::Generation(SPEECH_FAILED.into()));
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=tts_output.wav",
            ),
        ],
        wav,
    )
        .into_response())
}

pub async fn generate_speech_file(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<SpeechRequest>,
) -> Result<Json<SpeechFileResponse>, AppError> {
    request.output_format = OutputMode::File;
    let result = require_speech(&state, request).await?;

    let SpeechPayload::File { path, url } = result.payload else {
        return Err(AppError::Generation(SPEECH_FAILED.into()));
    };

    Ok(Json(SpeechFileResponse {
        message: "Audio file generated successfully".to_string(),
        file_url: url,
        file_path: path.display().to_string(),
        duration: result.duration,
        sampling_rate: result.sample_rate,
        size_bytes: result.size_bytes,
    }))
}

pub async fn serve_audio(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if filename.is_empty()
        || filename.contains(['/', '\\'])
        || filename.contains("..")
    {
        return Err(AppError::BadRequest("Invalid audio file name".into()));
    }

    let path = state.speech.audio_dir().join(&filename);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AppError::NotFound("Audio file not found".into()));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::BadRequest("Invalid audio file format".into()));
    }

    let content_type = match extension.as_str() {
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        _ => "audio/wav",
    };

    let bytes = tokio::fs::read(&path).await?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Story gateway is running".to_string(),
    })
}

fn story_response(mut result: StoryResult) -> Result<StoryResult, AppError> {
    if result.is_error() {
        let message = result.error.take().unwrap_or_default();
        return Err(AppError::Generation(message));
    }
    Ok(result)
}

/// Synthesis is compute-bound, so it runs off the async workers.
async fn synthesize(state: &Arc<AppState>, request: SpeechRequest) -> Result<SpeechOutcome, AppError> {
    let state = Arc::clone(state);
    let outcome = tokio::task::spawn_blocking(move || state.speech.synthesize(&request)).await?;
    Ok(outcome)
}

async fn require_speech(state: &Arc<AppState>, request: SpeechRequest) -> Result<SpeechResult, AppError> {
    if !state.speech.is_available() {
        return Err(AppError::ServiceUnavailable(SPEECH_UNAVAILABLE.into()));
    }
    request.validate().map_err(AppError::BadRequest)?;

    match synthesize(state, request).await? {
        SpeechOutcome::Ready(result) => Ok(result),
        SpeechOutcome::Unavailable => Err(AppError::ServiceUnavailable(SPEECH_UNAVAILABLE.into())),
        SpeechOutcome::Failed => Err(AppError::Generation(SPEECH_FAILED.into())),
    }
}
