use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::chat::ChatService;
use crate::config::CorsOrigins;
use crate::itinerary::ItineraryPlanner;
use crate::llm::structured::StructuredClient;
use crate::llm::{CompletionBackend, RetryPolicy};
use crate::story::StoryOrchestrator;
use crate::tts::SpeechSynthesizer;

pub struct AppState {
    pub orchestrator: StoryOrchestrator,
    pub chat: ChatService,
    pub itinerary: ItineraryPlanner,
    pub speech: SpeechSynthesizer,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        retry: RetryPolicy,
        speech: SpeechSynthesizer,
        batch_delay: Duration,
    ) -> Self {
        Self {
            orchestrator: StoryOrchestrator::new(StructuredClient::new(
                Arc::clone(&backend),
                retry.clone(),
            )),
            chat: ChatService::new(Arc::clone(&backend), retry.clone()),
            itinerary: ItineraryPlanner::new(backend, retry, batch_delay),
            speech,
        }
    }
}

pub fn create_router(state: Arc<AppState>, origins: &CorsOrigins) -> Router {
    let api_routes = Router::new()
        .route("/generate-story", post(handlers::generate_story))
        .route("/generate-advanced-story", post(handlers::generate_advanced_story))
        .route("/generate-story-with-tts", post(handlers::generate_story_with_speech))
        .route("/chat", post(handlers::chat))
        .route("/generate-itinerary", post(handlers::generate_itinerary))
        .route("/batch-itinerary", post(handlers::batch_itinerary))
        .route("/tts/status", get(handlers::speech_status))
        .route("/tts/generate", post(handlers::generate_speech))
        .route("/tts/generate-wav", post(handlers::generate_speech_wav))
        .route("/tts/generate-file", post(handlers::generate_speech_file))
        .route("/tts/audio/:filename", get(handlers::serve_audio));

    Router::new()
        .route("/", get(handlers::banner))
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .nest("/api/v1", api_routes)
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match origins {
        CorsOrigins::Any => cors.allow_origin(Any),
        CorsOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            // Credentials cannot be combined with a wildcard origin.
            cors.allow_origin(AllowOrigin::list(allowed))
                .allow_credentials(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::test_support::{FakeSpeech, Scripted, ScriptedBackend};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::path::Path;
    use tower::ServiceExt;

    fn story_call() -> Scripted {
        Scripted::tool_call(
            "create_story",
            json!({
                "title": "Con mèo",
                "story_content": "Con mèo ngủ. The cat sleeps."
            })
            .to_string(),
        )
    }

    fn app(backend: &ScriptedBackend, speech: Option<Arc<FakeSpeech>>, audio_dir: &Path) -> Router {
        let speech = SpeechSynthesizer::new(
            speech.map(|s| s as Arc<dyn crate::tts::SpeechBackend>),
            audio_dir.to_path_buf(),
        );
        let state = AppState::new(
            backend.clone().into_arc(),
            RetryPolicy::immediate(),
            speech,
            Duration::ZERO,
        );
        create_router(Arc::new(state), &CorsOrigins::Any)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_is_served_at_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        for path in ["/health", "/api/health"] {
            let (status, body) = send_json(app(&backend, None, dir.path()), get(path)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
        }

        let (status, body) = send_json(app(&backend, None, dir.path()), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn simple_story_returns_result_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![story_call()]);

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json("/api/v1/generate-story", json!({"prompt": "a cat"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Con mèo");
        assert_eq!(body["metadata"]["word_count"], 6);
        assert!(body["metadata"]["generation_time"].is_u64());
        assert!(body["error"].is_null());
    }

    #[tokio::test]
    async fn failed_story_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Scripted::error(LlmError::Authentication)]);

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json("/api/v1/generate-story", json!({"prompt": "a cat"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "GENERATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("Authentication"));
    }

    #[tokio::test]
    async fn invalid_advanced_request_never_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json(
                "/api/v1/generate-advanced-story",
                json!({"prompt": "a fox", "preferences": {"language_mix": {"ratio": 150}}}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_ratio_gets_json_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json(
                "/api/v1/generate-advanced-story",
                json!({"prompt": "a fox", "preferences": {"language_mix": {"ratio": 300}}}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn story_with_speech_survives_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![story_call()]);

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json(
                "/api/v1/generate-story-with-tts",
                json!({"prompt": "a cat", "generate_audio": true}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "Con mèo ngủ. The cat sleeps.");
        assert_eq!(body["audio"]["error"], "TTS service is not available");
        assert_eq!(body["audio"]["sampling_rate"], 22050);
        assert_eq!(body["audio"]["duration"], 0.0);
    }

    #[tokio::test]
    async fn story_with_speech_attaches_audio() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![story_call()]);
        let speech = Arc::new(FakeSpeech::default());

        let (status, body) = send_json(
            app(&backend, Some(speech.clone()), dir.path()),
            post_json(
                "/api/v1/generate-story-with-tts",
                json!({"prompt": "a cat", "generate_audio": true, "audio_format": "base64"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["audio"]["audio_base64"].is_string());
        assert!(body["audio"].get("error").is_none());
        assert_eq!(speech.texts(), vec!["Con mèo ngủ. The cat sleeps.".to_string()]);
    }

    #[tokio::test]
    async fn speech_endpoints_report_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        let (status, body) =
            send_json(app(&backend, None, dir.path()), get("/api/v1/tts/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], false);

        for uri in [
            "/api/v1/tts/generate",
            "/api/v1/tts/generate-wav",
            "/api/v1/tts/generate-file",
        ] {
            let (status, _) = send(
                app(&backend, None, dir.path()),
                post_json(uri, json!({"text": "xin chào"})),
            )
            .await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn blank_speech_text_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::default());

        let (status, _) = send(
            app(&ScriptedBackend::default(), Some(speech.clone()), dir.path()),
            post_json("/api/v1/tts/generate", json!({"text": "   "})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(speech.calls(), 0);
    }

    #[tokio::test]
    async fn model_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::failing());

        let (status, body) = send_json(
            app(&ScriptedBackend::default(), Some(speech), dir.path()),
            post_json("/api/v1/tts/generate", json!({"text": "xin chào"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to generate TTS audio");
    }

    #[tokio::test]
    async fn wav_endpoint_returns_audio_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::default());

        let response = app(&ScriptedBackend::default(), Some(speech), dir.path())
            .oneshot(post_json("/api/v1/tts/generate-wav", json!({"text": "xin chào"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "audio/wav");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.starts_with(b"RIFF"));
    }

    #[tokio::test]
    async fn wav_endpoint_accepts_wav_format() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::default());

        let response = app(&ScriptedBackend::default(), Some(speech), dir.path())
            .oneshot(post_json(
                "/api/v1/tts/generate-wav",
                json!({"text": "xin chào", "output_format": "wav"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.starts_with(b"RIFF"));
    }

    #[tokio::test]
    async fn generated_file_is_served_back() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::default());
        let backend = ScriptedBackend::default();

        let (status, body) = send_json(
            app(&backend, Some(speech.clone()), dir.path()),
            post_json(
                "/api/v1/tts/generate-file",
                json!({"text": "xin chào", "filename": "greeting"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["file_url"], "/api/v1/tts/audio/greeting.wav");

        let (status, audio) = send(
            app(&backend, Some(speech), dir.path()),
            get("/api/v1/tts/audio/greeting.wav"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(audio.len() as u64, body["size_bytes"].as_u64().unwrap());
    }

    #[tokio::test]
    async fn dotted_file_name_is_still_served() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::default());
        let backend = ScriptedBackend::default();

        let (status, body) = send_json(
            app(&backend, Some(speech.clone()), dir.path()),
            post_json(
                "/api/v1/tts/generate-file",
                json!({"text": "xin chào", "filename": "a..b"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let url = body["file_url"].as_str().unwrap();
        assert_eq!(url, "/api/v1/tts/audio/a.b.wav");

        let (status, _) = send(app(&backend, Some(speech), dir.path()), get(url)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn audio_serving_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        let backend = ScriptedBackend::default();

        let cases = [
            ("/api/v1/tts/audio/missing.wav", StatusCode::NOT_FOUND),
            ("/api/v1/tts/audio/notes.txt", StatusCode::BAD_REQUEST),
            ("/api/v1/tts/audio/..%2Fsecret.wav", StatusCode::BAD_REQUEST),
        ];

        for (uri, expected) in cases {
            let (status, _) = send(app(&backend, None, dir.path()), get(uri)).await;
            assert_eq!(status, expected, "{}", uri);
        }
    }

    #[tokio::test]
    async fn chat_returns_reply() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Scripted::text("Chào!")]);

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json("/api/v1/chat", json!({"content": "Xin chào"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Chào!");
    }

    #[tokio::test]
    async fn itinerary_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![
            Scripted::tool_call("generate_itinerary", r#"{"destination": "Hanoi", "days": 2}"#),
            Scripted::tool_call("generate_itinerary", r#"{"destination": "Hue", "days": 1}"#),
            Scripted::error(LlmError::Authentication),
        ]);

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json(
                "/api/v1/generate-itinerary",
                json!({"prompt": "Plan Hanoi", "destination": "Hanoi", "days": 2}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["days"], 2);

        let (status, body) = send_json(
            app(&backend, None, dir.path()),
            post_json(
                "/api/v1/batch-itinerary",
                json!({"inputs": [
                    {"prompt": "Plan Hue", "destination": "Hue", "days": 1},
                    {"prompt": "Plan Sapa", "destination": "Sapa", "days": 3}
                ]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["result"]["destination"], "Hue");
        assert!(body[1]["error"].is_string());
    }

    #[tokio::test]
    async fn zero_day_itinerary_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::default();

        let (status, _) = send(
            app(&backend, None, dir.path()),
            post_json(
                "/api/v1/generate-itinerary",
                json!({"prompt": "Plan", "destination": "Hanoi", "days": 0}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(backend.requests().is_empty());
    }
}
