use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod chat;
mod config;
mod error;
mod itinerary;
mod llm;
mod story;
mod tts;

#[cfg(test)]
mod test_support;

use api::routes::{create_router, AppState};
use config::Config;
use llm::{OpenAiBackend, RetryPolicy};
use tts::{PiperBackend, SpeechBackend, SpeechSynthesizer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.listen_addr()?;

    tracing::info!("Story gateway v{}", env!("CARGO_PKG_VERSION"));
    if config.llm_api_key.is_none() {
        tracing::warn!("No LLM_API_KEY set; completion requests will be unauthenticated");
    }

    let backend = OpenAiBackend::new(
        config.llm_base_url.as_str(),
        config.llm_api_key.clone().unwrap_or_default(),
        config.llm_model.as_str(),
    );
    tracing::info!("Completion backend: {} (model {})", config.llm_base_url, backend.model());

    // A missing voice leaves speech endpoints unavailable; stories still work.
    let speech: Option<Arc<dyn SpeechBackend>> =
        match PiperBackend::load(&config.voices_dir, &config.tts_voice) {
            Ok(piper) => {
                tracing::info!("Loaded voice {} from {}", config.tts_voice, config.voices_dir.display());
                Some(Arc::new(piper))
            }
            Err(e) => {
                tracing::warn!("Speech synthesis disabled: {}", e);
                None
            }
        };

    let state = Arc::new(AppState::new(
        Arc::new(backend),
        RetryPolicy::default().with_max_attempts(config.llm_max_attempts),
        SpeechSynthesizer::new(speech, config.audio_dir.clone()),
        config.batch_delay,
    ));

    let app = create_router(state, &config.cors_origins);

    tracing::info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
