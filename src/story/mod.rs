pub mod metrics;
pub mod prompt;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::llm::structured::{GlossaryEntry, QuizQuestion, StructuredClient, StructuredStoryRecord};
use crate::llm::LlmError;

pub use metrics::LanguageRatio;
pub use prompt::build_prompt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum StoryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl From<String> for StoryLength {
    fn from(value: String) -> Self {
        match value.as_str() {
            "short" => StoryLength::Short,
            "long" => StoryLength::Long,
            _ => StoryLength::Medium,
        }
    }
}

impl StoryLength {
    pub fn word_range(self) -> &'static str {
        match self {
            StoryLength::Short => "150-250 words",
            StoryLength::Medium => "250-400 words",
            StoryLength::Long => "400-600 words",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Vi,
    En,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::Vi => "vi",
            Language::En => "en",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageMix {
    /// Percentage of Vietnamese (0-100).
    #[serde(default = "default_ratio")]
    pub ratio: u16,
    #[serde(default)]
    pub base_language: Language,
    #[serde(default = "default_target_language")]
    pub target_language: Language,
}

fn default_ratio() -> u16 {
    50
}

fn default_target_language() -> Language {
    Language::En
}

impl Default for LanguageMix {
    fn default() -> Self {
        Self {
            ratio: default_ratio(),
            base_language: Language::Vi,
            target_language: default_target_language(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storytelling {
    #[default]
    Narrative,
    Dialogue,
    Descriptive,
    Mixed,
}

impl fmt::Display for Storytelling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Storytelling::Narrative => "narrative",
            Storytelling::Dialogue => "dialogue",
            Storytelling::Descriptive => "descriptive",
            Storytelling::Mixed => "mixed",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Friendly,
    Formal,
    Casual,
    Educational,
    Entertaining,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tone::Friendly => "friendly",
            Tone::Formal => "formal",
            Tone::Casual => "casual",
            Tone::Educational => "educational",
            Tone::Entertaining => "entertaining",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readability {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl fmt::Display for Readability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Readability::Beginner => "beginner",
            Readability::Intermediate => "intermediate",
            Readability::Advanced => "advanced",
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryStyle {
    pub storytelling: Storytelling,
    pub tone: Tone,
    pub readability_level: Readability,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryFormat {
    pub bold_english: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryStructure {
    pub sections: Vec<String>,
    pub include_quiz: bool,
    pub include_glossary: bool,
}

impl Default for StoryStructure {
    fn default() -> Self {
        Self {
            sections: vec!["story".to_string()],
            include_quiz: false,
            include_glossary: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationPreferences {
    pub length: StoryLength,
    pub language_mix: Option<LanguageMix>,
    pub style: Option<StoryStyle>,
    pub format: Option<StoryFormat>,
    pub structure: Option<StoryStructure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub vocab_focus: Option<Vec<String>>,
    pub core_topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoryRequest {
    pub prompt: String,
    #[serde(default)]
    pub config: Option<GenerationConfig>,
    #[serde(default)]
    pub preferences: Option<GenerationPreferences>,
    #[serde(default)]
    pub template_id: Option<String>,
}

impl StoryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            config: None,
            preferences: None,
            template_id: None,
        }
    }

    /// Reject requests that cannot produce a story before any backend call.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Prompt cannot be empty".to_string());
        }
        if let Some(mix) = self.preferences.as_ref().and_then(|p| p.language_mix.as_ref()) {
            if mix.ratio > 100 {
                return Err(format!(
                    "Language mix ratio must be between 0 and 100, got {}",
                    mix.ratio
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StorySections {
    pub story: String,
    pub moral: Option<String>,
    pub quiz: Option<Vec<QuizQuestion>>,
    pub glossary: Option<Vec<GlossaryEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryMetadata {
    pub word_count: usize,
    pub language_ratio: LanguageRatio,
    /// Milliseconds spent waiting on the model.
    #[serde(rename = "generation_time")]
    pub generation_time_ms: u64,
    pub readability_score: u8,
}

/// Outcome of a story generation.
///
/// Failures use the same shape as successes: blank title and content with
/// `error` set.
#[derive(Debug, Clone, Serialize)]
pub struct StoryResult {
    pub title: String,
    pub content: String,
    pub sections: Option<StorySections>,
    pub metadata: Option<StoryMetadata>,
    pub error: Option<String>,
}

impl StoryResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            sections: None,
            metadata: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn from_record(record: StructuredStoryRecord, generation_time_ms: u64) -> Self {
        let metadata = StoryMetadata {
            word_count: metrics::word_count(&record.story_content),
            language_ratio: metrics::calculate_language_ratio(&record.story_content),
            generation_time_ms,
            readability_score: metrics::calculate_readability_score(&record.story_content),
        };

        let sections = StorySections {
            story: record.story_content.clone(),
            moral: record.moral,
            quiz: record.quiz_questions,
            glossary: record.glossary,
        };

        Self {
            title: record.title,
            content: record.story_content,
            sections: Some(sections),
            metadata: Some(metadata),
            error: None,
        }
    }
}

/// Runs prompt compilation, structured generation and text metrics as one
/// operation. Nothing below this boundary escapes as an error.
pub struct StoryOrchestrator {
    client: StructuredClient,
}

impl StoryOrchestrator {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    /// Generate from a bare prompt, without compiling preferences.
    pub async fn generate_simple(&self, prompt: &str) -> StoryResult {
        self.run(Instant::now(), prompt.to_string())
            .await
            .unwrap_or_else(Self::collapse)
    }

    /// Generate from a fully configured request.
    pub async fn generate_advanced(&self, request: StoryRequest) -> StoryResult {
        let start = Instant::now();
        if let Some(template) = &request.template_id {
            tracing::debug!("Story request from template {}", template);
        }
        let prompt = build_prompt(&request);
        self.run(start, prompt)
            .await
            .unwrap_or_else(Self::collapse)
    }

    /// `start` is taken by the caller so prompt compilation counts toward
    /// the reported generation time.
    async fn run(&self, start: Instant, prompt: String) -> Result<StoryResult, LlmError> {
        let record = self.client.generate_structured(&prompt).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Generated story '{}' in {}ms",
            record.title,
            elapsed_ms
        );

        Ok(StoryResult::from_record(record, elapsed_ms))
    }

    fn collapse(error: LlmError) -> StoryResult {
        tracing::error!("Story generation failed: {}", error);
        StoryResult::failed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::retry::RetryPolicy;
    use crate::test_support::{Scripted, ScriptedBackend};

    fn orchestrator(backend: &ScriptedBackend) -> StoryOrchestrator {
        StoryOrchestrator::new(StructuredClient::new(
            backend.clone().into_arc(),
            RetryPolicy::immediate(),
        ))
    }

    fn story_call(args: serde_json::Value) -> Scripted {
        Scripted::tool_call("create_story", args.to_string())
    }

    #[test]
    fn length_deserializes_unknown_as_medium() {
        let length: StoryLength = serde_json::from_str("\"epic\"").unwrap();
        assert_eq!(length, StoryLength::Medium);
        let length: StoryLength = serde_json::from_str("\"short\"").unwrap();
        assert_eq!(length, StoryLength::Short);
    }

    #[test]
    fn preferences_fill_documented_defaults() {
        let prefs: GenerationPreferences = serde_json::from_str(
            r#"{"language_mix": {}, "style": {}, "structure": {"include_quiz": true}}"#,
        )
        .unwrap();

        assert_eq!(prefs.length, StoryLength::Medium);
        let mix = prefs.language_mix.unwrap();
        assert_eq!(mix.ratio, 50);
        assert_eq!(mix.base_language, Language::Vi);
        assert_eq!(mix.target_language, Language::En);
        let style = prefs.style.unwrap();
        assert_eq!(style.storytelling, Storytelling::Narrative);
        assert_eq!(style.readability_level, Readability::Intermediate);
        let structure = prefs.structure.unwrap();
        assert_eq!(structure.sections, vec!["story".to_string()]);
        assert!(structure.include_quiz);
        assert!(prefs.format.is_none());
    }

    #[test]
    fn validate_rejects_blank_prompt_and_bad_ratio() {
        assert!(StoryRequest::new("   ").validate().is_err());
        assert!(StoryRequest::new("a fox").validate().is_ok());

        let mut req = StoryRequest::new("a fox");
        req.preferences = Some(GenerationPreferences {
            language_mix: Some(LanguageMix {
                ratio: 120,
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn simple_story_passes_raw_prompt() {
        let backend = ScriptedBackend::new(vec![story_call(serde_json::json!({
            "title": "Mèo con",
            "story_content": "Con mèo nhỏ. It likes fish."
        }))]);

        let result = orchestrator(&backend).generate_simple("a cat story").await;

        assert!(!result.is_error());
        assert_eq!(result.title, "Mèo con");
        assert_eq!(result.content, "Con mèo nhỏ. It likes fish.");
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[1].content, "a cat story");

        let metadata = result.metadata.unwrap();
        assert_eq!(metadata.word_count, 6);
        assert_eq!(metadata.readability_score, 85);
        let sections = result.sections.unwrap();
        assert_eq!(sections.story, result.content);
        assert!(sections.quiz.is_none());
    }

    #[tokio::test]
    async fn advanced_story_sends_compiled_prompt() {
        let backend = ScriptedBackend::new(vec![story_call(serde_json::json!({
            "title": "Garden",
            "story_content": "A cat sat.",
            "moral": "Be kind",
            "quiz_questions": [
                {"question": "Who sat?", "options": ["cat", "dog"], "correct_answer": "cat"}
            ],
            "glossary": [{"term": "cat", "definition": "con mèo"}]
        }))]);

        let mut request = StoryRequest::new("a cat story");
        request.preferences = Some(GenerationPreferences {
            length: StoryLength::Short,
            structure: Some(StoryStructure {
                include_quiz: true,
                ..Default::default()
            }),
            ..Default::default()
        });

        let result = orchestrator(&backend).generate_advanced(request).await;

        let sent = &backend.requests()[0].messages[1].content;
        assert!(sent.contains("150-250 words"));
        assert!(sent.contains("quiz_questions field"));

        let sections = result.sections.unwrap();
        assert_eq!(sections.moral.as_deref(), Some("Be kind"));
        assert_eq!(sections.quiz.unwrap()[0].correct_answer, "cat");
        assert_eq!(sections.glossary.unwrap()[0].definition, "con mèo");
        assert_eq!(result.metadata.unwrap().language_ratio, LanguageRatio { vi: 0, en: 100 });
    }

    #[tokio::test]
    async fn quiz_request_on_fallback_path_stays_empty() {
        let backend = ScriptedBackend::new(vec![Scripted::text("Once upon a time.")]);

        let mut request = StoryRequest::new("a cat story");
        request.preferences = Some(GenerationPreferences {
            structure: Some(StoryStructure {
                include_quiz: true,
                ..Default::default()
            }),
            ..Default::default()
        });

        let result = orchestrator(&backend).generate_advanced(request).await;

        assert!(!result.is_error());
        assert_eq!(result.title, "Generated Story");
        assert_eq!(result.content, "Once upon a time.");
        assert!(result.sections.unwrap().quiz.is_none());
    }

    #[tokio::test]
    async fn backend_failure_becomes_error_result() {
        let backend = ScriptedBackend::new(vec![Scripted::error(LlmError::Authentication)]);

        let result = orchestrator(&backend).generate_simple("a cat story").await;

        assert!(result.is_error());
        assert_eq!(result.content, "");
        assert_eq!(result.title, "");
        assert!(result.metadata.is_none());
    }

    #[tokio::test]
    async fn malformed_payload_becomes_error_result() {
        let backend = ScriptedBackend::new(vec![Scripted::tool_call(
            "create_story",
            "{\"title\": \"missing content\"",
        )]);

        let result = orchestrator(&backend)
            .generate_advanced(StoryRequest::new("x"))
            .await;

        assert!(result.is_error());
        assert_eq!(result.content, "");
        assert!(result.error.unwrap().contains("schema"));
    }

    #[test]
    fn wide_ratio_reaches_validation() {
        let req: StoryRequest = serde_json::from_str(
            r#"{"prompt": "a fox", "preferences": {"language_mix": {"ratio": 300}}}"#,
        )
        .unwrap();

        let err = req.validate().unwrap_err();
        assert!(err.contains("got 300"), "{err}");
    }

    #[test]
    fn template_id_is_carried() {
        let req: StoryRequest =
            serde_json::from_str(r#"{"prompt": "a fox", "template_id": "fable-01"}"#).unwrap();
        assert_eq!(req.template_id.as_deref(), Some("fable-01"));
        assert!(!build_prompt(&req).contains("fable-01"));
    }

    #[tokio::test]
    async fn generation_time_counts_from_caller_start() {
        let backend = ScriptedBackend::new(vec![story_call(serde_json::json!({
            "title": "t",
            "story_content": "c"
        }))]);
        let start = Instant::now() - std::time::Duration::from_millis(250);

        let result = orchestrator(&backend)
            .run(start, "prompt".to_string())
            .await
            .unwrap();

        assert!(result.metadata.unwrap().generation_time_ms >= 250);
    }
}
