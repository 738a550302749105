use std::sync::Arc;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Completion, CompletionBackend, CompletionRequest, LlmError, Message, RetryPolicy, ToolDefinition};

pub const STORY_TOOL: &str = "create_story";
const FALLBACK_TITLE: &str = "Generated Story";
const FALLBACK_CONTENT: &str = "No content generated.";
const SYSTEM_PROMPT: &str = "You are a creative story writer. Use the create_story function to generate structured stories with proper sections.";
const MAX_TOKENS: u32 = 1500;

lazy_static! {
    static ref STORY_TOOL_DEFINITION: ToolDefinition = ToolDefinition {
        name: STORY_TOOL,
        description: "Generate a structured story with title, content, and optional sections",
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "The story title"},
                "story_content": {"type": "string", "description": "The main story content"},
                "moral": {"type": "string", "description": "Optional moral or lesson from the story"},
                "quiz_questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": {"type": "string"},
                            "options": {"type": "array", "items": {"type": "string"}},
                            "correct_answer": {"type": "string"}
                        }
                    },
                    "description": "Optional quiz questions about the story"
                },
                "glossary": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "term": {"type": "string"},
                            "definition": {"type": "string"}
                        }
                    },
                    "description": "Optional glossary of key terms"
                }
            },
            "required": ["title", "story_content"]
        }),
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub definition: String,
}

/// The `create_story` tool payload. `title` and `story_content` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredStoryRecord {
    pub title: String,
    pub story_content: String,
    #[serde(default)]
    pub moral: Option<String>,
    #[serde(default)]
    pub quiz_questions: Option<Vec<QuizQuestion>>,
    #[serde(default)]
    pub glossary: Option<Vec<GlossaryEntry>>,
}

impl StructuredStoryRecord {
    /// Degraded record built from a free-text answer.
    pub fn fallback(text: &str) -> Self {
        let content = if text.is_empty() { FALLBACK_CONTENT } else { text };
        Self {
            title: FALLBACK_TITLE.to_string(),
            story_content: content.to_string(),
            moral: None,
            quiz_questions: None,
            glossary: None,
        }
    }
}

/// Forces the backend to answer through the `create_story` tool and turns the
/// answer into a [`StructuredStoryRecord`].
pub struct StructuredClient {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
}

impl StructuredClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub async fn generate_structured(&self, prompt: &str) -> Result<StructuredStoryRecord, LlmError> {
        let request = CompletionRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            tools: vec![STORY_TOOL_DEFINITION.clone()],
            forced_tool: Some(STORY_TOOL),
            max_tokens: Some(MAX_TOKENS),
            temperature: None,
        };

        let completion = self
            .retry
            .run("story generation", || self.backend.complete(&request))
            .await?;

        extract_record(&completion)
    }
}

fn extract_record(completion: &Completion) -> Result<StructuredStoryRecord, LlmError> {
    match completion.tool_call(STORY_TOOL) {
        Some(call) => serde_json::from_str(&call.arguments).map_err(|source| {
            LlmError::SchemaViolation {
                tool: STORY_TOOL,
                source,
            }
        }),
        None => {
            tracing::warn!("Model answered without calling {}, using fallback record", STORY_TOOL);
            Ok(StructuredStoryRecord::fallback(completion.text()))
        }
    }
}
