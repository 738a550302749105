use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::{CompletionBackend, CompletionRequest, LlmError, Message, RetryPolicy};

const EMPTY_REPLY: &str = "I couldn't generate a response.";
const APOLOGY: &str = "Sorry, I encountered an error while processing your message.";

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub error: Option<String>,
}

/// Free-form conversation with the completion backend.
pub struct ChatService {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
}

impl ChatService {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub async fn reply(&self, message: ChatMessage) -> ChatReply {
        match self.complete(&message).await {
            Ok(text) => ChatReply {
                response: text,
                error: None,
            },
            Err(e) => {
                tracing::error!("Chat completion failed: {}", e);
                ChatReply {
                    response: APOLOGY.to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn complete(&self, message: &ChatMessage) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(context) = message.context.as_deref().filter(|c| !c.is_empty()) {
            messages.push(Message::system(format!("Context: {}", context)));
        }
        messages.push(Message::user(message.content.as_str()));

        let request = CompletionRequest {
            messages,
            max_tokens: Some(1024),
            temperature: Some(0.7),
            ..Default::default()
        };

        let completion = self
            .retry
            .run("chat", || self.backend.complete(&request))
            .await?;

        let text = completion.text();
        Ok(if text.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            text.to_string()
        })
    }
}
