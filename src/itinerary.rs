use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::{
    CompletionBackend, CompletionRequest, LlmError, Message, RetryPolicy, ToolDefinition,
};

pub const ITINERARY_TOOL: &str = "generate_itinerary";

lazy_static! {
    static ref ITINERARY_TOOL_DEFINITION: ToolDefinition = ToolDefinition {
        name: ITINERARY_TOOL,
        description: "Generate a travel itinerary for a given destination and duration.",
        parameters: json!({
            "type": "object",
            "properties": {
                "destination": {"type": "string", "description": "Travel destination city or country"},
                "days": {"type": "integer", "description": "Number of days to plan for"}
            },
            "required": ["destination", "days"]
        }),
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItineraryRequest {
    pub prompt: String,
    pub destination: String,
    pub days: u32,
}

impl ItineraryRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.days == 0 {
            return Err("Days must be greater than 0".to_string());
        }
        if self.destination.trim().is_empty() {
            return Err("Destination cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItineraryResponse {
    pub destination: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

pub struct ItineraryPlanner {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
    batch_delay: Duration,
}

impl ItineraryPlanner {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy, batch_delay: Duration) -> Self {
        Self {
            backend,
            retry,
            batch_delay,
        }
    }

    /// Ask the model for an itinerary through the `generate_itinerary` tool
    /// and return its arguments.
    pub async fn plan(&self, request: &ItineraryRequest) -> Result<Value, LlmError> {
        let completion_request = CompletionRequest {
            messages: vec![Message::user(request.prompt.as_str())],
            tools: vec![ITINERARY_TOOL_DEFINITION.clone()],
            forced_tool: Some(ITINERARY_TOOL),
            ..Default::default()
        };

        let completion = self
            .retry
            .run("itinerary generation", || {
                self.backend.complete(&completion_request)
            })
            .await?;

        match completion.tool_call(ITINERARY_TOOL) {
            Some(call) => serde_json::from_str(&call.arguments).map_err(|source| {
                LlmError::SchemaViolation {
                    tool: ITINERARY_TOOL,
                    source,
                }
            }),
            None => Ok(json!({
                "destination": request.destination,
                "days": request.days,
                "text": completion.text(),
            })),
        }
    }

    /// Plan each request in order, pausing between backend calls. Failures
    /// are reported per item and do not stop the batch.
    pub async fn plan_batch(&self, requests: Vec<ItineraryRequest>) -> Vec<ItineraryResponse> {
        let mut responses = Vec::with_capacity(requests.len());

        for (index, request) in requests.into_iter().enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let outcome = match request.validate() {
                Ok(()) => self.plan(&request).await.map_err(|e| e.to_string()),
                Err(message) => Err(message),
            };

            let response = match outcome {
                Ok(result) => ItineraryResponse {
                    destination: request.destination,
                    result: Some(result),
                    error: None,
                },
                Err(message) => {
                    tracing::warn!(
                        "Itinerary for {} failed: {}",
                        request.destination,
                        message
                    );
                    ItineraryResponse {
                        destination: request.destination,
                        result: None,
                        error: Some(message),
                    }
                }
            };
            responses.push(response);
        }

        tracing::info!("Batch itinerary finished: {} requests", responses.len());
        responses
    }
}
