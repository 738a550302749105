//! In-memory doubles for the completion and speech backends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{Completion, CompletionBackend, CompletionRequest, LlmError, ToolInvocation};
use crate::tts::{SpeechBackend, TtsError, Waveform};

pub enum Scripted {
    Reply(Completion),
    Fail(LlmError),
}

impl Scripted {
    pub fn tool_call(name: &str, arguments: impl Into<String>) -> Self {
        Scripted::Reply(Completion {
            content: None,
            tool_calls: vec![ToolInvocation {
                name: name.to_string(),
                arguments: arguments.into(),
            }],
        })
    }

    pub fn text(text: &str) -> Self {
        Scripted::Reply(Completion {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
        })
    }

    pub fn completion(completion: Completion) -> Self {
        Scripted::Reply(completion)
    }

    pub fn error(error: LlmError) -> Self {
        Scripted::Fail(error)
    }
}

/// Replays a fixed list of answers and records every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn into_arc(self) -> Arc<dyn CompletionBackend> {
        Arc::new(self)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply(completion)) => Ok(completion),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

/// Speech backend producing a fixed waveform, or failing on demand.
#[derive(Default)]
pub struct FakeSpeech {
    pub fail: bool,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub const SAMPLE_RATE: u32 = 16_000;

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl SpeechBackend for FakeSpeech {
    fn synthesize(&self, text: &str) -> Result<Waveform, TtsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(TtsError::Synthesis("model exploded".to_string()));
        }
        // Half a second of a quiet ramp.
        let samples = (0..Self::SAMPLE_RATE / 2)
            .map(|i| (i % 100) as f32 / 1000.0)
            .collect();
        Ok(Waveform {
            samples,
            sample_rate: Self::SAMPLE_RATE,
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}
