//! Scripted LLM client for tests and offline runs.

use super::{CompletionRequest, CompletionResponse, FunctionCall, LlmClient};
use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock LLM client returning queued responses in order.
///
/// Every request is recorded so tests can inspect prompts, schemas and
/// sampling parameters after the fact.
pub struct MockLlmClient {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            model: "mock-judge".to_string(),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.push(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.push(Err(error));
    }

    /// Queue a function-call response.
    pub fn queue_function_call(&self, name: &str, arguments: serde_json::Value) {
        self.queue_response(Self::function_call_response(name, arguments));
    }

    /// Queue a verdict for the `evaluate_model` judge function.
    pub fn queue_verdict(&self, passed: bool, reason: Option<&str>) {
        let mut args = serde_json::json!({ "passed_test": passed });
        if let Some(reason) = reason {
            args["reason"] = serde_json::Value::String(reason.to_string());
        }
        self.queue_function_call("evaluate_model", args);
    }

    /// Create a plain text response.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            function_call: None,
            model: "mock-judge".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Create a function-call response.
    pub fn function_call_response(name: &str, arguments: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            content: None,
            function_call: Some(FunctionCall {
                name: name.to_string(),
                arguments,
            }),
            model: "mock-judge".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(&self, item: Result<CompletionResponse, LlmError>) {
        self.responses.lock().unwrap().push_back(item);
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::text_response("No queued responses available.")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
