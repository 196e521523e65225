//! Judge LLM abstraction.
//!
//! Defines the `LlmClient` trait used by evaluators and generators to obtain
//! structured (function-call) answers from a secondary LLM, together with the
//! request and response types exchanged with it.

pub mod mock;
pub mod openai;

pub use mock::MockLlmClient;
pub use openai::OpenAiCompatibleClient;

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message sent to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A function the LLM may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A function call returned by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

impl FunctionCall {
    /// Look up a single argument by key.
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub functions: Vec<FunctionDefinition>,
    /// Name of the function the LLM is forced to call.
    pub function_call: Option<String>,
    pub temperature: f32,
    /// Identifies the component issuing the request, for attribution.
    pub caller_id: Option<String>,
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            functions: Vec::new(),
            function_call: None,
            temperature: 0.7,
            caller_id: None,
            model: None,
        }
    }
}

/// Response from the LLM.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait for judge LLM transports.
///
/// Implementations are shared across rows and detectors and must be reentrant.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}
