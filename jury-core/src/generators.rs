//! Synthetic input generation.
//!
//! Asks an LLM to produce typical, varied inputs for a model from its name,
//! description and feature names. Used by the scanner when a generative model
//! is scanned without a dataset.

use crate::dataset::{ColumnType, Dataset, Record};
use crate::error::{JuryError, LlmError};
use crate::llm::{CompletionRequest, FunctionDefinition, LlmClient, Message};
use crate::model::Model;
use crate::template::render_prompt;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

const GENERATE_INPUTS_FUNCTION: &str = "generate_inputs";

const DEFAULT_GENERATE_INPUTS_PROMPT: &str = r#"You are auditing an AI model. Your task is to generate typical but varied inputs for this model.

You will generate inputs for the following model: {{model_name}} - {{model_description}}.
Model Features: {{feature_names}}

Each generated input must be an object with values for each of the model features, aimed at simulating typical usage of the model, or typical inputs that the model is supposed to handle.
Take the model description into account when generating the inputs. Do not generate repeated inputs or variations of the same input; cover the different situations that could be encountered during typical usage of the model.

Think step by step and then call the `generate_inputs` function with the generated inputs. You must generate {{num_samples}} inputs.
"#;

const LANGUAGE_REQUIREMENT_PROMPT: &str =
    "You must generate input using different languages among the following list: {{languages}}.";

/// Generates test inputs for a model with an LLM.
pub struct LlmInputGenerator {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    prompt: String,
    languages: Vec<String>,
}

impl LlmInputGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            temperature: 0.5,
            prompt: DEFAULT_GENERATE_INPUTS_PROMPT.to_string(),
            languages: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    fn make_prompt(&self, model: &dyn Model, num_samples: usize) -> Result<String, JuryError> {
        let meta = model.meta();
        let features = meta.feature_names.clone().unwrap_or_default();
        let mut prompt = render_prompt(
            &self.prompt,
            &json!({
                "model_name": meta.display_name(),
                "model_description": meta.description.as_deref().unwrap_or_default(),
                "feature_names": features.join(", "),
                "num_samples": num_samples,
            }),
        )?;
        if !self.languages.is_empty() {
            prompt.push_str(&render_prompt(
                LANGUAGE_REQUIREMENT_PROMPT,
                &json!({ "languages": self.languages.join(", ") }),
            )?);
        }
        Ok(prompt)
    }

    fn make_functions(&self, model: &dyn Model) -> Vec<FunctionDefinition> {
        let properties: serde_json::Map<String, Value> = model
            .meta()
            .feature_names
            .iter()
            .flatten()
            .map(|name| (name.clone(), json!({ "type": "string" })))
            .collect();

        vec![FunctionDefinition {
            name: GENERATE_INPUTS_FUNCTION.to_string(),
            description: "generates inputs for model audit".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "inputs": {
                        "type": "array",
                        "items": { "type": "object", "properties": properties }
                    }
                },
                "required": ["inputs"]
            }),
        }]
    }

    /// Generate a dataset of `num_samples` inputs for `model`.
    pub async fn generate_dataset(
        &self,
        model: &dyn Model,
        num_samples: usize,
    ) -> Result<Dataset, JuryError> {
        let request = CompletionRequest {
            messages: vec![Message::system(self.make_prompt(model, num_samples)?)],
            functions: self.make_functions(model),
            function_call: Some(GENERATE_INPUTS_FUNCTION.to_string()),
            temperature: self.temperature,
            caller_id: Some("LlmInputGenerator".to_string()),
            model: None,
        };

        let response = self.llm.complete(request).await?;
        let records: Vec<Record> = response
            .function_call
            .and_then(|call| call.arguments.get("inputs").cloned())
            .and_then(|inputs| serde_json::from_value(inputs).ok())
            .ok_or_else(|| LlmError::generation("Could not parse generated inputs"))?;

        debug!(count = records.len(), "Generated synthetic inputs");

        let text_columns: Vec<(String, ColumnType)> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .map(|k| (k, ColumnType::Text))
            .collect();
        Dataset::from_records(records)
            .with_name(format!(
                "Synthetic Test Dataset for {}",
                model.meta().display_name()
            ))
            .with_column_types(text_columns)
    }
}
