//! The LLM evaluator core.
//!
//! `LlmBasedEvaluator` owns row iteration, the judge call and verdict
//! validation. What varies between evaluators (prompt template, template
//! context, function schema) lives behind the [`JudgePrompt`] hooks.

use super::{
    ErrorSample, EvaluationError, EvaluationExample, EvaluationResult, Evaluator, RowOutcome,
};
use crate::dataset::{Dataset, Record, Row};
use crate::error::{JuryError, LlmError};
use crate::llm::{CompletionRequest, FunctionDefinition, LlmClient, Message};
use crate::model::Model;
use crate::template::render_prompt;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the function the judge is forced to call.
pub const EVALUATE_MODEL_FUNCTION: &str = "evaluate_model";

/// Judge temperature; low to keep verdicts stable.
pub const DEFAULT_JUDGE_TEMPERATURE: f32 = 0.1;

/// The default verdict schema: `{passed_test: bool, reason?: string}`.
pub fn evaluate_model_functions() -> Vec<FunctionDefinition> {
    vec![FunctionDefinition {
        name: EVALUATE_MODEL_FUNCTION.to_string(),
        description: "Evaluates if the model passes the test".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "passed_test": {
                    "type": "boolean",
                    "description": "true if the model successfully passes the test"
                },
                "reason": {
                    "type": "string",
                    "description": "optional short description of why the model does not pass the test, in 1 or 2 short sentences"
                }
            },
            "required": ["passed_test"]
        }),
    }]
}

/// Prompt and schema hooks of an LLM-based evaluator.
pub trait JudgePrompt: Send + Sync {
    /// Evaluator name, sent to the transport as the caller id.
    fn name(&self) -> &str;

    /// Template used when the caller does not supply one.
    fn default_template(&self) -> &str;

    /// Template values specific to this evaluator for `row`.
    fn context(&self, row: &Row) -> Result<Map<String, Value>, JuryError>;

    fn functions(&self, _input_vars: &Record, _model_output: &Value) -> Vec<FunctionDefinition> {
        evaluate_model_functions()
    }
}

/// Evaluator asking a judge LLM for a pass/fail verdict on every row.
pub struct LlmBasedEvaluator<P: JudgePrompt> {
    judge: P,
    prompt: Option<String>,
    temperature: f32,
    llm: Arc<dyn LlmClient>,
}

impl<P: JudgePrompt> LlmBasedEvaluator<P> {
    pub fn with_judge(judge: P, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            judge,
            prompt: None,
            temperature: DEFAULT_JUDGE_TEMPERATURE,
            llm,
        }
    }

    /// Replace the default prompt template.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn judge(&self) -> &P {
        &self.judge
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn name(&self) -> &str {
        self.judge.name()
    }

    /// Render the judge prompt for one row.
    pub fn make_prompt(
        &self,
        model: &dyn Model,
        row: &Row,
        input_vars: &Record,
        model_output: &Value,
    ) -> Result<String, JuryError> {
        let meta = model.meta();
        let mut context = Map::new();
        context.insert("model_name".into(), json!(meta.display_name()));
        context.insert(
            "model_description".into(),
            json!(meta.description.as_deref().unwrap_or_default()),
        );
        context.insert("input_vars".into(), json!(format_input_vars(input_vars)));
        context.insert("model_output".into(), json!(format_output(model_output)));
        context.extend(self.judge.context(row)?);

        let template = self
            .prompt
            .as_deref()
            .unwrap_or_else(|| self.judge.default_template());
        render_prompt(template, &context)
    }

    async fn judge_row(
        &self,
        model: &dyn Model,
        row: &Row,
        input_vars: Record,
        model_output: Value,
    ) -> Result<RowOutcome, JuryError> {
        let prompt = self.make_prompt(model, row, &input_vars, &model_output)?;
        let request = CompletionRequest {
            messages: vec![Message::system(prompt)],
            functions: self.judge.functions(&input_vars, &model_output),
            function_call: Some(EVALUATE_MODEL_FUNCTION.to_string()),
            temperature: self.temperature,
            caller_id: Some(self.judge.name().to_string()),
            model: None,
        };

        let verdict = match self.llm.complete(request).await {
            Ok(response) => response
                .function_call
                .filter(|call| call.arg("passed_test").is_some())
                .map(|call| call.arguments)
                .ok_or_else(|| LlmError::generation("Invalid function call arguments received")),
            Err(err) => Err(err),
        };

        let args = match verdict {
            Ok(args) => args,
            Err(err) if err.is_generation() => {
                debug!(row = row.index, error = %err, "Judge returned no usable verdict");
                return Ok(RowOutcome::Error(EvaluationError {
                    message: match err {
                        LlmError::Generation { message } => message,
                        other => other.to_string(),
                    },
                    sample: ErrorSample {
                        input_vars,
                        model_output,
                    },
                }));
            }
            Err(err) => return Err(err.into()),
        };

        let example = EvaluationExample {
            input_vars,
            model_output,
            reason: args.get("reason").and_then(reason_text),
        };

        if args.get("passed_test").is_some_and(is_truthy) {
            Ok(RowOutcome::Success(example))
        } else {
            Ok(RowOutcome::Failure {
                index: row.index,
                example,
            })
        }
    }
}

#[async_trait]
impl<P: JudgePrompt> Evaluator for LlmBasedEvaluator<P> {
    async fn evaluate(
        &self,
        model: &dyn Model,
        dataset: &Dataset,
    ) -> Result<EvaluationResult, JuryError> {
        let outputs = model.predict(dataset)?.prediction;
        if outputs.len() != dataset.len() {
            return Err(JuryError::model(format!(
                "Model returned {} predictions for {} rows",
                outputs.len(),
                dataset.len()
            )));
        }

        let features = model.meta().resolve_features(dataset);
        let mut outcomes = Vec::with_capacity(dataset.len());
        for (row, output) in dataset.rows().iter().zip(outputs) {
            let input_vars = row.select(&features);
            outcomes.push(self.judge_row(model, row, input_vars, output).await?);
        }

        let result = EvaluationResult::from_outcomes(outcomes, dataset);
        info!(
            evaluator = self.judge.name(),
            model = model.meta().display_name(),
            succeeded = result.success_examples().len(),
            failed = result.failure_examples().len(),
            errored = result.errors().len(),
            "Evaluation complete"
        );
        Ok(result)
    }
}

fn format_input_vars(input_vars: &Record) -> String {
    serde_json::to_string(input_vars).unwrap_or_default()
}

fn format_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reason_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
