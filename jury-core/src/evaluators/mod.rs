//! LLM-as-a-judge evaluators.
//!
//! An evaluator runs a model over a dataset and asks a judge LLM, row by row,
//! whether each output passes. The outcome is an immutable
//! [`EvaluationResult`] partitioning the rows into successes, failures and
//! judge errors.

pub mod base;
pub mod requirements;

pub use base::{
    DEFAULT_JUDGE_TEMPERATURE, EVALUATE_MODEL_FUNCTION, JudgePrompt, LlmBasedEvaluator,
    evaluate_model_functions,
};
pub use requirements::{
    FixedRequirements, PerRowRequirementEvaluator, PerRowRequirements, RequirementEvaluator,
};

use crate::dataset::{Dataset, Record};
use crate::error::JuryError;
use crate::model::Model;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A way of detecting model failures over a dataset.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        model: &dyn Model,
        dataset: &Dataset,
    ) -> Result<EvaluationResult, JuryError>;
}

/// A judged row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationExample {
    pub input_vars: Record,
    pub model_output: Value,
    pub reason: Option<String>,
}

/// The row a judge error was raised on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSample {
    pub input_vars: Record,
    pub model_output: Value,
}

/// A row the judge could not produce a verdict for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationError {
    pub message: String,
    pub sample: ErrorSample,
}

/// Outcome of judging a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Success(EvaluationExample),
    Failure {
        index: usize,
        example: EvaluationExample,
    },
    Error(EvaluationError),
}

/// Aggregated outcome of one `evaluate` call.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    success_examples: Vec<EvaluationExample>,
    failure_examples: Vec<EvaluationExample>,
    errors: Vec<EvaluationError>,
    #[serde(skip)]
    output_ds: Option<Dataset>,
}

impl EvaluationResult {
    pub fn new(
        success_examples: Vec<EvaluationExample>,
        failure_examples: Vec<EvaluationExample>,
        errors: Vec<EvaluationError>,
        output_ds: Option<Dataset>,
    ) -> Self {
        Self {
            success_examples,
            failure_examples,
            errors,
            output_ds,
        }
    }

    /// Partition per-row outcomes, keeping their order, and attach the
    /// subset of `dataset` made of the failing rows.
    pub fn from_outcomes(outcomes: Vec<RowOutcome>, dataset: &Dataset) -> Self {
        let mut success_examples = Vec::new();
        let mut failure_examples = Vec::new();
        let mut errors = Vec::new();
        let mut failed_indices = Vec::new();

        for outcome in outcomes {
            match outcome {
                RowOutcome::Success(example) => success_examples.push(example),
                RowOutcome::Failure { index, example } => {
                    failed_indices.push(index);
                    failure_examples.push(example);
                }
                RowOutcome::Error(error) => errors.push(error),
            }
        }

        Self {
            success_examples,
            failure_examples,
            errors,
            output_ds: Some(dataset.select(&failed_indices)),
        }
    }

    pub fn success_examples(&self) -> &[EvaluationExample] {
        &self.success_examples
    }

    pub fn failure_examples(&self) -> &[EvaluationExample] {
        &self.failure_examples
    }

    pub fn errors(&self) -> &[EvaluationError] {
        &self.errors
    }

    /// Rows of the evaluated dataset that failed the judgment.
    pub fn output_ds(&self) -> Option<&Dataset> {
        self.output_ds.as_ref()
    }

    pub fn into_output_ds(self) -> Option<Dataset> {
        self.output_ds
    }

    /// No failures and at least one success. Errors alone never pass.
    pub fn passed(&self) -> bool {
        self.failure_examples.is_empty() && !self.success_examples.is_empty()
    }

    pub fn failed(&self) -> bool {
        !self.passed()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Successes over judged rows; errors are not counted. `None` when no row
    /// was judged.
    pub fn passed_ratio(&self) -> Option<f64> {
        let judged = self.success_examples.len() + self.failure_examples.len();
        if judged == 0 {
            return None;
        }
        Some(self.success_examples.len() as f64 / judged as f64)
    }

    pub fn total(&self) -> usize {
        self.success_examples.len() + self.failure_examples.len() + self.errors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn example(text: &str) -> EvaluationExample {
        EvaluationExample {
            input_vars: Record::from([("q".to_string(), json!(text))]),
            model_output: json!("out"),
            reason: None,
        }
    }

    fn error() -> EvaluationError {
        EvaluationError {
            message: "Invalid function call arguments received".into(),
            sample: ErrorSample {
                input_vars: Record::new(),
                model_output: Value::Null,
            },
        }
    }

    #[test]
    fn test_passed_requires_a_success() {
        let empty = EvaluationResult::new(vec![], vec![], vec![], None);
        assert!(!empty.passed());
        assert!(empty.failed());
        assert_eq!(empty.passed_ratio(), None);

        let only_errors = EvaluationResult::new(vec![], vec![], vec![error()], None);
        assert!(!only_errors.passed());
        assert!(only_errors.has_errors());
    }

    #[test]
    fn test_passed_ratio_excludes_errors() {
        let result = EvaluationResult::new(
            vec![example("a"), example("b"), example("c")],
            vec![example("d")],
            vec![error(), error()],
            None,
        );
        assert_eq!(result.passed_ratio(), Some(0.75));
        assert!(!result.passed());
        assert_eq!(result.total(), 6);
    }

    #[test]
    fn test_from_outcomes_partitions_in_order() {
        let ds = crate::dataset::Dataset::from_records(vec![
            Record::from([("q".to_string(), json!("a"))]),
            Record::from([("q".to_string(), json!("b"))]),
            Record::from([("q".to_string(), json!("c"))]),
            Record::from([("q".to_string(), json!("d"))]),
        ]);
        let outcomes = vec![
            RowOutcome::Failure {
                index: 0,
                example: example("a"),
            },
            RowOutcome::Success(example("b")),
            RowOutcome::Error(error()),
            RowOutcome::Failure {
                index: 3,
                example: example("d"),
            },
        ];

        let result = EvaluationResult::from_outcomes(outcomes, &ds);
        assert_eq!(result.success_examples().len(), 1);
        assert_eq!(result.failure_examples()[1].input_vars["q"], json!("d"));
        assert_eq!(result.errors().len(), 1);

        let failing: Vec<usize> = result
            .output_ds()
            .unwrap()
            .rows()
            .iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(failing, vec![0, 3]);
    }
}
