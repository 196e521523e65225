//! # jury-core: model scanning and LLM-as-a-judge evaluation
//!
//! This crate checks ML models, text generation models in particular, for
//! vulnerabilities. It has two halves:
//!
//! 1. **Evaluators** ask a judge LLM, row by row, whether a model output
//!    satisfies a requirement and partition the rows into successes,
//!    failures and judge errors.
//! 2. **Scanner** validates a model and dataset, runs pluggable detectors
//!    and gathers their issues into a [`ScanReport`].
//!
//! The test layer wraps evaluations into reusable tests and suites.

// Foundation
pub mod config;
pub mod error;
pub mod template;

// Judge transport
pub mod llm;

// Data & models
pub mod dataset;
pub mod model;

// Evaluation
pub mod evaluators;
pub mod generators;
pub mod testing;

// Scanning
pub mod scanner;

// Re-exports
pub use config::{ConfigOverrides, JuryConfig, load_config};
pub use dataset::{ColumnType, Dataset, Record, Row};
pub use error::{JuryError, LlmError};
pub use evaluators::{
    EvaluationResult, Evaluator, LlmBasedEvaluator, PerRowRequirementEvaluator,
    RequirementEvaluator,
};
pub use generators::LlmInputGenerator;
pub use llm::{LlmClient, MockLlmClient, OpenAiCompatibleClient};
pub use model::{FnModel, Model, ModelMeta, ModelType, PredictionResults, ReplayModel};
pub use scanner::{
    Detector, DetectorRegistry, Issue, IssueLevel, ScanReport, ScanWarning, Scanner,
};
pub use testing::{
    Suite, SuiteResult, Test, TestMeta, TestParams, TestRegistry, TestResult,
    test_llm_output_against_requirement, test_llm_output_against_requirement_per_row,
    test_llm_single_output_against_requirement,
};
