//! LLM-as-a-judge tests.

use super::{Test, TestMeta, TestParams, TestRegistry, TestResult};
use crate::dataset::{ColumnType, Dataset, Record};
use crate::error::JuryError;
use crate::evaluators::{
    DEFAULT_JUDGE_TEMPERATURE, Evaluator, PerRowRequirementEvaluator, RequirementEvaluator,
};
use crate::llm::LlmClient;
use crate::model::Model;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const LLM_TAGS: [&str; 2] = ["llm", "llm-as-a-judge"];

const MAX_DATASET_NAME_CHARS: usize = 80;

type BuiltinFactory = fn(TestParams) -> Result<Arc<dyn Test>, JuryError>;

pub(super) fn register_builtin(registry: &mut TestRegistry) {
    let builtin: [(&str, &str, &str, BuiltinFactory); 3] = [
        (
            "test_llm_output_against_requirement",
            "Output requirement",
            "Judges every model output against a requirement.",
            against_requirement_factory,
        ),
        (
            "test_llm_output_against_requirement_per_row",
            "Per-row output requirement",
            "Judges every model output against the requirement stored in its row.",
            per_row_factory,
        ),
        (
            "test_llm_single_output_against_requirement",
            "Single output requirement",
            "Judges the model output for one input against a requirement.",
            single_output_factory,
        ),
    ];
    for (name, display_name, description, factory) in builtin {
        let meta = TestMeta::new(name, display_name)
            .with_tags(LLM_TAGS)
            .with_description(description);
        // Names in the built-in table are distinct.
        let _ = registry.register(meta, factory);
    }
}

fn against_requirement_factory(params: TestParams) -> Result<Arc<dyn Test>, JuryError> {
    let dataset = params.dataset()?;
    let requirement = params.str_arg("requirement")?.to_string();
    let temperature = params.temperature()?;
    let test =
        LlmRequirementTest::against_requirement(params.model, dataset, requirement, params.llm);
    Ok(Arc::new(test.with_temperature(temperature)))
}

fn per_row_factory(params: TestParams) -> Result<Arc<dyn Test>, JuryError> {
    let dataset = params.dataset()?;
    let requirement_column = params.str_arg("requirement_column")?.to_string();
    let temperature = params.temperature()?;
    let test = LlmRequirementTest::per_row(params.model, dataset, requirement_column, params.llm);
    Ok(Arc::new(test.with_temperature(temperature)))
}

fn single_output_factory(params: TestParams) -> Result<Arc<dyn Test>, JuryError> {
    let input_var = params.str_arg("input_var")?.to_string();
    let requirement = params.str_arg("requirement")?.to_string();
    let input_as_json = params.bool_arg("input_as_json")?;
    let temperature = params.temperature()?;
    let test = LlmRequirementTest::single_output(
        params.model,
        input_var,
        requirement,
        input_as_json,
        params.llm,
    );
    Ok(Arc::new(test.with_temperature(temperature)))
}

/// Evaluate the model outputs over `dataset` against `requirement`.
pub async fn test_llm_output_against_requirement(
    model: &dyn Model,
    dataset: &Dataset,
    requirement: &str,
    llm: Arc<dyn LlmClient>,
) -> Result<TestResult, JuryError> {
    judge_against_requirement(model, dataset, requirement, llm, DEFAULT_JUDGE_TEMPERATURE).await
}

/// Evaluate the model outputs over `dataset`, each against the requirement
/// found in `requirement_column` of its row.
pub async fn test_llm_output_against_requirement_per_row(
    model: &dyn Model,
    dataset: &Dataset,
    requirement_column: &str,
    llm: Arc<dyn LlmClient>,
) -> Result<TestResult, JuryError> {
    judge_per_row(model, dataset, requirement_column, llm, DEFAULT_JUDGE_TEMPERATURE).await
}

/// Evaluate the model output for a single input against `requirement`.
///
/// `input_var` is assigned to the first model feature, or parsed as a JSON
/// object of feature values when `input_as_json` is set.
pub async fn test_llm_single_output_against_requirement(
    model: &dyn Model,
    input_var: &str,
    requirement: &str,
    input_as_json: bool,
    llm: Arc<dyn LlmClient>,
) -> Result<TestResult, JuryError> {
    judge_single_output(
        model,
        input_var,
        requirement,
        input_as_json,
        llm,
        DEFAULT_JUDGE_TEMPERATURE,
    )
    .await
}

async fn judge_against_requirement(
    model: &dyn Model,
    dataset: &Dataset,
    requirement: &str,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
) -> Result<TestResult, JuryError> {
    let evaluator = RequirementEvaluator::new([requirement], llm).with_temperature(temperature);
    let result = evaluator.evaluate(model, dataset).await?;
    Ok(TestResult::from_evaluation(result))
}

async fn judge_per_row(
    model: &dyn Model,
    dataset: &Dataset,
    requirement_column: &str,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
) -> Result<TestResult, JuryError> {
    let evaluator = PerRowRequirementEvaluator::from_column(dataset, requirement_column, llm)?
        .with_temperature(temperature);
    let result = evaluator.evaluate(model, dataset).await?;
    Ok(TestResult::from_evaluation(result))
}

async fn judge_single_output(
    model: &dyn Model,
    input_var: &str,
    requirement: &str,
    input_as_json: bool,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
) -> Result<TestResult, JuryError> {
    let dataset = single_input_dataset(model, input_var, requirement, input_as_json)?;
    let mut result =
        judge_against_requirement(model, &dataset, requirement, llm, temperature).await?;
    result.output_ds = None;
    Ok(result)
}

fn single_input_dataset(
    model: &dyn Model,
    input_var: &str,
    requirement: &str,
    input_as_json: bool,
) -> Result<Dataset, JuryError> {
    let record: Record = if input_as_json {
        match serde_json::from_str::<Value>(input_var) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => {
                return Err(JuryError::invalid_argument(
                    "`input_var` must be a JSON object when `input_as_json` is set",
                ));
            }
        }
    } else {
        let feature = model
            .meta()
            .feature_names
            .as_ref()
            .and_then(|names| names.first())
            .ok_or_else(|| {
                JuryError::invalid_argument("The model does not declare any feature name")
            })?;
        Record::from([(feature.clone(), json!(input_var))])
    };

    let text_columns: Vec<(String, ColumnType)> =
        record.keys().map(|k| (k.clone(), ColumnType::Text)).collect();
    let name = truncate(&format!("Single entry dataset for \"{}\"", requirement));
    Ok(Dataset::from_records(vec![record])
        .with_column_types(text_columns)?
        .with_name(name))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_DATASET_NAME_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_DATASET_NAME_CHARS - 3).collect();
    format!("{}...", head)
}

enum RequirementCheck {
    Dataset {
        dataset: Arc<Dataset>,
        requirement: String,
    },
    PerRow {
        dataset: Arc<Dataset>,
        requirement_column: String,
    },
    Single {
        input_var: String,
        requirement: String,
        input_as_json: bool,
    },
}

/// One of the LLM requirement tests bound to its model and inputs.
pub struct LlmRequirementTest {
    meta: TestMeta,
    model: Arc<dyn Model>,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    check: RequirementCheck,
}

impl LlmRequirementTest {
    fn with_check(
        meta_name: &str,
        model: Arc<dyn Model>,
        llm: Arc<dyn LlmClient>,
        check: RequirementCheck,
    ) -> Self {
        let meta = TestRegistry::builtin()
            .get(meta_name)
            .cloned()
            .unwrap_or_else(|| TestMeta::new(meta_name, meta_name));
        Self {
            meta,
            model,
            llm,
            temperature: DEFAULT_JUDGE_TEMPERATURE,
            check,
        }
    }

    pub fn against_requirement(
        model: Arc<dyn Model>,
        dataset: Arc<Dataset>,
        requirement: impl Into<String>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self::with_check(
            "test_llm_output_against_requirement",
            model,
            llm,
            RequirementCheck::Dataset {
                dataset,
                requirement: requirement.into(),
            },
        )
    }

    pub fn per_row(
        model: Arc<dyn Model>,
        dataset: Arc<Dataset>,
        requirement_column: impl Into<String>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self::with_check(
            "test_llm_output_against_requirement_per_row",
            model,
            llm,
            RequirementCheck::PerRow {
                dataset,
                requirement_column: requirement_column.into(),
            },
        )
    }

    pub fn single_output(
        model: Arc<dyn Model>,
        input_var: impl Into<String>,
        requirement: impl Into<String>,
        input_as_json: bool,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self::with_check(
            "test_llm_single_output_against_requirement",
            model,
            llm,
            RequirementCheck::Single {
                input_var: input_var.into(),
                requirement: requirement.into(),
                input_as_json,
            },
        )
    }

    /// Judge with `temperature` instead of the default.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// The requirement text, or the requirement column for per-row tests.
    pub fn requirement(&self) -> &str {
        match &self.check {
            RequirementCheck::Dataset { requirement, .. }
            | RequirementCheck::Single { requirement, .. } => requirement,
            RequirementCheck::PerRow {
                requirement_column, ..
            } => requirement_column,
        }
    }
}

#[async_trait]
impl Test for LlmRequirementTest {
    fn meta(&self) -> &TestMeta {
        &self.meta
    }

    async fn execute(&self) -> Result<TestResult, JuryError> {
        let model = self.model.as_ref();
        let llm = self.llm.clone();
        match &self.check {
            RequirementCheck::Dataset {
                dataset,
                requirement,
            } => {
                judge_against_requirement(model, dataset, requirement, llm, self.temperature).await
            }
            RequirementCheck::PerRow {
                dataset,
                requirement_column,
            } => judge_per_row(model, dataset, requirement_column, llm, self.temperature).await,
            RequirementCheck::Single {
                input_var,
                requirement,
                input_as_json,
            } => {
                judge_single_output(
                    model,
                    input_var,
                    requirement,
                    *input_as_json,
                    llm,
                    self.temperature,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::model::{FnModel, ModelMeta, ModelType};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Model echoing its inputs, recording every dataset it sees.
    fn recording_model(seen: Arc<Mutex<Vec<Dataset>>>) -> FnModel {
        FnModel::new(
            ModelMeta::new(ModelType::TextGeneration)
                .with_name("Travel guide")
                .with_description("Describes cities")
                .with_feature_names(["city", "season"]),
            move |ds| {
                seen.lock().unwrap().push(ds.clone());
                Ok(ds
                    .rows()
                    .iter()
                    .map(|r| json!(format!("Visit {}", r.get("city").cloned().unwrap_or_default())))
                    .collect())
            },
        )
    }

    #[tokio::test]
    async fn test_single_input_uses_first_feature() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let model = recording_model(seen.clone());
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_verdict(true, None);

        let result = test_llm_single_output_against_requirement(
            &model,
            "Paris",
            "Mention a landmark",
            false,
            llm.clone(),
        )
        .await
        .unwrap();

        assert!(result.passed);
        assert!(result.output_ds.is_none());

        let seen = seen.lock().unwrap();
        let ds = &seen[0];
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.columns(), ["city".to_string()]);
        assert_eq!(ds.rows()[0].get("city"), Some(&json!("Paris")));
        assert_eq!(ds.column_type("city"), Some(ColumnType::Text));
        assert_eq!(ds.name(), Some("Single entry dataset for \"Mention a landmark\""));
        assert!(llm.requests()[0].messages[0].content.contains("- Mention a landmark"));
    }

    #[tokio::test]
    async fn test_single_input_as_json() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let model = recording_model(seen.clone());
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_verdict(false, Some("no landmark"));

        let result = test_llm_single_output_against_requirement(
            &model,
            r#"{"city": "Rome", "season": "winter"}"#,
            "Mention a landmark",
            true,
            llm,
        )
        .await
        .unwrap();

        assert!(!result.passed);
        assert_eq!(result.metric, 1.0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].rows()[0].get("season"), Some(&json!("winter")));
    }

    #[tokio::test]
    async fn test_single_input_rejects_non_object_json() {
        let model = recording_model(Arc::new(Mutex::new(Vec::new())));
        let llm = Arc::new(MockLlmClient::new());
        let err = test_llm_single_output_against_requirement(&model, "[1, 2]", "x", true, llm)
            .await
            .unwrap_err();
        assert!(matches!(err, JuryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_requirement_test_executes() {
        let model: Arc<dyn Model> = Arc::new(recording_model(Arc::new(Mutex::new(Vec::new()))));
        let dataset = Arc::new(Dataset::from_records(vec![
            Record::from([("city".to_string(), json!("Oslo"))]),
            Record::from([("city".to_string(), json!("Lima"))]),
        ]));
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_verdict(true, None);
        llm.queue_verdict(false, Some("too short"));

        let test = LlmRequirementTest::against_requirement(model, dataset, "Be detailed", llm);
        assert_eq!(test.meta().name, "test_llm_output_against_requirement");
        assert_eq!(test.requirement(), "Be detailed");

        let result = test.execute().await.unwrap();
        assert!(!result.passed);
        let failing = result.output_ds.unwrap();
        assert_eq!(failing.rows()[0].get("city"), Some(&json!("Lima")));
    }

    #[test]
    fn test_long_dataset_names_are_truncated() {
        let model = recording_model(Arc::new(Mutex::new(Vec::new())));
        let requirement = "Always mention a landmark ".repeat(10);
        let ds = single_input_dataset(&model, "Paris", &requirement, false).unwrap();
        let name = ds.name().unwrap();
        assert_eq!(name.chars().count(), MAX_DATASET_NAME_CHARS);
        assert!(name.starts_with("Single entry dataset for \"Always"));
        assert!(name.ends_with("..."));
    }

    #[tokio::test]
    async fn test_requirement_test_judges_at_its_temperature() {
        let model: Arc<dyn Model> = Arc::new(recording_model(Arc::new(Mutex::new(Vec::new()))));
        let dataset = Arc::new(Dataset::from_records(vec![Record::from([
            ("city".to_string(), json!("Oslo")),
            ("rule".to_string(), json!("Be brief")),
        ])]));
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_verdict(true, None);
        llm.queue_verdict(true, None);

        let tuned = LlmRequirementTest::per_row(model.clone(), dataset.clone(), "rule", llm.clone())
            .with_temperature(0.0);
        assert!(tuned.execute().await.unwrap().passed);

        let default =
            LlmRequirementTest::against_requirement(model, dataset, "Be brief", llm.clone());
        assert_eq!(default.temperature(), DEFAULT_JUDGE_TEMPERATURE);
        default.execute().await.unwrap();

        let temperatures: Vec<f32> = llm.requests().iter().map(|r| r.temperature).collect();
        assert_eq!(temperatures, vec![0.0, DEFAULT_JUDGE_TEMPERATURE]);
    }

    #[tokio::test]
    async fn test_builtin_registry_instantiates_llm_tests() {
        let model: Arc<dyn Model> = Arc::new(recording_model(Arc::new(Mutex::new(Vec::new()))));
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_verdict(false, Some("no landmark"));

        let registry = TestRegistry::builtin();
        assert_eq!(registry.by_tag("llm-as-a-judge").len(), 3);

        let params = TestParams::new(model, llm.clone())
            .with_arg("input_var", "Paris")
            .with_arg("requirement", "Mention a landmark")
            .with_arg("temperature", 0.0);
        let test = registry
            .instantiate("test_llm_single_output_against_requirement", params.clone())
            .unwrap();
        assert_eq!(test.meta().display_name, "Single output requirement");

        let result = test.execute().await.unwrap();
        assert!(!result.passed);
        assert_eq!(llm.requests()[0].temperature, 0.0);

        // The dataset-bound test cannot be built without a dataset.
        let Err(err) = registry.instantiate("test_llm_output_against_requirement", params) else {
            panic!("a dataset is required");
        };
        assert!(matches!(err, JuryError::InvalidArgument(_)));
    }
}
