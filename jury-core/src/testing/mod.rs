//! Test layer: results, the `Test` trait, a registry instantiating known
//! tests by name, and suites grouping them.

pub mod llm;

pub use llm::{
    LlmRequirementTest, test_llm_output_against_requirement,
    test_llm_output_against_requirement_per_row, test_llm_single_output_against_requirement,
};

use crate::dataset::{Dataset, Record};
use crate::error::JuryError;
use crate::evaluators::{DEFAULT_JUDGE_TEMPERATURE, EvaluationResult};
use crate::llm::LlmClient;
use crate::model::Model;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMessageLevel {
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestMessage {
    pub level: TestMessageLevel,
    pub text: String,
}

impl TestMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: TestMessageLevel::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: TestMessageLevel::Info,
            text: text.into(),
        }
    }
}

/// Outcome of executing a test.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub passed: bool,
    pub metric: f64,
    pub metric_name: String,
    pub is_error: bool,
    pub messages: Vec<TestMessage>,
    /// Rows that made the test fail.
    #[serde(skip)]
    pub output_ds: Option<Dataset>,
}

impl TestResult {
    /// Summarize an evaluation: the metric is the number of failing examples
    /// and every judge error becomes an error message.
    pub fn from_evaluation(result: EvaluationResult) -> Self {
        let passed = result.passed();
        let is_error = result.has_errors();
        let metric = result.failure_examples().len() as f64;
        let messages = result
            .errors()
            .iter()
            .map(|e| TestMessage::error(e.message.clone()))
            .collect();
        Self {
            passed,
            metric,
            metric_name: "Failing examples".to_string(),
            is_error,
            messages,
            output_ds: result.into_output_ds(),
        }
    }

    /// A test that could not be executed at all.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            metric: 0.0,
            metric_name: String::new(),
            is_error: true,
            messages: vec![TestMessage::error(message)],
            output_ds: None,
        }
    }
}

/// Descriptive metadata of a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestMeta {
    pub name: String,
    pub display_name: String,
    pub tags: Vec<String>,
    pub description: String,
}

impl TestMeta {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            tags: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A runnable test bound to its inputs.
#[async_trait]
pub trait Test: Send + Sync {
    fn meta(&self) -> &TestMeta;

    async fn execute(&self) -> Result<TestResult, JuryError>;
}

/// Model, judge and named arguments a registered test is instantiated with.
#[derive(Clone)]
pub struct TestParams {
    pub model: Arc<dyn Model>,
    pub llm: Arc<dyn LlmClient>,
    pub dataset: Option<Arc<Dataset>>,
    pub args: Record,
}

impl TestParams {
    pub fn new(model: Arc<dyn Model>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            model,
            llm,
            dataset: None,
            args: Record::new(),
        }
    }

    pub fn with_dataset(mut self, dataset: Arc<Dataset>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn dataset(&self) -> Result<Arc<Dataset>, JuryError> {
        self.dataset
            .clone()
            .ok_or_else(|| JuryError::invalid_argument("This test requires a dataset"))
    }

    pub fn str_arg(&self, key: &str) -> Result<&str, JuryError> {
        self.args.get(key).and_then(Value::as_str).ok_or_else(|| {
            JuryError::invalid_argument(format!("Missing string argument `{}`", key))
        })
    }

    /// Missing flags are `false`.
    pub fn bool_arg(&self, key: &str) -> Result<bool, JuryError> {
        match self.args.get(key) {
            None => Ok(false),
            Some(value) => value.as_bool().ok_or_else(|| {
                JuryError::invalid_argument(format!("Argument `{}` must be a boolean", key))
            }),
        }
    }

    /// Judge temperature from the `temperature` argument.
    pub fn temperature(&self) -> Result<f32, JuryError> {
        match self.args.get("temperature") {
            None => Ok(DEFAULT_JUDGE_TEMPERATURE),
            Some(value) => value.as_f64().map(|t| t as f32).ok_or_else(|| {
                JuryError::invalid_argument("Argument `temperature` must be a number")
            }),
        }
    }
}

/// Builds a runnable test from its parameters.
pub type TestFactory =
    Arc<dyn Fn(TestParams) -> Result<Arc<dyn Test>, JuryError> + Send + Sync>;

struct RegisteredTest {
    meta: TestMeta,
    factory: TestFactory,
}

static BUILTIN_TESTS: LazyLock<TestRegistry> = LazyLock::new(TestRegistry::with_builtin);

/// Known tests keyed by name. Each entry pairs its metadata with a factory
/// binding it to a model, a judge and arguments.
#[derive(Default)]
pub struct TestRegistry {
    tests: BTreeMap<String, RegisteredTest>,
}

impl std::fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRegistry")
            .field("tests", &self.names())
            .finish()
    }
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the LLM-as-a-judge tests.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        llm::register_builtin(&mut registry);
        registry
    }

    /// Shared registry of the built-in tests.
    pub fn builtin() -> &'static TestRegistry {
        &BUILTIN_TESTS
    }

    /// Register a test. Fails if the name is already taken.
    pub fn register<F>(&mut self, meta: TestMeta, factory: F) -> Result<(), JuryError>
    where
        F: Fn(TestParams) -> Result<Arc<dyn Test>, JuryError> + Send + Sync + 'static,
    {
        if self.tests.contains_key(&meta.name) {
            return Err(JuryError::invalid_argument(format!(
                "Test '{}' is already registered",
                meta.name
            )));
        }
        debug!(test = %meta.name, "Registering test");
        self.tests.insert(
            meta.name.clone(),
            RegisteredTest {
                meta,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TestMeta> {
        self.tests.get(name).map(|entry| &entry.meta)
    }

    /// Bind the test registered under `name` to `params`.
    pub fn instantiate(&self, name: &str, params: TestParams) -> Result<Arc<dyn Test>, JuryError> {
        let entry = self
            .tests
            .get(name)
            .ok_or_else(|| JuryError::invalid_argument(format!("Unknown test '{}'", name)))?;
        (entry.factory)(params)
    }

    /// Tests carrying `tag`, sorted by name.
    pub fn by_tag(&self, tag: &str) -> Vec<&TestMeta> {
        self.tests
            .values()
            .map(|entry| &entry.meta)
            .filter(|meta| meta.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tests.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// An ordered collection of tests.
pub struct Suite {
    pub name: String,
    tests: Vec<Arc<dyn Test>>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: Arc<dyn Test>) -> &mut Self {
        self.tests.push(test);
        self
    }

    pub fn tests(&self) -> &[Arc<dyn Test>] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Execute every test in order. A test that errors is reported as an
    /// error result and does not stop the suite.
    pub async fn run(&self) -> SuiteResult {
        let mut results = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let name = test.meta().name.clone();
            debug!(suite = %self.name, test = %name, "Executing test");
            let result = match test.execute().await {
                Ok(result) => result,
                Err(e) => {
                    warn!(suite = %self.name, test = %name, error = %e, "Test execution failed");
                    TestResult::error(e.to_string())
                }
            };
            results.push(SuiteTestResult {
                test_name: name,
                result,
            });
        }

        let suite_result = SuiteResult {
            name: self.name.clone(),
            results,
        };
        info!(
            suite = %self.name,
            tests = suite_result.results.len(),
            passed = suite_result.passed(),
            "Suite completed"
        );
        suite_result
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteTestResult {
    pub test_name: String,
    pub result: TestResult,
}

/// Results of a suite run, in test order.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    pub name: String,
    pub results: Vec<SuiteTestResult>,
}

impl SuiteResult {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.result.passed)
    }
}
