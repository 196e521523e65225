//! Built-in detector checking generated outputs against requirements.

use super::detector::{Detector, Issue, IssueLevel};
use crate::dataset::Dataset;
use crate::error::JuryError;
use crate::evaluators::{DEFAULT_JUDGE_TEMPERATURE, Evaluator, RequirementEvaluator};
use crate::llm::LlmClient;
use crate::model::Model;
use crate::testing::LlmRequirementTest;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const OUTPUT_REQUIREMENTS_GROUP: &str = "Output requirements";

/// Judges every output of a text generation model against each requirement.
/// One major issue per requirement with failing outputs.
pub struct OutputRequirementDetector {
    requirements: Vec<String>,
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl OutputRequirementDetector {
    pub fn new(requirements: Vec<String>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            requirements,
            llm,
            temperature: DEFAULT_JUDGE_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }
}

#[async_trait]
impl Detector for OutputRequirementDetector {
    fn name(&self) -> &str {
        "llm_output_requirements"
    }

    fn tags(&self) -> &[&str] {
        &["llm", "text_generation", "llm-as-a-judge"]
    }

    async fn run(
        &self,
        model: &Arc<dyn Model>,
        dataset: &Arc<Dataset>,
        features: &[String],
    ) -> Result<Vec<Issue>, JuryError> {
        if !model.meta().model_type.is_generative() {
            debug!(
                model_type = %model.meta().model_type,
                "Skipping output requirements for non-generative model"
            );
            return Ok(vec![]);
        }

        let mut issues = Vec::new();
        for requirement in &self.requirements {
            let evaluator = RequirementEvaluator::new([requirement.as_str()], self.llm.clone())
                .with_temperature(self.temperature);
            let result = evaluator.evaluate(model.as_ref(), dataset).await?;
            if result.failure_examples().is_empty() {
                continue;
            }

            let test = LlmRequirementTest::against_requirement(
                model.clone(),
                dataset.clone(),
                requirement.clone(),
                self.llm.clone(),
            )
            .with_temperature(self.temperature);
            issues.push(
                Issue::new(
                    self.name(),
                    OUTPUT_REQUIREMENTS_GROUP,
                    IssueLevel::Major,
                    format!(
                        "The model does not satisfy the following requirement: {}",
                        requirement
                    ),
                )
                .with_features(features.to_vec())
                .with_examples(result.failure_examples().to_vec())
                .with_test(Arc::new(test)),
            );
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use crate::llm::MockLlmClient;
    use crate::model::{ModelMeta, ModelType, ReplayModel};
    use serde_json::json;

    fn dataset() -> Arc<Dataset> {
        Arc::new(Dataset::from_records(vec![
            Record::from([
                ("question".to_string(), json!("Refund?")),
                ("answer".to_string(), json!("Sure, here you go.")),
            ]),
            Record::from([
                ("question".to_string(), json!("Hours?")),
                ("answer".to_string(), json!("Whatever.")),
            ]),
        ]))
    }

    fn model(model_type: ModelType) -> Arc<dyn Model> {
        Arc::new(ReplayModel::new(
            ModelMeta::new(model_type)
                .with_name("Support bot")
                .with_description("Answers customer questions")
                .with_feature_names(["question"]),
            "answer",
        ))
    }

    #[tokio::test]
    async fn test_one_issue_per_failing_requirement() {
        let llm = Arc::new(MockLlmClient::new());
        // "Be polite": one failure.
        llm.queue_verdict(true, None);
        llm.queue_verdict(false, Some("rude"));
        // "Answer in English": all good.
        llm.queue_verdict(true, None);
        llm.queue_verdict(true, None);

        let detector = OutputRequirementDetector::new(
            vec!["Be polite".into(), "Answer in English".into()],
            llm.clone(),
        );
        let features = vec!["question".to_string()];
        let issues = detector
            .run(&model(ModelType::TextGeneration), &dataset(), &features)
            .await
            .unwrap();

        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.group, OUTPUT_REQUIREMENTS_GROUP);
        assert_eq!(issue.level, IssueLevel::Major);
        assert!(issue.description.ends_with("Be polite"));
        assert_eq!(issue.examples[0].reason.as_deref(), Some("rude"));
        assert_eq!(issue.features, features);
        assert!(issue.test.is_some());
        assert_eq!(llm.request_count(), 4);
    }

    #[tokio::test]
    async fn test_skips_non_generative_models() {
        let llm = Arc::new(MockLlmClient::new());
        let detector = OutputRequirementDetector::new(vec!["Be polite".into()], llm.clone());
        let issues = detector
            .run(&model(ModelType::Classification), &dataset(), &[])
            .await
            .unwrap();
        assert!(issues.is_empty());
        assert_eq!(llm.request_count(), 0);
    }
}
