//! Detectors, the issues they raise and the registry selecting them.

use crate::dataset::Dataset;
use crate::error::JuryError;
use crate::evaluators::EvaluationExample;
use crate::model::Model;
use crate::testing::Test;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Trait that all detectors implement.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Unique name of the detector.
    fn name(&self) -> &str;

    /// Tags used to select detectors with the scanner's `only` option.
    fn tags(&self) -> &[&str];

    /// Inspect the model over `dataset`, restricted to `features`.
    async fn run(
        &self,
        model: &Arc<dyn Model>,
        dataset: &Arc<Dataset>,
        features: &[String],
    ) -> Result<Vec<Issue>, JuryError>;
}

/// Severity of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Major,
    Medium,
    Minor,
}

impl std::fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueLevel::Major => write!(f, "major"),
            IssueLevel::Medium => write!(f, "medium"),
            IssueLevel::Minor => write!(f, "minor"),
        }
    }
}

/// A vulnerability found by a detector.
#[derive(Clone, Serialize)]
pub struct Issue {
    pub id: Uuid,
    pub detector: String,
    pub group: String,
    pub level: IssueLevel,
    pub description: String,
    pub features: Vec<String>,
    pub examples: Vec<EvaluationExample>,
    /// Test reproducing the issue, if the detector can build one.
    #[serde(skip)]
    pub test: Option<Arc<dyn Test>>,
}

impl Issue {
    pub fn new(
        detector: impl Into<String>,
        group: impl Into<String>,
        level: IssueLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            detector: detector.into(),
            group: group.into(),
            level,
            description: description.into(),
            features: Vec::new(),
            examples: Vec::new(),
            test: None,
        }
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_examples(mut self, examples: Vec<EvaluationExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_test(mut self, test: Arc<dyn Test>) -> Self {
        self.test = Some(test);
        self
    }
}

impl std::fmt::Debug for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issue")
            .field("id", &self.id)
            .field("detector", &self.detector)
            .field("group", &self.group)
            .field("level", &self.level)
            .field("description", &self.description)
            .field("features", &self.features)
            .field("examples", &self.examples.len())
            .field("test", &self.test.as_ref().map(|t| t.meta().name.clone()))
            .finish()
    }
}

/// Registered detectors, kept in registration order.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector. Returns an error if the name is already taken.
    pub fn register(&mut self, detector: Arc<dyn Detector>) -> Result<(), JuryError> {
        let name = detector.name().to_string();
        if self.get(&name).is_some() {
            return Err(JuryError::invalid_argument(format!(
                "Detector '{}' is already registered",
                name
            )));
        }
        debug!(detector = %name, "Registering detector");
        self.detectors.push(detector);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Detector>> {
        self.detectors.iter().find(|d| d.name() == name).cloned()
    }

    /// Detectors carrying at least one of `tags` (matched against their tags
    /// and their name). An empty tag list selects every detector.
    pub fn select(&self, tags: &[String]) -> Vec<Arc<dyn Detector>> {
        if tags.is_empty() {
            return self.detectors.clone();
        }
        self.detectors
            .iter()
            .filter(|d| {
                tags.iter()
                    .any(|tag| d.name() == tag || d.tags().contains(&tag.as_str()))
            })
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Tagged {
        name: &'static str,
        tags: &'static [&'static str],
    }

    #[async_trait]
    impl Detector for Tagged {
        fn name(&self) -> &str {
            self.name
        }

        fn tags(&self) -> &[&str] {
            self.tags
        }

        async fn run(
            &self,
            _model: &Arc<dyn Model>,
            _dataset: &Arc<Dataset>,
            _features: &[String],
        ) -> Result<Vec<Issue>, JuryError> {
            Ok(vec![])
        }
    }

    fn registry() -> DetectorRegistry {
        let mut registry = DetectorRegistry::new();
        for (name, tags) in [
            ("robustness", &["robustness", "text"][..]),
            ("hallucination", &["llm", "hallucination"][..]),
            ("harmfulness", &["llm"][..]),
        ] {
            registry.register(Arc::new(Tagged { name, tags })).unwrap();
        }
        registry
    }

    #[test]
    fn test_select_by_tag_keeps_order() {
        let registry = registry();
        let names = |tags: &[&str]| -> Vec<String> {
            let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
            registry
                .select(&tags)
                .iter()
                .map(|d| d.name().to_string())
                .collect()
        };

        assert_eq!(names(&[]), vec!["robustness", "hallucination", "harmfulness"]);
        assert_eq!(names(&["llm"]), vec!["hallucination", "harmfulness"]);
        assert_eq!(names(&["robustness"]), vec!["robustness"]);
        assert!(names(&["performance"]).is_empty());
    }

    #[test]
    fn test_duplicate_detector_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Arc::new(Tagged {
                name: "harmfulness",
                tags: &[],
            }))
            .unwrap_err();
        assert!(matches!(err, JuryError::InvalidArgument(_)));
        assert_eq!(registry.len(), 3);
    }
}
