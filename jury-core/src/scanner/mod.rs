//! Scanner: validates a model and dataset, then runs the selected detectors
//! one after the other and collects their issues into a [`ScanReport`].

pub mod detector;
pub mod output_requirements;
pub mod report;

pub use detector::{Detector, DetectorRegistry, Issue, IssueLevel};
pub use output_requirements::{OUTPUT_REQUIREMENTS_GROUP, OutputRequirementDetector};
pub use report::{DetectorError, ScanReport, ScanWarning};

use crate::config::JuryConfig;
use crate::dataset::{Dataset, Record};
use crate::error::JuryError;
use crate::generators::LlmInputGenerator;
use crate::llm::LlmClient;
use crate::model::Model;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs detectors over a model and dataset.
pub struct Scanner {
    registry: DetectorRegistry,
    only: Vec<String>,
    raise_exceptions: bool,
    max_features_warning: usize,
    generator: Option<LlmInputGenerator>,
    generated_samples: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        let config = JuryConfig::default();
        Self {
            registry: DetectorRegistry::new(),
            only: Vec::new(),
            raise_exceptions: config.scanner.raise_exceptions,
            max_features_warning: config.scanner.max_features_warning,
            generator: None,
            generated_samples: config.scanner.generated_samples,
        }
    }
}

impl Scanner {
    /// A scanner with no detectors registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scanner set up from configuration, with the built-in output
    /// requirement detector (when requirements are configured) and the LLM
    /// input generator, both backed by `llm`.
    pub fn from_config(config: &JuryConfig, llm: Arc<dyn LlmClient>) -> Result<Self, JuryError> {
        let mut registry = DetectorRegistry::new();
        if !config.scanner.requirements.is_empty() {
            registry.register(Arc::new(
                OutputRequirementDetector::new(config.scanner.requirements.clone(), llm.clone())
                    .with_temperature(config.evaluator.temperature),
            ))?;
        }

        let generator = LlmInputGenerator::new(llm)
            .with_temperature(config.generator.temperature)
            .with_languages(config.generator.languages.clone());

        Ok(Self {
            registry,
            only: config.scanner.only.clone(),
            raise_exceptions: config.scanner.raise_exceptions,
            max_features_warning: config.scanner.max_features_warning,
            generator: Some(generator),
            generated_samples: config.scanner.generated_samples,
        })
    }

    pub fn with_registry(mut self, registry: DetectorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Propagate the first detector error instead of recording it.
    pub fn with_raise_exceptions(mut self, raise_exceptions: bool) -> Self {
        self.raise_exceptions = raise_exceptions;
        self
    }

    /// Only run detectors matching one of `tags`.
    pub fn with_only(mut self, tags: Vec<String>) -> Self {
        self.only = tags;
        self
    }

    pub fn with_max_features_warning(mut self, max: usize) -> Self {
        self.max_features_warning = max;
        self
    }

    pub fn with_generator(mut self, generator: LlmInputGenerator, samples: usize) -> Self {
        self.generator = Some(generator);
        self.generated_samples = samples;
        self
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DetectorRegistry {
        &mut self.registry
    }

    /// Scan `model` over `dataset`, restricted to `features` when given.
    pub async fn analyze(
        &self,
        model: Arc<dyn Model>,
        dataset: Option<Arc<Dataset>>,
        features: Option<Vec<String>>,
    ) -> Result<ScanReport, JuryError> {
        model.meta().validate()?;

        let mut dataset = match dataset {
            Some(dataset) => dataset,
            None if model.meta().model_type.is_generative() => {
                Arc::new(self.default_dataset(model.as_ref()).await?)
            }
            None => {
                return Err(JuryError::invalid_argument(format!(
                    "Dataset must be provided to scan a {} model. \
                     Only text generation models can be scanned without a dataset.",
                    model.meta().model_type
                )));
            }
        };
        dataset.validate()?;

        let mut warnings = Vec::new();
        if dataset.has_duplicate_index() {
            let warning = ScanWarning::DuplicateIndex;
            warn!("{}", warning);
            warnings.push(warning);
            dataset = Arc::new(dataset.reset_index());
        }

        let features = self.resolve_features(model.as_ref(), &dataset, features, &mut warnings)?;

        let detectors = self.registry.select(&self.only);
        if detectors.is_empty() {
            let reason = if self.only.is_empty() {
                "no detector is registered".to_string()
            } else {
                format!("no detector matches the tags: {}", self.only.join(", "))
            };
            return Err(JuryError::NoDetectorsAvailable(format!(
                "{}. Scan will not be performed.",
                reason
            )));
        }

        info!(
            model = model.meta().display_name(),
            rows = dataset.len(),
            features = features.len(),
            detectors = detectors.len(),
            "Running scan"
        );

        let mut issues = Vec::new();
        let mut detector_errors = Vec::new();
        for detector in detectors {
            let name = detector.name().to_string();
            debug!(detector = %name, "Running detector");
            match detector.run(&model, &dataset, &features).await {
                Ok(found) => {
                    debug!(detector = %name, issues = found.len(), "Detector finished");
                    issues.extend(found);
                }
                Err(e) if self.raise_exceptions => {
                    return Err(JuryError::detector(name, e.to_string()));
                }
                Err(e) => {
                    warn!(detector = %name, error = %e, "Detector failed, continuing scan");
                    detector_errors.push(DetectorError {
                        detector: name,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            issues = issues.len(),
            detector_errors = detector_errors.len(),
            "Scan completed"
        );

        Ok(ScanReport::new(
            model.meta().display_name(),
            dataset.name().map(str::to_string),
            features,
            issues,
            warnings,
            detector_errors,
        ))
    }

    /// Dataset for a generative model scanned without one: generated by the
    /// LLM when a generator is set, otherwise a single row seeded with the
    /// model description.
    async fn default_dataset(&self, model: &dyn Model) -> Result<Dataset, JuryError> {
        if let Some(generator) = &self.generator {
            return generator
                .generate_dataset(model, self.generated_samples)
                .await;
        }

        let meta = model.meta();
        let seed = meta.description.clone().unwrap_or_default();
        let record: Record = meta
            .feature_names
            .iter()
            .flatten()
            .map(|name| (name.clone(), json!(seed)))
            .collect();
        Ok(Dataset::from_records(vec![record])
            .with_name(format!("Single example for {}", meta.display_name())))
    }

    fn resolve_features(
        &self,
        model: &dyn Model,
        dataset: &Dataset,
        features: Option<Vec<String>>,
        warnings: &mut Vec<ScanWarning>,
    ) -> Result<Vec<String>, JuryError> {
        let candidates = model.meta().resolve_features(dataset);

        let Some(features) = features else {
            let declared = model
                .meta()
                .feature_names
                .as_ref()
                .is_some_and(|f| !f.is_empty());
            if !declared && candidates.len() > self.max_features_warning {
                let warning = ScanWarning::TooManyFeatures {
                    count: candidates.len(),
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
            return Ok(candidates);
        };

        if features.is_empty() {
            return Err(JuryError::invalid_argument("No features to scan"));
        }

        let invalid: Vec<&str> = features
            .iter()
            .filter(|f| !candidates.contains(f) || !dataset.columns().contains(f))
            .map(String::as_str)
            .collect();
        if !invalid.is_empty() {
            return Err(JuryError::invalid_argument(format!(
                "The `features` argument contains invalid feature names: {}",
                invalid.join(", ")
            )));
        }

        Ok(features)
    }
}
