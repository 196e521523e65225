//! Model capability interface.
//!
//! The scanner and evaluators only need a model's metadata and a way to
//! predict over a dataset. Anything implementing `Model` can be scanned.

use crate::dataset::Dataset;
use crate::error::JuryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of model under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Classification,
    Regression,
    TextGeneration,
}

impl ModelType {
    /// Text-in/text-out models.
    pub fn is_generative(&self) -> bool {
        matches!(self, ModelType::TextGeneration)
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::Classification => write!(f, "classification"),
            ModelType::Regression => write!(f, "regression"),
            ModelType::TextGeneration => write!(f, "text_generation"),
        }
    }
}

/// Model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model_type: ModelType,
    /// Input features; `None` means "every dataset column but the target".
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub classification_labels: Vec<String>,
}

impl ModelMeta {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            name: None,
            description: None,
            model_type,
            feature_names: None,
            classification_labels: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_feature_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_classification_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classification_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed model")
    }

    /// Features the model reads from `dataset`, in order.
    pub fn resolve_features(&self, dataset: &Dataset) -> Vec<String> {
        match &self.feature_names {
            Some(names) if !names.is_empty() => names.clone(),
            _ => dataset.feature_columns(),
        }
    }

    /// Check that the metadata describes a usable model.
    pub fn validate(&self) -> Result<(), JuryError> {
        let invalid = |reason: &str| {
            JuryError::invalid_model(format!(
                "The model object you provided is not valid: {}. \
                 Please wrap it with a type implementing `jury_core::Model`.",
                reason
            ))
        };

        if self.model_type.is_generative() {
            let blank = |s: &Option<String>| s.as_deref().is_none_or(|s| s.trim().is_empty());
            if blank(&self.name) || blank(&self.description) {
                return Err(invalid(
                    "text generation models need a name and a description describing their expected behavior",
                ));
            }
            if self.feature_names.as_ref().is_none_or(|f| f.is_empty()) {
                return Err(invalid("text generation models need feature names"));
            }
        }

        if let Some(names) = &self.feature_names {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
                return Err(invalid(&format!("feature name '{}' is declared twice", dup)));
            }
        }

        Ok(())
    }
}

/// Predictions aligned with the rows of the dataset they were computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResults {
    pub prediction: Vec<Value>,
}

/// Capability interface for models under test.
pub trait Model: Send + Sync {
    fn meta(&self) -> &ModelMeta;

    /// Predict one output per dataset row, in row order.
    fn predict(&self, dataset: &Dataset) -> Result<PredictionResults, JuryError>;
}

type PredictFn = dyn Fn(&Dataset) -> Result<Vec<Value>, JuryError> + Send + Sync;

/// A model backed by a closure.
pub struct FnModel {
    meta: ModelMeta,
    predict_fn: Box<PredictFn>,
}

impl FnModel {
    pub fn new<F>(meta: ModelMeta, predict_fn: F) -> Self
    where
        F: Fn(&Dataset) -> Result<Vec<Value>, JuryError> + Send + Sync + 'static,
    {
        Self {
            meta,
            predict_fn: Box::new(predict_fn),
        }
    }
}

impl Model for FnModel {
    fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn predict(&self, dataset: &Dataset) -> Result<PredictionResults, JuryError> {
        Ok(PredictionResults {
            prediction: (self.predict_fn)(dataset)?,
        })
    }
}

/// A model replaying outputs recorded in a dataset column.
pub struct ReplayModel {
    meta: ModelMeta,
    output_column: String,
}

impl ReplayModel {
    pub fn new(meta: ModelMeta, output_column: impl Into<String>) -> Self {
        Self {
            meta,
            output_column: output_column.into(),
        }
    }

    pub fn output_column(&self) -> &str {
        &self.output_column
    }
}

impl Model for ReplayModel {
    fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn predict(&self, dataset: &Dataset) -> Result<PredictionResults, JuryError> {
        let prediction = dataset.column(&self.output_column).map_err(|_| {
            JuryError::model(format!(
                "Recorded output column '{}' is missing from dataset",
                self.output_column
            ))
        })?;
        Ok(PredictionResults { prediction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use serde_json::json;

    fn dataset() -> Dataset {
        let rec: Record = [
            ("question".to_string(), json!("hi")),
            ("answer".to_string(), json!("hello")),
        ]
        .into_iter()
        .collect();
        Dataset::from_records(vec![rec])
    }

    #[test]
    fn test_generative_meta_requires_name_and_description() {
        let meta = ModelMeta::new(ModelType::TextGeneration).with_feature_names(["question"]);
        let err = meta.validate().unwrap_err();
        assert!(matches!(err, JuryError::InvalidModel(_)));
        assert!(err.to_string().contains("jury_core::Model"));

        let meta = meta.with_name("bot").with_description("answers questions");
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn test_duplicate_feature_names_rejected() {
        let meta = ModelMeta::new(ModelType::Regression).with_feature_names(["a", "a"]);
        assert!(meta.validate().is_err());
    }

    #[test]
    fn test_resolve_features_falls_back_to_dataset() {
        let ds = dataset().with_target("answer").unwrap();
        let meta = ModelMeta::new(ModelType::Classification);
        assert_eq!(meta.resolve_features(&ds), vec!["question".to_string()]);

        let meta = meta.with_feature_names(["answer"]);
        assert_eq!(meta.resolve_features(&ds), vec!["answer".to_string()]);
    }

    #[test]
    fn test_replay_model_reads_column() {
        let model = ReplayModel::new(ModelMeta::new(ModelType::TextGeneration), "answer");
        let out = model.predict(&dataset()).unwrap();
        assert_eq!(out.prediction, vec![json!("hello")]);

        let model = ReplayModel::new(ModelMeta::new(ModelType::TextGeneration), "missing");
        assert!(matches!(model.predict(&dataset()), Err(JuryError::Model(_))));
    }

    #[test]
    fn test_fn_model() {
        let model = FnModel::new(ModelMeta::new(ModelType::Regression), |ds| {
            Ok(vec![json!(1.0); ds.len()])
        });
        assert_eq!(model.predict(&dataset()).unwrap().prediction.len(), 1);
    }
}
