//! Configuration for Jury.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JuryConfig {
    /// Judge LLM transport settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// LLM evaluator settings.
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    /// Scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Synthetic input generator settings.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Judge LLM transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Judge model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// LLM evaluator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Sampling temperature of judge calls.
    #[serde(default = "default_judge_temperature")]
    pub temperature: f32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            temperature: default_judge_temperature(),
        }
    }
}

fn default_judge_temperature() -> f32 {
    0.1
}

/// Scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Propagate the first detector failure instead of recording it.
    #[serde(default)]
    pub raise_exceptions: bool,
    /// Only run detectors carrying one of these tags.
    #[serde(default)]
    pub only: Vec<String>,
    /// Inferred feature count above which a warning is emitted.
    #[serde(default = "default_max_features_warning")]
    pub max_features_warning: usize,
    /// Requirements checked by the built-in output requirement detector.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Number of inputs generated for generative models scanned without a dataset.
    #[serde(default = "default_generated_samples")]
    pub generated_samples: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            raise_exceptions: false,
            only: Vec::new(),
            max_features_warning: default_max_features_warning(),
            requirements: Vec::new(),
            generated_samples: default_generated_samples(),
        }
    }
}

fn default_max_features_warning() -> usize {
    100
}

fn default_generated_samples() -> usize {
    10
}

/// Synthetic input generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_temperature")]
    pub temperature: f32,
    /// Languages the generated inputs should cover.
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            temperature: default_generator_temperature(),
            languages: Vec::new(),
        }
    }
}

fn default_generator_temperature() -> f32 {
    0.5
}

/// Individual settings applied on top of every other configuration layer.
///
/// Keys are dotted paths such as `llm.model` or `scanner.only`. Settings
/// that were never set leave the lower layers untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    values: Vec<(String, serde_json::Value)>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn config_file_candidates(workspace: Option<&Path>) -> Vec<PathBuf> {
    let user = directories::ProjectDirs::from("dev", "jury", "jury")
        .map(|dirs| dirs.config_dir().join("config.toml"));
    let project = workspace.map(|ws| ws.join(".jury").join("config.toml"));
    user.into_iter().chain(project).collect()
}

/// Resolve the configuration: defaults, then the user and workspace
/// `config.toml` files, then `JURY_*` variables (`JURY_SCANNER__ONLY`),
/// then `overrides`.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<JuryConfig, Box<figment::Error>> {
    let files = config_file_candidates(workspace)
        .into_iter()
        .filter(|path| path.exists());
    let figment = files.fold(
        Figment::from(Serialized::defaults(JuryConfig::default())),
        |figment, path| figment.merge(Toml::file(path)),
    );
    let figment = figment.merge(Env::prefixed("JURY_").split("__"));

    let figment = overrides
        .into_iter()
        .flat_map(|o| o.values.iter())
        .fold(figment, |figment, (key, value)| {
            figment.merge(Serialized::default(key, value))
        });

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JuryConfig::default();
        assert_eq!(config.evaluator.temperature, 0.1);
        assert_eq!(config.scanner.max_features_warning, 100);
        assert!(!config.scanner.raise_exceptions);
        assert_eq!(config.generator.temperature, 0.5);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_load_config_with_overrides() {
        let overrides = ConfigOverrides::new()
            .set("llm.model", "gpt-4o-mini")
            .set("scanner.raise_exceptions", true);

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.scanner.raise_exceptions);
        assert_eq!(config.scanner.max_features_warning, 100);
    }

    #[test]
    fn test_overrides_keep_workspace_settings() {
        let dir = tempfile::tempdir().unwrap();
        let jury_dir = dir.path().join(".jury");
        std::fs::create_dir_all(&jury_dir).unwrap();
        std::fs::write(
            jury_dir.join("config.toml"),
            r#"
[evaluator]
temperature = 0.0

[scanner]
only = ["llm"]
"#,
        )
        .unwrap();

        let overrides = ConfigOverrides::new().set("llm.model", "gpt-4o-mini");
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.scanner.only, vec!["llm".to_string()]);
        assert_eq!(config.evaluator.temperature, 0.0);
    }

    #[test]
    fn test_overrides_win_over_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let jury_dir = dir.path().join(".jury");
        std::fs::create_dir_all(&jury_dir).unwrap();
        std::fs::write(jury_dir.join("config.toml"), "[scanner]\nonly = [\"llm\"]\n").unwrap();

        let overrides = ConfigOverrides::new().set("scanner.only", vec!["custom"]);
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.scanner.only, vec!["custom".to_string()]);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let jury_dir = dir.path().join(".jury");
        std::fs::create_dir_all(&jury_dir).unwrap();
        std::fs::write(
            jury_dir.join("config.toml"),
            r#"
[evaluator]
temperature = 0.0

[scanner]
only = ["llm"]
requirements = ["The model should answer politely"]
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.evaluator.temperature, 0.0);
        assert_eq!(config.scanner.only, vec!["llm".to_string()]);
        assert_eq!(config.scanner.requirements.len(), 1);
        // Untouched sections keep their defaults
        assert_eq!(config.scanner.max_features_warning, 100);
    }
}
