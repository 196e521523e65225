//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::ModelArgs;
use jury_core::config::{ConfigOverrides, JuryConfig, load_config};
use jury_core::llm::{LlmClient, OpenAiCompatibleClient};
use jury_core::model::{Model, ModelMeta, ModelType, ReplayModel};
use jury_core::testing::{TestParams, TestRegistry, TestResult};
use jury_core::{Dataset, ScanReport, Scanner};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Handle a CLI subcommand. Returns whether the command succeeded.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    judge_model: Option<String>,
) -> anyhow::Result<bool> {
    let overrides = judge_model
        .into_iter()
        .fold(ConfigOverrides::new(), |o, model| o.set("llm.model", model));
    match command {
        Commands::Config { action } => handle_config(action, workspace).await,
        Commands::Evaluate {
            model,
            requirement,
            requirement_column,
            json,
        } => {
            let config = resolve_config(workspace, &overrides)?;
            handle_evaluate(&config, &model, requirement, requirement_column, json).await
        }
        Commands::Scan {
            model,
            only,
            requirement,
            html,
            json,
            strict,
        } => {
            let mut overrides = overrides;
            if !only.is_empty() {
                overrides = overrides.set("scanner.only", only);
            }
            if strict {
                overrides = overrides.set("scanner.raise_exceptions", true);
            }
            let mut config = resolve_config(workspace, &overrides)?;
            config.scanner.requirements.extend(requirement);
            handle_scan(&config, &model, html.as_deref(), json).await
        }
    }
}

fn resolve_config(workspace: &Path, overrides: &ConfigOverrides) -> anyhow::Result<JuryConfig> {
    load_config(Some(workspace), Some(overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<bool> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".jury");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(true);
            }

            let toml_str = toml::to_string_pretty(&JuryConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(true)
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(true)
        }
    }
}

async fn handle_evaluate(
    config: &JuryConfig,
    args: &ModelArgs,
    requirement: Option<String>,
    requirement_column: Option<String>,
    json: bool,
) -> anyhow::Result<bool> {
    let dataset = Dataset::from_json_file(&args.dataset)?;
    let excluded: Vec<&str> = requirement_column.as_deref().into_iter().collect();
    let model: Arc<dyn Model> = Arc::new(recorded_model(args, &dataset, &excluded));
    let params = TestParams::new(model, judge_client(config)?)
        .with_dataset(Arc::new(dataset))
        .with_arg("temperature", config.evaluator.temperature);

    let (test_name, params) = evaluation_test(params, requirement, requirement_column)?;
    let test = TestRegistry::builtin().instantiate(test_name, params)?;
    info!(test = test_name, "Running evaluation");
    let result = test.execute().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_test_result(&result);
    }
    Ok(result.passed)
}

/// The registered test matching the requirement source, with its arguments.
fn evaluation_test(
    params: TestParams,
    requirement: Option<String>,
    requirement_column: Option<String>,
) -> anyhow::Result<(&'static str, TestParams)> {
    match (requirement, requirement_column) {
        (Some(requirement), _) => Ok((
            "test_llm_output_against_requirement",
            params.with_arg("requirement", requirement),
        )),
        (None, Some(column)) => Ok((
            "test_llm_output_against_requirement_per_row",
            params.with_arg("requirement_column", column),
        )),
        (None, None) => anyhow::bail!("Either --requirement or --requirement-column is required"),
    }
}

async fn handle_scan(
    config: &JuryConfig,
    args: &ModelArgs,
    html: Option<&Path>,
    json: bool,
) -> anyhow::Result<bool> {
    let dataset = Dataset::from_json_file(&args.dataset)?;
    let model: Arc<dyn Model> = Arc::new(recorded_model(args, &dataset, &[]));
    let features = args.features.clone();
    let scanner = Scanner::from_config(config, judge_client(config)?)?;

    let report = scanner
        .analyze(model, Some(Arc::new(dataset)), features)
        .await?;

    if let Some(path) = html {
        std::fs::write(path, report.to_html()?)?;
        info!(path = %path.display(), "HTML report written");
    }
    if json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }
    Ok(true)
}

fn judge_client(config: &JuryConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    Ok(Arc::new(OpenAiCompatibleClient::new(&config.llm)?))
}

/// The model under test: outputs recorded in `args.output_column`.
fn recorded_model(args: &ModelArgs, dataset: &Dataset, excluded: &[&str]) -> ReplayModel {
    let features = args.features.clone().unwrap_or_else(|| {
        dataset
            .columns()
            .iter()
            .filter(|c| *c != &args.output_column && !excluded.contains(&c.as_str()))
            .cloned()
            .collect()
    });
    let name = args.name.clone().unwrap_or_else(|| {
        args.dataset
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recorded model".to_string())
    });
    let description = args.description.clone().unwrap_or_else(|| {
        format!(
            "Model whose outputs are recorded in the '{}' column",
            args.output_column
        )
    });

    ReplayModel::new(
        ModelMeta::new(ModelType::TextGeneration)
            .with_name(name)
            .with_description(description)
            .with_feature_names(features),
        args.output_column.clone(),
    )
}

fn print_test_result(result: &TestResult) {
    let status = if result.passed { "PASSED" } else { "FAILED" };
    println!("{} - {}: {}", status, result.metric_name, result.metric);
    for message in &result.messages {
        println!("  {:?}: {}", message.level, message.text);
    }
    if let Some(failing) = &result.output_ds {
        for row in failing.rows() {
            println!(
                "  failing row {}: {}",
                row.index,
                serde_json::to_string(&row.values).unwrap_or_default()
            );
        }
    }
}

fn print_report(report: &ScanReport) {
    if !report.has_issues() {
        println!("No issues detected.");
    }
    for (group, issues) in report.issues_by_group() {
        println!("{} ({} issue(s))", group, issues.len());
        for issue in issues {
            println!("  [{}] {}", issue.level, issue.description);
        }
    }
    for warning in report.warnings() {
        println!("Warning: {}", warning);
    }
    for error in report.detector_errors() {
        println!("Detector '{}' failed: {}", error.detector, error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn args(features: Option<Vec<String>>) -> ModelArgs {
        ModelArgs {
            dataset: PathBuf::from("/data/support_bot.jsonl"),
            output_column: "answer".into(),
            features,
            name: None,
            description: None,
        }
    }

    fn dataset() -> Dataset {
        Dataset::from_json_str(
            r#"{"question": "Hi?", "context": "greeting", "answer": "Hello", "rule": "Be nice"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_recorded_model_defaults() {
        let model = recorded_model(&args(None), &dataset(), &["rule"]);
        let meta = model.meta();
        assert_eq!(meta.name.as_deref(), Some("support_bot"));
        assert_eq!(
            meta.feature_names,
            Some(vec!["question".to_string(), "context".to_string()])
        );
        assert_eq!(model.output_column(), "answer");
        assert!(meta.validate().is_ok());
    }

    #[test]
    fn test_recorded_model_explicit_features() {
        let model = recorded_model(&args(Some(vec!["question".into()])), &dataset(), &[]);
        assert_eq!(
            model.meta().feature_names,
            Some(vec!["question".to_string()])
        );
    }

    #[tokio::test]
    async fn test_config_init_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(handle_config(ConfigAction::Init, dir.path()).await.unwrap());

        let path = dir.path().join(".jury").join("config.toml");
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("[scanner]"));
        assert!(written.contains("max_features_warning = 100"));
    }

    #[test]
    fn test_evaluation_test_selection() {
        let model: Arc<dyn Model> = Arc::new(recorded_model(&args(None), &dataset(), &["rule"]));
        let llm = Arc::new(jury_core::MockLlmClient::new());
        let params = TestParams::new(model, llm).with_arg("temperature", 0.0f32);

        let (name, selected) =
            evaluation_test(params.clone(), Some("Be nice".into()), None).unwrap();
        assert_eq!(name, "test_llm_output_against_requirement");
        assert_eq!(selected.str_arg("requirement").unwrap(), "Be nice");
        assert_eq!(selected.temperature().unwrap(), 0.0);

        let (name, selected) =
            evaluation_test(params.clone(), None, Some("rule".into())).unwrap();
        assert_eq!(name, "test_llm_output_against_requirement_per_row");
        assert_eq!(selected.str_arg("requirement_column").unwrap(), "rule");

        assert!(evaluation_test(params, None, None).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_judges_at_configured_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.json");
        std::fs::write(&path, r#"[{"question": "Hi?", "answer": "Hello"}]"#).unwrap();

        let model: Arc<dyn Model> = Arc::new(recorded_model(
            &ModelArgs {
                dataset: path.clone(),
                ..args(None)
            },
            &Dataset::from_json_file(&path).unwrap(),
            &[],
        ));
        let llm = Arc::new(jury_core::MockLlmClient::new());
        llm.queue_verdict(true, None);

        let mut config = JuryConfig::default();
        config.evaluator.temperature = 0.0;
        let params = TestParams::new(model, llm.clone())
            .with_dataset(Arc::new(Dataset::from_json_file(&path).unwrap()))
            .with_arg("temperature", config.evaluator.temperature);
        let (name, params) = evaluation_test(params, Some("Be nice".into()), None).unwrap();
        let result = TestRegistry::builtin()
            .instantiate(name, params)
            .unwrap()
            .execute()
            .await
            .unwrap();

        assert!(result.passed);
        assert_eq!(llm.requests()[0].temperature, 0.0);
    }
}
