//! Scan report: issues found, warnings raised and detectors that failed.

use super::detector::Issue;
use crate::error::JuryError;
use crate::testing::Suite;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Scan report: {{model_name}}</title>
</head>
<body>
<h1>Scan report: {{model_name}}</h1>
<p>Dataset: {{dataset_name}} &middot; Features: {{features}} &middot; Generated {{created_at}}</p>
{{#if has_issues}}
<p>{{issue_count}} issue(s) detected.</p>
{{#each groups}}
<h2>{{this.name}}</h2>
<table>
<tr><th>Level</th><th>Description</th><th>Detector</th><th>Examples</th></tr>
{{#each this.issues}}
<tr><td>{{this.level}}</td><td>{{this.description}}</td><td>{{this.detector}}</td><td>{{this.example_count}}</td></tr>
{{/each}}
</table>
{{/each}}
{{else}}
<p>No issues detected.</p>
{{/if}}
{{#if warnings}}
<h2>Warnings</h2>
<ul>
{{#each warnings}}
<li>{{this}}</li>
{{/each}}
</ul>
{{/if}}
{{#if detector_errors}}
<h2>Detector errors</h2>
<ul>
{{#each detector_errors}}
<li>{{this.detector}}: {{this.message}}</li>
{{/each}}
</ul>
{{/if}}
</body>
</html>
"#;

/// Non-fatal condition noticed while preparing a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    /// Row indexes were not unique and have been reset.
    DuplicateIndex,
    /// More inferred features than the configured threshold.
    TooManyFeatures { count: usize },
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanWarning::DuplicateIndex => write!(
                f,
                "Your dataset has duplicate indexes, which is not supported. \
                 We will reset the dataset index for the scan."
            ),
            ScanWarning::TooManyFeatures { count } => write!(
                f,
                "It looks like your dataset has a very large number of features ({}), \
                 are you sure this is correct? The scan will be very slow. Consider \
                 passing only the relevant features with the `features` argument.",
                count
            ),
        }
    }
}

/// A detector failure swallowed by a lenient scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorError {
    pub detector: String,
    pub message: String,
}

/// Outcome of a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub dataset_name: Option<String>,
    pub features: Vec<String>,
    issues: Vec<Issue>,
    warnings: Vec<ScanWarning>,
    detector_errors: Vec<DetectorError>,
}

impl ScanReport {
    pub fn new(
        model_name: impl Into<String>,
        dataset_name: Option<String>,
        features: Vec<String>,
        issues: Vec<Issue>,
        warnings: Vec<ScanWarning>,
        detector_errors: Vec<DetectorError>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model_name: model_name.into(),
            dataset_name,
            features,
            issues,
            warnings,
            detector_errors,
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Issues in detector order.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    pub fn detector_errors(&self) -> &[DetectorError] {
        &self.detector_errors
    }

    /// Issues grouped by their group name.
    pub fn issues_by_group(&self) -> BTreeMap<&str, Vec<&Issue>> {
        let mut groups: BTreeMap<&str, Vec<&Issue>> = BTreeMap::new();
        for issue in &self.issues {
            groups.entry(issue.group.as_str()).or_default().push(issue);
        }
        groups
    }

    /// Render the report as a standalone HTML page.
    pub fn to_html(&self) -> Result<String, JuryError> {
        let groups: Vec<_> = self
            .issues_by_group()
            .into_iter()
            .map(|(name, issues)| {
                let rows: Vec<_> = issues
                    .iter()
                    .map(|issue| {
                        json!({
                            "level": issue.level,
                            "description": issue.description,
                            "detector": issue.detector,
                            "example_count": issue.examples.len(),
                        })
                    })
                    .collect();
                json!({ "name": name, "issues": rows })
            })
            .collect();
        let warnings: Vec<String> = self.warnings.iter().map(ToString::to_string).collect();
        let context = json!({
            "model_name": self.model_name,
            "dataset_name": self.dataset_name.as_deref().unwrap_or("unnamed dataset"),
            "features": self.features.join(", "),
            "created_at": self.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "has_issues": self.has_issues(),
            "issue_count": self.issues.len(),
            "groups": groups,
            "warnings": warnings,
            "detector_errors": self.detector_errors,
        });

        Handlebars::new()
            .render_template(REPORT_TEMPLATE, &context)
            .map_err(|e| JuryError::Template(format!("Report render error: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, JuryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// A suite holding the test attached to each issue, in issue order.
    /// Issues without a test are skipped.
    pub fn generate_test_suite(&self, name: impl Into<String>) -> Suite {
        let mut suite = Suite::new(name);
        for test in self.issues.iter().filter_map(|issue| issue.test.clone()) {
            suite.add_test(test);
        }
        suite
    }
}
