//! In-memory tabular datasets.
//!
//! A `Dataset` is an ordered list of indexed rows over an ordered set of
//! columns, each column carrying a declared `ColumnType`. Row indexes are
//! expected to be unique; `has_duplicate_index` and `reset_index` let callers
//! detect and repair datasets that break this.

use crate::error::JuryError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// An ordered mapping of column name to value.
pub type Record = IndexMap<String, Value>;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Numeric,
    Category,
}

/// Infer a column type from its values.
///
/// Numbers give `Numeric`, booleans give `Category`, anything else is `Text`.
/// Nulls are ignored; an all-null column is `Text`.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let mut has_number = false;
    let mut has_bool = false;

    for v in values {
        match v {
            Value::Null => {}
            Value::Number(_) => has_number = true,
            Value::Bool(_) => has_bool = true,
            _ => return ColumnType::Text,
        }
    }

    match (has_number, has_bool) {
        (true, false) => ColumnType::Numeric,
        (false, true) => ColumnType::Category,
        _ => ColumnType::Text,
    }
}

/// One dataset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    pub values: Record,
}

impl Row {
    pub fn new(index: usize, values: Record) -> Self {
        Self { index, values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Project the row onto `columns`, in that order. Absent columns map to null.
    pub fn select(&self, columns: &[String]) -> Record {
        columns
            .iter()
            .map(|c| (c.clone(), self.values.get(c).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

/// A tabular dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    id: Uuid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    target: Option<String>,
    columns: Vec<String>,
    column_types: IndexMap<String, ColumnType>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset from records, indexing rows `0..n`.
    ///
    /// Columns are collected in first-seen order; a record lacking a column
    /// gets a null for it. Column types are inferred from the values.
    pub fn from_records(records: Vec<Record>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, values)| Row::new(i, values))
            .collect();
        Self::from_rows(rows)
    }

    /// Build a dataset from rows with explicit (possibly duplicated) indexes.
    pub fn from_rows(mut rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            for key in row.values.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }

        for row in &mut rows {
            row.values = row.select(&columns);
        }

        let column_types = columns
            .iter()
            .map(|c| {
                let dtype = infer_column_type(rows.iter().filter_map(|r| r.get(c)));
                (c.clone(), dtype)
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: None,
            target: None,
            columns,
            column_types,
            rows,
        }
    }

    /// Parse a JSON array of objects or JSON Lines into a dataset.
    pub fn from_json_str(text: &str) -> Result<Self, JuryError> {
        let trimmed = text.trim_start();
        let records: Vec<Record> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<_, _>>()?
        };
        Ok(Self::from_records(records))
    }

    /// Read a `.json` or `.jsonl` file.
    pub fn from_json_file(path: &Path) -> Result<Self, JuryError> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());
        let mut dataset = Self::from_json_str(&text)?;
        dataset.name = name;
        Ok(dataset)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare the target column. It must exist.
    pub fn with_target(mut self, target: impl Into<String>) -> Result<Self, JuryError> {
        let target = target.into();
        if !self.columns.contains(&target) {
            return Err(JuryError::invalid_argument(format!(
                "Target column '{}' is not present in the dataset",
                target
            )));
        }
        self.target = Some(target);
        Ok(self)
    }

    /// Override declared column types.
    pub fn with_column_types(
        mut self,
        types: impl IntoIterator<Item = (String, ColumnType)>,
    ) -> Result<Self, JuryError> {
        for (column, dtype) in types {
            match self.column_types.get_mut(&column) {
                Some(slot) => *slot = dtype,
                None => {
                    return Err(JuryError::invalid_argument(format!(
                        "Cannot set type of unknown column '{}'",
                        column
                    )));
                }
            }
        }
        Ok(self)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &IndexMap<String, ColumnType> {
        &self.column_types
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_types.get(column).copied()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row with the given index (first match).
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.iter().find(|r| r.index == index)
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<Value>, JuryError> {
        if !self.columns.iter().any(|c| c == name) {
            return Err(JuryError::invalid_argument(format!(
                "Column '{}' is not present in the dataset",
                name
            )));
        }
        Ok(self
            .rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect())
    }

    /// All columns except the target.
    pub fn feature_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| Some(c.as_str()) != self.target.as_deref())
            .cloned()
            .collect()
    }

    /// Keep the rows matching `predicate`.
    pub fn slice<F>(&self, predicate: F) -> Dataset
    where
        F: Fn(&Row) -> bool,
    {
        self.derive(self.rows.iter().filter(|r| predicate(r)).cloned().collect())
    }

    /// Keep exactly the rows whose index is in `indices`, in dataset order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        let wanted: HashSet<usize> = indices.iter().copied().collect();
        self.slice(|row| wanted.contains(&row.index))
    }

    pub fn has_duplicate_index(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.rows.len());
        !self.rows.iter().all(|r| seen.insert(r.index))
    }

    /// Copy of the dataset with rows re-indexed `0..n`.
    pub fn reset_index(&self) -> Dataset {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| Row::new(i, r.values.clone()))
            .collect();
        self.derive(rows)
    }

    /// Check the structural invariants of the dataset.
    pub fn validate(&self) -> Result<(), JuryError> {
        let invalid = |reason: String| {
            JuryError::invalid_dataset(format!(
                "The dataset object you provided is not valid: {}. \
                 Please build it with `jury_core::Dataset` so that rows and column types stay consistent.",
                reason
            ))
        };

        if self.columns.is_empty() {
            return Err(invalid("it has no columns".to_string()));
        }
        if let Some(column) = self.columns.iter().find(|c| !self.column_types.contains_key(*c)) {
            return Err(invalid(format!("column '{}' has no declared type", column)));
        }
        if let Some(target) = &self.target
            && !self.columns.contains(target)
        {
            return Err(invalid(format!("target column '{}' is missing", target)));
        }
        for row in &self.rows {
            if let Some(column) = self.columns.iter().find(|c| !row.values.contains_key(*c)) {
                return Err(invalid(format!(
                    "row {} has no value for column '{}'",
                    row.index, column
                )));
            }
        }
        Ok(())
    }

    fn derive(&self, rows: Vec<Row>) -> Dataset {
        Dataset {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            target: self.target.clone(),
            columns: self.columns.clone(),
            column_types: self.column_types.clone(),
            rows,
        }
    }
}
