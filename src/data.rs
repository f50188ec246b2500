//! Data layer contracts – the row cursors bands are bound to.
//!
//! The engine only needs a small slice of a real data provider: positioning,
//! row count and value lookup. [`MemoryDataSource`] is the in-process
//! implementation used by the CLI, the FFI surface and the tests.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, ReportError};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// String key used by grouping and hierarchy building. Null maps to "".
    pub fn as_key(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            // Integral numbers print without a fraction so "1" and 1.0 key alike.
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Resolves a named column against the current schema.
pub trait ColumnResolver {
    /// Returns `None` when the column does not exist; never fails.
    fn resolve_column(&self, column: &str) -> Option<usize>;
}

/// A positionable row cursor.
pub trait DataSourceCursor: ColumnResolver {
    fn name(&self) -> &str;

    fn row_count(&self) -> usize;

    fn current_row_no(&self) -> usize;

    fn set_current_row_no(&mut self, row: usize);

    /// Value of the resolved column `index` in the current row.
    fn value_at(&self, index: usize) -> Result<Value, DataError>;

    fn first(&mut self) {
        self.set_current_row_no(0);
    }

    fn next(&mut self) {
        let row = self.current_row_no();
        self.set_current_row_no(row + 1);
    }

    /// Value of a named column in the current row.
    fn value(&self, column: &str) -> Result<Value, DataError> {
        match self.resolve_column(column) {
            Some(index) => self.value_at(index),
            None => Err(DataError::ColumnNotFound {
                source_name: self.name().to_string(),
                column: column.to_string(),
            }),
        }
    }
}

/// JSON shape accepted by [`MemoryDataSource::from_json`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TableJson {
    Columnar {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Records(Vec<serde_json::Map<String, serde_json::Value>>),
}

/// An in-memory table.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    current: usize,
}

impl MemoryDataSource {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            current: 0,
        }
    }

    /// Builder-style row append. Short rows are padded with nulls.
    pub fn with_row(mut self, values: Vec<Value>) -> Self {
        self.push_row(values);
        self
    }

    pub fn push_row(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(values);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Parse either `{"columns": [...], "rows": [[...]]}` or an array of
    /// flat objects.
    pub fn from_json(name: &str, json: &serde_json::Value) -> Result<Self, ReportError> {
        let table: TableJson = serde_json::from_value(json.clone())?;
        Ok(match table {
            TableJson::Columnar { columns, rows } => {
                let mut source = Self {
                    name: name.to_string(),
                    columns,
                    rows: Vec::with_capacity(rows.len()),
                    current: 0,
                };
                for row in rows {
                    source.push_row(row);
                }
                source
            }
            TableJson::Records(records) => {
                let mut columns: Vec<String> = Vec::new();
                for record in &records {
                    for key in record.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
                let rows = records
                    .iter()
                    .map(|record| {
                        columns
                            .iter()
                            .map(|c| {
                                record
                                    .get(c)
                                    .map(json_to_value)
                                    .unwrap_or(Value::Null)
                            })
                            .collect()
                    })
                    .collect();
                Self {
                    name: name.to_string(),
                    columns,
                    rows,
                    current: 0,
                }
            }
        })
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

impl ColumnResolver for MemoryDataSource {
    fn resolve_column(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

impl DataSourceCursor for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn current_row_no(&self) -> usize {
        self.current
    }

    fn set_current_row_no(&mut self, row: usize) {
        self.current = row;
    }

    fn value_at(&self, index: usize) -> Result<Value, DataError> {
        let row = self
            .rows
            .get(self.current)
            .ok_or_else(|| DataError::RowOutOfRange {
                source_name: self.name.clone(),
                row: self.current,
                count: self.rows.len(),
            })?;
        Ok(row.get(index).cloned().unwrap_or_default())
    }
}

/// Named registry of cursors available to a report run.
#[derive(Default)]
pub struct DataSources {
    sources: HashMap<String, Box<dyn DataSourceCursor>>,
}

impl DataSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn DataSourceCursor>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn with(mut self, source: impl DataSourceCursor + 'static) -> Self {
        self.register(Box::new(source));
        self
    }

    pub fn get(&self, name: &str) -> Result<&dyn DataSourceCursor, ReportError> {
        self.sources
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| ReportError::UnknownDataSource(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut (dyn DataSourceCursor + 'static), ReportError> {
        self.sources
            .get_mut(name)
            .map(|s| s.as_mut())
            .ok_or_else(|| ReportError::UnknownDataSource(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Rewind every cursor; called before each pass.
    pub fn rewind(&mut self) {
        for source in self.sources.values_mut() {
            source.first();
        }
    }

    /// Parse `{"name": <table>, ...}` into a registry of memory tables.
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut sources = Self::new();
        for (name, table) in &parsed {
            sources.register(Box::new(MemoryDataSource::from_json(name, table)?));
        }
        Ok(sources)
    }
}
