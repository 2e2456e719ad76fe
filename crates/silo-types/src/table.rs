//! Dataset and table addressing, write dispositions, rows.

use serde::{Deserialize, Serialize};

/// Project-qualified dataset name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId {
    pub project: String,
    pub dataset: String,
}

impl DatasetId {
    pub fn new(project: &str, dataset: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
        }
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

/// SQL dialect a table path is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    /// Backtick-quoted, for standard SQL: `` `project.dataset.table` ``.
    Standard,
    /// Colon-separated, for legacy SQL: `project:dataset.table`.
    Legacy,
    /// Bare dotted form, used in API paths and messages.
    Plain,
}

/// Fully qualified table path with an optional suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TablePath {
    pub project: String,
    pub dataset: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl TablePath {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        if suffix.is_empty() {
            self.suffix = None;
        } else {
            self.suffix = Some(suffix.to_string());
        }
        self
    }

    pub fn dataset_id(&self) -> DatasetId {
        DatasetId::new(&self.project, &self.dataset)
    }

    /// Table name with the suffix joined by `_`. A suffix embedding a partition
    /// decorator (`$`) is appended verbatim.
    pub fn table_name(&self) -> String {
        match self.suffix.as_deref() {
            None => self.table.clone(),
            Some(s) if s.contains('$') => format!("{}{}", self.table, s),
            Some(s) => format!("{}_{}", self.table, s),
        }
    }

    pub fn render(&self, style: PathStyle) -> String {
        let table = self.table_name();
        match style {
            PathStyle::Standard => {
                format!("`{}.{}.{}`", self.project, self.dataset, table)
            }
            PathStyle::Legacy => format!("{}:{}.{}", self.project, self.dataset, table),
            PathStyle::Plain => format!("{}.{}.{}", self.project, self.dataset, table),
        }
    }
}

impl std::fmt::Display for TablePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render(PathStyle::Plain))
    }
}

/// Policy for writing into an existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteDisposition {
    /// Replace the table contents.
    #[default]
    #[serde(rename = "WRITE_TRUNCATE")]
    Truncate,
    /// Append to the table.
    #[serde(rename = "WRITE_APPEND")]
    Append,
    /// Fail unless the table is empty.
    #[serde(rename = "WRITE_EMPTY")]
    Empty,
}

impl WriteDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
            WriteDisposition::Append => "WRITE_APPEND",
            WriteDisposition::Empty => "WRITE_EMPTY",
        }
    }
}

impl std::fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record to load: field name -> JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Shape of an existing table as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub num_rows: u64,
    pub num_columns: usize,
}

/// One query submission.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    /// Table the results are written to, when set.
    pub destination: Option<TablePath>,
    pub write_disposition: WriteDisposition,
    /// Top-level TIMESTAMP/DATETIME/DATE field to day-partition the destination by.
    pub partition_field: Option<String>,
    pub clustering_fields: Vec<String>,
    /// Estimate cost instead of running.
    pub dry_run: bool,
    pub use_cache: bool,
}

impl QueryRequest {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            destination: None,
            write_disposition: WriteDisposition::default(),
            partition_field: None,
            clustering_fields: Vec::new(),
            dry_run: false,
            use_cache: false,
        }
    }
}
