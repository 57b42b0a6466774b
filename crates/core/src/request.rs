//! Generation request payloads and their synchronous validation.
//!
//! A request that fails [`GenerationRequest::validate`] is rejected before a
//! job record exists. Anything that can only be discovered by talking to the
//! warehouse (missing tables, broken schemas) is the executor's business and
//! surfaces as a failed job instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Longest identifier accepted for a connection, database, schema or table.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Upper bound for `options.max_tables` and for explicit table lists.
pub const MAX_TABLES: usize = 500;

/// Upper bound for a per-job timeout (24 hours).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// What a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Table and column descriptions as a JSON document.
    MetadataGeneration,
    /// LookML view files.
    LookmlGeneration,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MetadataGeneration => "metadata-generation",
            Self::LookmlGeneration => "lookml-generation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata-generation" => Ok(Self::MetadataGeneration),
            "lookml-generation" => Ok(Self::LookmlGeneration),
            other => Err(CoreError::Validation(format!("Unknown job kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Which warehouse objects a job covers.
///
/// On the wire a target is either a selector object or a bare path string:
/// `"orders"`, `"sales.orders"` or `"warehouse.sales.orders"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TargetInput")]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub tables: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetInput {
    Path(String),
    Selector {
        #[serde(default)]
        connection: Option<String>,
        #[serde(default)]
        database: Option<String>,
        #[serde(default)]
        schema: Option<String>,
        #[serde(default)]
        tables: Vec<String>,
    },
}

impl From<TargetInput> for Target {
    fn from(input: TargetInput) -> Self {
        match input {
            TargetInput::Path(path) => Target::from_path(&path),
            TargetInput::Selector {
                connection,
                database,
                schema,
                tables,
            } => Target {
                connection,
                database,
                schema,
                tables,
            },
        }
    }
}

impl Target {
    /// A target covering a single table.
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            tables: vec![name.into()],
            ..Default::default()
        }
    }

    /// Split a dotted path into database / schema / table.
    ///
    /// Paths with more than three segments are kept whole as a table name so
    /// validation reports them instead of silently dropping a segment.
    pub fn from_path(path: &str) -> Self {
        let parts: Vec<&str> = path.trim().split('.').collect();
        match parts.as_slice() {
            [table] => Self::table(*table),
            [schema, table] => Self {
                schema: Some((*schema).to_string()),
                tables: vec![(*table).to_string()],
                ..Default::default()
            },
            [database, schema, table] => Self {
                database: Some((*database).to_string()),
                schema: Some((*schema).to_string()),
                tables: vec![(*table).to_string()],
                ..Default::default()
            },
            _ => Self::table(path.trim()),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tables.is_empty() && self.schema.is_none() {
            return Err(CoreError::Validation(
                "Target must name at least one table or a schema".into(),
            ));
        }
        if self.tables.len() > MAX_TABLES {
            return Err(CoreError::Validation(format!(
                "Target lists {} tables, maximum is {MAX_TABLES}",
                self.tables.len()
            )));
        }

        let named = [
            ("connection", self.connection.as_deref()),
            ("database", self.database.as_deref()),
            ("schema", self.schema.as_deref()),
        ];
        for (field, value) in named {
            if let Some(value) = value {
                validate_identifier(field, value)?;
            }
        }
        for table in &self.tables {
            validate_identifier("table", table)?;
        }
        Ok(())
    }

    /// Compact human-readable form used in logs and task summaries.
    pub fn describe(&self) -> String {
        let mut prefix = String::new();
        if let Some(db) = &self.database {
            prefix.push_str(db);
            prefix.push('.');
        }
        if let Some(schema) = &self.schema {
            prefix.push_str(schema);
            prefix.push('.');
        }
        match self.tables.as_slice() {
            [] => format!("{prefix}*"),
            [one] => format!("{prefix}{one}"),
            many => format!("{prefix}{{{}}}", many.join(",")),
        }
    }
}

/// Identifiers are restricted to characters that are safe in every
/// warehouse dialect we target and in LookML view names.
fn validate_identifier(field: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::Validation(format!(
            "{field} '{value}' exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-')))
    {
        return Err(CoreError::Validation(format!(
            "{field} '{value}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Options and request
// ---------------------------------------------------------------------------

fn default_include_columns() -> bool {
    true
}

/// Tuning knobs forwarded to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Describe columns as well as tables.
    #[serde(default = "default_include_columns")]
    pub include_columns: bool,
    /// Cap on the number of tables taken from a schema-wide target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tables: Option<u32>,
    /// Language model override, passed through to the model collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Free-form description style hint ("concise", "business", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            include_columns: true,
            max_tables: None,
            model: None,
            style: None,
        }
    }
}

/// Body of `POST /generation/async` and the derived payload of agent tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: JobKind,
    pub target: Target,
    #[serde(default)]
    pub options: GenerationOptions,
    /// Per-job deadline override in seconds, measured from dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl GenerationRequest {
    pub fn new(kind: JobKind, target: Target) -> Self {
        Self {
            kind,
            target,
            options: GenerationOptions::default(),
            timeout_secs: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.target.validate()?;

        if let Some(max) = self.options.max_tables {
            if max == 0 || max as usize > MAX_TABLES {
                return Err(CoreError::Validation(format!(
                    "options.max_tables must be between 1 and {MAX_TABLES}"
                )));
            }
        }
        if let Some(timeout) = self.timeout_secs {
            if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
                return Err(CoreError::Validation(format!(
                    "timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
                )));
            }
        }
        Ok(())
    }
}
