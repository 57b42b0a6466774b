//! Contracts for the external services the pipeline orchestrates.

use async_trait::async_trait;
use lookgen_core::request::{GenerationOptions, Target};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// `schema.table` (or `database.schema.table`) as used in SQL.
    pub fn qualified_name(&self) -> String {
        [self.database.as_deref(), self.schema.as_deref(), Some(&self.name)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// What the introspection service reports for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub description: String,
}

/// Model-written descriptions for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub table: String,
    pub description: String,
    #[serde(default)]
    pub columns: Vec<ColumnDescription>,
}

impl TableDescription {
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.description.as_str())
    }
}

/// Failures reported by a collaborator. All of them end the job.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Network failure, timeout or 5xx.
    #[error("{service} unreachable: {detail}")]
    Unreachable { service: &'static str, detail: String },

    /// The target does not exist or the schema could not be interpreted.
    #[error("Malformed schema: {0}")]
    MalformedSchema(String),

    /// Rate limit or usage quota hit.
    #[error("{service} quota exceeded: {detail}")]
    QuotaExceeded { service: &'static str, detail: String },

    /// Any other refusal (4xx, undecodable response).
    #[error("{service} rejected the request ({status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },
}

impl CollaboratorError {
    /// Message safe to show to end users; the `Display` output carries the
    /// internal detail and goes into the diagnostic field.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreachable { service, .. } => {
                format!("The {service} service could not be reached")
            }
            Self::MalformedSchema(_) => {
                "The target schema could not be read; check that the tables exist".to_string()
            }
            Self::QuotaExceeded { service, .. } => {
                format!("The {service} service quota was exceeded; try again later")
            }
            Self::Rejected { service, .. } => format!("The {service} service rejected the request"),
        }
    }
}

/// Reads table and column structure for a target.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn introspect(&self, target: &Target) -> Result<SchemaSnapshot, CollaboratorError>;
}

/// Writes human descriptions for a table and its columns.
#[async_trait]
pub trait DescriptionModel: Send + Sync {
    async fn describe(
        &self,
        table: &TableSchema,
        options: &GenerationOptions,
    ) -> Result<TableDescription, CollaboratorError>;
}
