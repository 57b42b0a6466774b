//! Metadata document assembly for `metadata-generation` jobs.

use lookgen_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::collaborators::{TableDescription, TableSchema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub job_id: JobId,
    pub generated_at: Timestamp,
    pub tables: Vec<TableMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub description: Option<String>,
    pub columns: Vec<ColumnMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub description: Option<String>,
}

/// Merge schema structure with model descriptions. Tables or columns the
/// model skipped keep `description: null`.
pub fn build(
    job_id: JobId,
    generated_at: Timestamp,
    tables: &[TableSchema],
    descriptions: &[TableDescription],
) -> MetadataDocument {
    let tables = tables
        .iter()
        .map(|table| {
            let desc = descriptions.iter().find(|d| d.table == table.name);
            TableMetadata {
                name: table.name.clone(),
                schema: table.schema.clone(),
                database: table.database.clone(),
                description: desc.map(|d| d.description.clone()),
                columns: table
                    .columns
                    .iter()
                    .map(|c| ColumnMetadata {
                        name: c.name.clone(),
                        data_type: c.data_type.clone(),
                        nullable: c.nullable,
                        primary_key: c.primary_key,
                        description: desc.and_then(|d| d.column(&c.name)).map(str::to_string),
                    })
                    .collect(),
            }
        })
        .collect();

    MetadataDocument {
        job_id,
        generated_at,
        tables,
    }
}
