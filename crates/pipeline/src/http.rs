//! HTTP clients for the introspection service and the description model.
//!
//! Both services speak JSON over `POST`. Status handling:
//!
//! | Response             | Error                                      |
//! |----------------------|--------------------------------------------|
//! | connect/read failure | `Unreachable`                              |
//! | 5xx                  | `Unreachable`                              |
//! | 429                  | `QuotaExceeded`                            |
//! | other 4xx            | `MalformedSchema` (introspection) / `Rejected` (model) |
//! | undecodable body     | `MalformedSchema` (introspection) / `Rejected` (model) |

use std::time::Duration;

use async_trait::async_trait;
use lookgen_core::request::{GenerationOptions, Target};
use reqwest::StatusCode;
use serde::Serialize;

use crate::collaborators::{
    CollaboratorError, DescriptionModel, SchemaIntrospector, SchemaSnapshot, TableDescription,
    TableSchema,
};

const INTROSPECTION: &str = "introspection";
const MODEL: &str = "model";

/// Longest response body kept in an error diagnostic.
const MAX_BODY_IN_ERROR: usize = 512;

/// Collaborator endpoints loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub introspection_url: String,
    pub model_url: String,
    pub request_timeout: Duration,
}

impl CollaboratorConfig {
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `INTROSPECTION_URL`         | `http://localhost:8081` |
    /// | `MODEL_URL`                 | `http://localhost:8082` |
    /// | `COLLABORATOR_TIMEOUT_SECS` | `120`                   |
    pub fn from_env() -> Self {
        let introspection_url = std::env::var("INTROSPECTION_URL")
            .unwrap_or_else(|_| "http://localhost:8081".into());
        let model_url =
            std::env::var("MODEL_URL").unwrap_or_else(|_| "http://localhost:8082".into());
        let timeout_secs: u64 = std::env::var("COLLABORATOR_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("COLLABORATOR_TIMEOUT_SECS must be a valid u64");

        Self {
            introspection_url,
            model_url,
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to build reqwest HTTP client")
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{path}", base.trim_end_matches('/'))
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_BODY_IN_ERROR {
        let mut cut = MAX_BODY_IN_ERROR;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

/// POST `body` and return the successful response, mapping transport
/// failures, 429 and 5xx. Other non-success statuses come back as
/// `Rejected` for the caller to refine.
async fn post(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
    body: &impl Serialize,
) -> Result<reqwest::Response, CollaboratorError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| CollaboratorError::Unreachable {
            service,
            detail: e.to_string(),
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = truncate(response.text().await.unwrap_or_default());
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => CollaboratorError::QuotaExceeded {
            service,
            detail: text,
        },
        s if s.is_server_error() => CollaboratorError::Unreachable {
            service,
            detail: format!("HTTP {}: {text}", s.as_u16()),
        },
        s => CollaboratorError::Rejected {
            service,
            status: s.as_u16(),
            body: text,
        },
    })
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

pub struct HttpIntrospector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIntrospector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self::new(&config.introspection_url, config.request_timeout)
    }
}

#[derive(Serialize)]
struct IntrospectRequest<'a> {
    target: &'a Target,
}

#[async_trait]
impl SchemaIntrospector for HttpIntrospector {
    async fn introspect(&self, target: &Target) -> Result<SchemaSnapshot, CollaboratorError> {
        let url = endpoint(&self.base_url, "introspect");
        let response = post(&self.client, INTROSPECTION, &url, &IntrospectRequest { target })
            .await
            .map_err(|e| match e {
                CollaboratorError::Rejected { status, body, .. } => {
                    CollaboratorError::MalformedSchema(format!("HTTP {status}: {body}"))
                }
                other => other,
            })?;

        response
            .json::<SchemaSnapshot>()
            .await
            .map_err(|e| CollaboratorError::MalformedSchema(format!("undecodable snapshot: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Description model
// ---------------------------------------------------------------------------

pub struct HttpDescriptionModel {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDescriptionModel {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self::new(&config.model_url, config.request_timeout)
    }
}

#[derive(Serialize)]
struct DescribeRequest<'a> {
    table: &'a TableSchema,
    options: &'a GenerationOptions,
}

#[async_trait]
impl DescriptionModel for HttpDescriptionModel {
    async fn describe(
        &self,
        table: &TableSchema,
        options: &GenerationOptions,
    ) -> Result<TableDescription, CollaboratorError> {
        let url = endpoint(&self.base_url, "describe");
        let response = post(&self.client, MODEL, &url, &DescribeRequest { table, options }).await?;
        let status = response.status().as_u16();

        response
            .json::<TableDescription>()
            .await
            .map_err(|e| CollaboratorError::Rejected {
                service: MODEL,
                status,
                body: format!("undecodable description: {e}"),
            })
    }
}
