//! Wire-level model of the external tracker platform.
//!
//! The engine only ever talks to the platform through [`PlatformTransport`],
//! so the synchronization flows can be exercised against an in-memory
//! implementation while production wires in the HTTP client from
//! [`http`].

pub mod http;
pub mod metadata;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource collections exposed by the tracker API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    TrackedEntities,
    Enrollments,
    Events,
    Programs,
    ProgramStages,
    OrganisationUnits,
}

impl ResourceKind {
    pub const fn path(self) -> &'static str {
        match self {
            ResourceKind::TrackedEntities => "trackedEntityInstances",
            ResourceKind::Enrollments => "enrollments",
            ResourceKind::Events => "events",
            ResourceKind::Programs => "programs",
            ResourceKind::ProgramStages => "programStages",
            ResourceKind::OrganisationUnits => "organisationUnits",
        }
    }
}

/// Read request: a resource, an optional id, and query parameters.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub resource: ResourceKind,
    pub id: Option<String>,
    pub params: Vec<(String, String)>,
}

impl QuerySpec {
    pub fn resource(resource: ResourceKind) -> Self {
        Self {
            resource,
            id: None,
            params: Vec::new(),
        }
    }

    pub fn with_id(resource: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            resource,
            id: Some(id.into()),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Write operation carried by a [`MutateSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
}

/// Write request: resource, operation, optional id, and a JSON body.
#[derive(Debug, Clone)]
pub struct MutateSpec {
    pub resource: ResourceKind,
    pub operation: WriteOperation,
    pub id: Option<String>,
    pub body: Value,
}

impl MutateSpec {
    pub fn create(resource: ResourceKind, body: Value) -> Self {
        Self {
            resource,
            operation: WriteOperation::Create,
            id: None,
            body,
        }
    }

    pub fn update(resource: ResourceKind, id: impl Into<String>, body: Value) -> Self {
        Self {
            resource,
            operation: WriteOperation::Update,
            id: Some(id.into()),
            body,
        }
    }
}

/// Field-level conflict reported by the platform for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConflict {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub value: String,
}

/// Per-item import summary from a write response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<ImportConflict>,
}

/// Aggregate counters from a bulk write response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ImportCounts {
    #[serde(default)]
    pub imported: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub ignored: u64,
}

/// Parsed response envelope for any write.
#[derive(Debug, Clone, Default)]
pub struct MutationResponse {
    pub summaries: Vec<ImportSummary>,
    pub counts: Option<ImportCounts>,
}

impl MutationResponse {
    /// Parses the platform's response envelope. The platform nests payloads
    /// under `response`; older endpoints return summaries at the top level,
    /// so both shapes are accepted.
    pub fn from_envelope(value: &Value) -> Self {
        let body = value.get("response").unwrap_or(value);

        let summaries = body
            .get("importSummaries")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let counts = body
            .get("importCount")
            .and_then(|item| serde_json::from_value(item.clone()).ok());

        Self { summaries, counts }
    }

    /// The first reference id returned by the write, if any.
    pub fn first_reference(&self) -> Option<&str> {
        self.summaries
            .iter()
            .find_map(|summary| summary.reference.as_deref())
    }

    /// All field-level conflicts across summaries, in response order.
    pub fn conflicts(&self) -> Vec<ImportConflict> {
        self.summaries
            .iter()
            .flat_map(|summary| summary.conflicts.iter().cloned())
            .collect()
    }

    /// Server-provided description composed across summaries.
    pub fn description(&self) -> String {
        let parts: Vec<&str> = self
            .summaries
            .iter()
            .filter_map(|summary| summary.description.as_deref())
            .filter(|text| !text.trim().is_empty())
            .collect();
        if parts.is_empty() {
            "the platform returned no reference for the created resource".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Failures surfaced by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("tracker rejected the request ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("record modified by another party")]
    Conflict,
    #[error("tracker unreachable: {0}")]
    Network(String),
    #[error("unexpected tracker response: {0}")]
    Decode(String),
}

/// Abstract read/write transport to the tracker platform.
///
/// Implementations decide how specs become HTTP calls; the engine never
/// inspects status codes beyond what the error variants convey.
pub trait PlatformTransport: Send + Sync {
    fn query(&self, spec: &QuerySpec) -> Result<Value, TransportError>;
    fn mutate(&self, spec: &MutateSpec) -> Result<MutationResponse, TransportError>;
}
