//! Normalized resource status and operation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known keys in [`OperationResult::raw`] shared by clients and payloads
pub mod raw {
    /// Provider ARN of the resource
    pub const ARN: &str = "arn";
    /// Public domain name (e.g. the distribution's `*.cloudfront.net` name)
    pub const DOMAIN_NAME: &str = "domain_name";
    /// Whether a distribution is enabled
    pub const ENABLED: &str = "enabled";
    /// Current bucket policy document
    pub const POLICY: &str = "policy";
    /// Bucket tags as an object
    pub const TAGS: &str = "tags";
    /// Whether a bucket still holds objects (or object versions)
    pub const HAS_OBJECTS: &str = "has_objects";
    /// DNS validation record of a certificate
    pub const VALIDATION_RECORD: &str = "validation_record";
    /// Record content / ttl for DNS records
    pub const CONTENT: &str = "content";
    pub const TTL: &str = "ttl";
    /// Bucket tag recording the last synced content revision
    pub const REVISION_TAG: &str = "stackflow:revision";
}

/// Normalized status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Requested but not yet being worked on (e.g. certificate awaiting validation)
    Pending,
    /// Provider is converging the resource
    InProgress,
    /// Resource is usable
    Ready,
    /// Resource is deployed but disabled
    Disabled,
    /// Resource is in an error state
    Failed,
    /// Resource does not exist
    NotFound,
}

impl ResourceStatus {
    /// Statuses after which no further transition is expected without a new mutation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Ready | ResourceStatus::Disabled | ResourceStatus::NotFound
        )
    }

    pub fn exists(&self) -> bool {
        *self != ResourceStatus::NotFound
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::InProgress => write!(f, "in_progress"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Disabled => write!(f, "disabled"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::NotFound => write!(f, "not_found"),
        }
    }
}

/// Result of a single client call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Normalized status
    pub status: ResourceStatus,

    /// Provider-assigned identifier, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Optimistic-concurrency token (ETag or equivalent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Provider payload, kept for diagnostics and payload convergence checks
    #[serde(default)]
    pub raw: serde_json::Value,

    /// When this observation was made
    pub observed_at: DateTime<Utc>,
}

impl OperationResult {
    pub fn new(status: ResourceStatus) -> Self {
        Self {
            status,
            resource_id: None,
            version: None,
            raw: serde_json::Value::Null,
            observed_at: Utc::now(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(ResourceStatus::NotFound)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn observed(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(|v| v.as_str())
    }

    pub fn raw_bool(&self, key: &str) -> Option<bool> {
        self.raw.get(key).and_then(|v| v.as_bool())
    }

    pub fn raw_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.raw.get(key).filter(|v| !v.is_null())
    }
}
