//! Resource identity

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context key under which a bound handle carries its parent's provider id
pub const PARENT_ID: &str = "parent_id";

/// Context key for the region a resource lives in
pub const REGION: &str = "region";

/// Kind of managed cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Object storage bucket
    Bucket,
    /// CDN distribution
    Distribution,
    /// CDN origin access control
    OriginAccessControl,
    /// CDN cache invalidation
    Invalidation,
    /// TLS certificate
    Certificate,
    /// Key-value table
    Table,
    /// Record inside a hosted DNS zone
    HostedZoneRecord,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Distribution => write!(f, "distribution"),
            ResourceKind::OriginAccessControl => write!(f, "origin-access-control"),
            ResourceKind::Invalidation => write!(f, "invalidation"),
            ResourceKind::Certificate => write!(f, "certificate"),
            ResourceKind::Table => write!(f, "table"),
            ResourceKind::HostedZoneRecord => write!(f, "hosted-zone-record"),
        }
    }
}

/// Identity of a handle within one plan: (kind, logical name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl HandleKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for HandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Identifies one managed cloud resource.
///
/// A handle is immutable: the `with_*` methods return a new handle. The
/// logical `name` is known when a plan is authored; the provider-assigned
/// `id` may only become known once the resource has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    kind: ResourceKind,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<HandleKey>,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            id: None,
            context: BTreeMap::new(),
            parent: None,
        }
    }

    pub fn bucket(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Bucket, name)
    }

    pub fn distribution(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Distribution, name)
    }

    pub fn origin_access_control(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::OriginAccessControl, name)
    }

    pub fn certificate(domain: impl Into<String>) -> Self {
        Self::new(ResourceKind::Certificate, domain)
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Table, name)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_region(self, region: impl Into<String>) -> Self {
        self.with_context(REGION, region)
    }

    pub fn with_parent(mut self, parent: HandleKey) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn parent(&self) -> Option<&HandleKey> {
        self.parent.as_ref()
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn region(&self) -> Option<&str> {
        self.context_value(REGION)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.context_value(PARENT_ID)
    }

    pub fn key(&self) -> HandleKey {
        HandleKey::new(self.kind, self.name.clone())
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} '{}' ({})", self.kind, self.name, id),
            None => write!(f, "{} '{}'", self.kind, self.name),
        }
    }
}
