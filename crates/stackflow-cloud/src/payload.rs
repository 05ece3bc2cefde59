//! Strongly-typed request payloads
//!
//! Every mutating call receives a [`Payload`] instead of a hand-built JSON
//! string. Values that only exist at run time (ids, ARNs of resources created
//! earlier in the same plan) are expressed as [`ResourceRef`]s and filled in
//! by [`Payload::resolve`] before the client is called.

use crate::bindings::Bindings;
use crate::dns::DnsRecord;
use crate::handle::{HandleKey, ResourceHandle, ResourceKind};
use crate::plan::Action;
use crate::status::{OperationResult, raw};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reference to another resource of the same plan, by logical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,

    /// Provider id, filled in once the referenced resource has been observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ResourceRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    fn resolved(&self, kind: ResourceKind, bindings: &Bindings) -> Self {
        let id = self
            .id
            .clone()
            .or_else(|| bindings.id_of(&HandleKey::new(kind, &self.name)).map(str::to_string));
        Self {
            name: self.name.clone(),
            id,
        }
    }
}

/// Bucket creation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default = "default_true")]
    pub block_public_access: bool,

    #[serde(default)]
    pub versioning: bool,

    #[serde(default = "default_true")]
    pub encryption: bool,
}

impl Default for BucketSpec {
    fn default() -> Self {
        Self {
            region: None,
            block_public_access: true,
            versioning: false,
            encryption: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Bucket policy to apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BucketPolicy {
    /// Allow the given distribution (and only it) to read objects
    CloudFrontRead {
        distribution: ResourceRef,
        #[serde(default)]
        distribution_arn: Option<String>,
    },
    /// Verbatim policy document
    Document { document: serde_json::Value },
}

impl BucketPolicy {
    pub fn cloudfront_read(distribution: impl Into<String>) -> Self {
        BucketPolicy::CloudFrontRead {
            distribution: ResourceRef::named(distribution),
            distribution_arn: None,
        }
    }

    /// Render the policy document for `bucket`.
    ///
    /// Returns `None` while the distribution ARN is still unknown.
    pub fn render(&self, bucket: &str) -> Option<serde_json::Value> {
        match self {
            BucketPolicy::Document { document } => Some(document.clone()),
            BucketPolicy::CloudFrontRead {
                distribution_arn, ..
            } => {
                let arn = distribution_arn.as_deref()?;
                serde_json::to_value(PolicyDocument::cloudfront_read(bucket, arn)).ok()
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument {
    version: &'static str,
    statement: Vec<PolicyStatement>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyStatement {
    sid: &'static str,
    effect: &'static str,
    principal: ServicePrincipal,
    action: &'static str,
    resource: String,
    condition: SourceArnCondition,
}

#[derive(Serialize)]
struct ServicePrincipal {
    #[serde(rename = "Service")]
    service: &'static str,
}

#[derive(Serialize)]
struct SourceArnCondition {
    #[serde(rename = "StringEquals")]
    string_equals: SourceArn,
}

#[derive(Serialize)]
struct SourceArn {
    #[serde(rename = "AWS:SourceArn")]
    source_arn: String,
}

impl PolicyDocument {
    fn cloudfront_read(bucket: &str, distribution_arn: &str) -> Self {
        Self {
            version: "2012-10-17",
            statement: vec![PolicyStatement {
                sid: "AllowCloudFrontServicePrincipalReadOnly",
                effect: "Allow",
                principal: ServicePrincipal {
                    service: "cloudfront.amazonaws.com",
                },
                action: "s3:GetObject",
                resource: format!("arn:aws:s3:::{}/*", bucket),
                condition: SourceArnCondition {
                    string_equals: SourceArn {
                        source_arn: distribution_arn.to_string(),
                    },
                },
            }],
        }
    }
}

/// Upload a local directory into a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSpec {
    pub source: PathBuf,

    /// Remove objects that no longer exist locally
    #[serde(default = "default_true")]
    pub delete_removed: bool,

    /// Content revision; when set, a bucket tagged with the same revision is left alone
    #[serde(default)]
    pub revision: Option<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Origin access control settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OacSpec {
    #[serde(default)]
    pub description: String,
}

/// CDN distribution in front of a private bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub origin_bucket: String,

    #[serde(default)]
    pub origin_region: Option<String>,

    #[serde(default)]
    pub origin_access_control: Option<ResourceRef>,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub certificate_arn: Option<String>,

    #[serde(default = "default_root_object")]
    pub default_root_object: String,

    #[serde(default = "default_price_class")]
    pub price_class: String,

    /// Serve the root object for 403/404 (single page applications)
    #[serde(default)]
    pub spa_fallback: bool,
}

fn default_root_object() -> String {
    "index.html".to_string()
}

fn default_price_class() -> String {
    "PriceClass_100".to_string()
}

impl DistributionSpec {
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            origin_bucket: bucket.into(),
            origin_region: None,
            origin_access_control: None,
            aliases: Vec::new(),
            certificate_arn: None,
            default_root_object: default_root_object(),
            price_class: default_price_class(),
            spa_fallback: false,
        }
    }
}

/// Cache invalidation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationSpec {
    pub distribution: ResourceRef,
    pub paths: Vec<String>,
}

/// DNS-validated certificate request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub domain: String,

    #[serde(default)]
    pub subject_alternative_names: Vec<String>,
}

/// Key-value table with a single string hash key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub hash_key: String,

    #[serde(default = "default_billing_mode")]
    pub billing_mode: String,
}

fn default_billing_mode() -> String {
    "PAY_PER_REQUEST".to_string()
}

impl TableSpec {
    /// Table layout used for state locking
    pub fn lock_table() -> Self {
        Self {
            hash_key: "LockID".to_string(),
            billing_mode: default_billing_mode(),
        }
    }
}

/// Payload attached to a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec", rename_all = "snake_case")]
pub enum Payload {
    None,
    Bucket(BucketSpec),
    BucketPolicy(BucketPolicy),
    SyncObjects(SyncSpec),
    EmptyBucket,
    OriginAccessControl(OacSpec),
    Distribution(DistributionSpec),
    DistributionEnabled(bool),
    Invalidation(InvalidationSpec),
    Certificate(CertificateSpec),
    Table(TableSpec),
    Record(DnsRecord),
}

impl Payload {
    pub fn name(&self) -> &'static str {
        match self {
            Payload::None => "none",
            Payload::Bucket(_) => "bucket",
            Payload::BucketPolicy(_) => "bucket_policy",
            Payload::SyncObjects(_) => "sync_objects",
            Payload::EmptyBucket => "empty_bucket",
            Payload::OriginAccessControl(_) => "origin_access_control",
            Payload::Distribution(_) => "distribution",
            Payload::DistributionEnabled(_) => "distribution_enabled",
            Payload::Invalidation(_) => "invalidation",
            Payload::Certificate(_) => "certificate",
            Payload::Table(_) => "table",
            Payload::Record(_) => "record",
        }
    }

    /// Whether this payload can drive `action` on a resource of `kind`
    pub fn applies_to(&self, kind: ResourceKind, action: Action) -> bool {
        use ResourceKind as K;
        match action {
            Action::Delete => matches!(self, Payload::None),
            Action::Create => matches!(
                (kind, self),
                (K::Bucket, Payload::Bucket(_))
                    | (K::OriginAccessControl, Payload::OriginAccessControl(_))
                    | (K::Distribution, Payload::Distribution(_))
                    | (K::Invalidation, Payload::Invalidation(_))
                    | (K::Certificate, Payload::Certificate(_))
                    | (K::Table, Payload::Table(_))
                    | (K::HostedZoneRecord, Payload::Record(_))
            ),
            Action::Update => matches!(
                (kind, self),
                (K::Bucket, Payload::BucketPolicy(_))
                    | (K::Bucket, Payload::SyncObjects(_))
                    | (K::Bucket, Payload::EmptyBucket)
                    | (K::Distribution, Payload::DistributionEnabled(_))
                    | (K::HostedZoneRecord, Payload::Record(_))
            ),
        }
    }

    /// Destructive payloads need operator confirmation even inside an Update
    pub fn is_destructive(&self) -> bool {
        matches!(self, Payload::EmptyBucket | Payload::DistributionEnabled(false))
    }

    /// Schema checks that do not need the provider
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Payload::BucketPolicy(BucketPolicy::Document { document }) if !document.is_object() => {
                Err("bucket policy document must be a JSON object".to_string())
            }
            Payload::BucketPolicy(BucketPolicy::CloudFrontRead { distribution, .. })
                if distribution.name.is_empty() =>
            {
                Err("bucket policy references an unnamed distribution".to_string())
            }
            Payload::SyncObjects(spec) if spec.source.as_os_str().is_empty() => {
                Err("sync source directory is empty".to_string())
            }
            Payload::Distribution(spec) => {
                if spec.origin_bucket.is_empty() {
                    return Err("distribution origin bucket is empty".to_string());
                }
                if !spec.aliases.is_empty() && spec.certificate_arn.is_none() {
                    return Err("distribution aliases require a certificate ARN".to_string());
                }
                if spec.default_root_object.starts_with('/') {
                    return Err("default root object must not start with '/'".to_string());
                }
                Ok(())
            }
            Payload::Invalidation(spec) => {
                if spec.paths.is_empty() {
                    return Err("invalidation has no paths".to_string());
                }
                if let Some(path) = spec.paths.iter().find(|p| !p.starts_with('/')) {
                    return Err(format!("invalidation path '{}' must start with '/'", path));
                }
                Ok(())
            }
            Payload::Certificate(spec) if !spec.domain.contains('.') => {
                Err(format!("'{}' is not a domain name", spec.domain))
            }
            Payload::Table(spec) => {
                if spec.hash_key.is_empty() {
                    return Err("table hash key is empty".to_string());
                }
                match spec.billing_mode.as_str() {
                    "PAY_PER_REQUEST" | "PROVISIONED" => Ok(()),
                    other => Err(format!("unknown billing mode '{}'", other)),
                }
            }
            Payload::Record(record) => {
                if record.name.is_empty() || record.record_type.is_empty() {
                    return Err("record needs a name and a type".to_string());
                }
                if record.content.is_empty() {
                    return Err(format!("record {} has no content", record.name));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Resources this payload depends on (used for deletion ordering)
    pub fn references(&self) -> Vec<HandleKey> {
        match self {
            Payload::Distribution(spec) => {
                let mut refs = vec![HandleKey::new(ResourceKind::Bucket, &spec.origin_bucket)];
                if let Some(oac) = &spec.origin_access_control {
                    refs.push(HandleKey::new(ResourceKind::OriginAccessControl, &oac.name));
                }
                refs
            }
            Payload::Invalidation(spec) => {
                vec![HandleKey::new(ResourceKind::Distribution, &spec.distribution.name)]
            }
            _ => Vec::new(),
        }
    }

    /// Fill in run-time values from the results of earlier steps
    pub fn resolve(&self, bindings: &Bindings) -> Payload {
        match self {
            Payload::Distribution(spec) => {
                let mut spec = spec.clone();
                spec.origin_access_control = spec
                    .origin_access_control
                    .as_ref()
                    .map(|oac| oac.resolved(ResourceKind::OriginAccessControl, bindings));
                Payload::Distribution(spec)
            }
            Payload::Invalidation(spec) => Payload::Invalidation(InvalidationSpec {
                distribution: spec
                    .distribution
                    .resolved(ResourceKind::Distribution, bindings),
                paths: spec.paths.clone(),
            }),
            Payload::BucketPolicy(BucketPolicy::CloudFrontRead {
                distribution,
                distribution_arn,
            }) => {
                let key = HandleKey::new(ResourceKind::Distribution, &distribution.name);
                let arn = distribution_arn
                    .clone()
                    .or_else(|| bindings.raw_str(&key, raw::ARN).map(str::to_string));
                Payload::BucketPolicy(BucketPolicy::CloudFrontRead {
                    distribution: distribution.resolved(ResourceKind::Distribution, bindings),
                    distribution_arn: arn,
                })
            }
            other => other.clone(),
        }
    }

    /// Whether an Update with this payload would change nothing on `current`
    pub fn is_satisfied_by(&self, handle: &ResourceHandle, current: &OperationResult) -> bool {
        match self {
            Payload::DistributionEnabled(enabled) => match current.raw_bool(raw::ENABLED) {
                Some(flag) => flag == *enabled,
                None => {
                    use crate::status::ResourceStatus;
                    let expected = if *enabled {
                        ResourceStatus::Ready
                    } else {
                        ResourceStatus::Disabled
                    };
                    current.status == expected
                }
            },
            Payload::EmptyBucket => current.raw_bool(raw::HAS_OBJECTS) == Some(false),
            Payload::BucketPolicy(policy) => match policy.render(handle.name()) {
                Some(document) => current.raw_value(raw::POLICY) == Some(&document),
                None => false,
            },
            Payload::SyncObjects(spec) => match &spec.revision {
                Some(revision) => current
                    .raw
                    .get(raw::TAGS)
                    .and_then(|tags| tags.get(raw::REVISION_TAG))
                    .and_then(|v| v.as_str())
                    == Some(revision.as_str()),
                None => false,
            },
            Payload::Record(record) => {
                let content_matches = current.raw_str(raw::CONTENT) == Some(record.content.as_str());
                let ttl_matches = match record.ttl {
                    Some(ttl) => {
                        current.raw.get(raw::TTL).and_then(|v| v.as_u64()) == Some(u64::from(ttl))
                    }
                    None => true,
                };
                content_matches && ttl_matches
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ResourceStatus;
    use serde_json::json;

    #[test]
    fn test_cloudfront_read_policy_document() {
        let policy = BucketPolicy::CloudFrontRead {
            distribution: ResourceRef::named("docs"),
            distribution_arn: Some("arn:aws:cloudfront::123456789012:distribution/E1".into()),
        };
        let document = policy.render("docs-bucket").unwrap();

        assert_eq!(document["Version"], "2012-10-17");
        let statement = &document["Statement"][0];
        assert_eq!(statement["Principal"]["Service"], "cloudfront.amazonaws.com");
        assert_eq!(statement["Action"], "s3:GetObject");
        assert_eq!(statement["Resource"], "arn:aws:s3:::docs-bucket/*");
        assert_eq!(
            statement["Condition"]["StringEquals"]["AWS:SourceArn"],
            "arn:aws:cloudfront::123456789012:distribution/E1"
        );
    }

    #[test]
    fn test_policy_without_arn_does_not_render() {
        assert!(BucketPolicy::cloudfront_read("docs").render("bucket").is_none());
    }

    #[test]
    fn test_applies_to() {
        let create_bucket = Payload::Bucket(BucketSpec::default());
        assert!(create_bucket.applies_to(ResourceKind::Bucket, Action::Create));
        assert!(!create_bucket.applies_to(ResourceKind::Distribution, Action::Create));
        assert!(!create_bucket.applies_to(ResourceKind::Bucket, Action::Update));

        assert!(Payload::EmptyBucket.applies_to(ResourceKind::Bucket, Action::Update));
        assert!(Payload::None.applies_to(ResourceKind::Table, Action::Delete));
        assert!(!Payload::EmptyBucket.applies_to(ResourceKind::Bucket, Action::Delete));
    }

    #[test]
    fn test_distribution_validation() {
        let mut spec = DistributionSpec::for_bucket("site-bucket");
        spec.aliases = vec!["www.example.com".into()];
        let err = Payload::Distribution(spec.clone()).validate().unwrap_err();
        assert!(err.contains("certificate"));

        spec.certificate_arn = Some("arn:aws:acm:us-east-1:1:certificate/abc".into());
        assert!(Payload::Distribution(spec).validate().is_ok());
    }

    #[test]
    fn test_invalidation_paths_must_be_absolute() {
        let payload = Payload::Invalidation(InvalidationSpec {
            distribution: ResourceRef::named("site"),
            paths: vec!["index.html".into()],
        });
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_references() {
        let mut spec = DistributionSpec::for_bucket("site-bucket");
        spec.origin_access_control = Some(ResourceRef::named("site-oac"));
        let refs = Payload::Distribution(spec).references();
        assert_eq!(
            refs,
            vec![
                HandleKey::new(ResourceKind::Bucket, "site-bucket"),
                HandleKey::new(ResourceKind::OriginAccessControl, "site-oac"),
            ]
        );
        assert!(Payload::BucketPolicy(BucketPolicy::cloudfront_read("site")).references().is_empty());
    }

    #[test]
    fn test_resolve_fills_ids_and_arn() {
        let mut bindings = Bindings::new();
        bindings.record(
            HandleKey::new(ResourceKind::OriginAccessControl, "site-oac"),
            OperationResult::new(ResourceStatus::Ready).with_id("E3OAC"),
        );
        bindings.record(
            HandleKey::new(ResourceKind::Distribution, "site"),
            OperationResult::new(ResourceStatus::Ready)
                .with_id("E1DIST")
                .with_raw(json!({"arn": "arn:aws:cloudfront::1:distribution/E1DIST"})),
        );

        let mut spec = DistributionSpec::for_bucket("site-bucket");
        spec.origin_access_control = Some(ResourceRef::named("site-oac"));
        match Payload::Distribution(spec).resolve(&bindings) {
            Payload::Distribution(resolved) => {
                assert_eq!(resolved.origin_access_control.unwrap().id.as_deref(), Some("E3OAC"));
            }
            other => panic!("unexpected payload {:?}", other),
        }

        match Payload::BucketPolicy(BucketPolicy::cloudfront_read("site")).resolve(&bindings) {
            Payload::BucketPolicy(BucketPolicy::CloudFrontRead {
                distribution,
                distribution_arn,
            }) => {
                assert_eq!(distribution.id.as_deref(), Some("E1DIST"));
                assert_eq!(
                    distribution_arn.as_deref(),
                    Some("arn:aws:cloudfront::1:distribution/E1DIST")
                );
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_satisfaction_checks() {
        let bucket = ResourceHandle::bucket("site-bucket");

        let disabled = OperationResult::new(ResourceStatus::InProgress)
            .with_raw(json!({"enabled": false}));
        assert!(Payload::DistributionEnabled(false).is_satisfied_by(&bucket, &disabled));
        assert!(!Payload::DistributionEnabled(true).is_satisfied_by(&bucket, &disabled));

        let empty = OperationResult::new(ResourceStatus::Ready).with_raw(json!({"has_objects": false}));
        assert!(Payload::EmptyBucket.is_satisfied_by(&bucket, &empty));

        let synced = OperationResult::new(ResourceStatus::Ready)
            .with_raw(json!({"tags": {"stackflow:revision": "abc123"}}));
        let sync = |revision: Option<&str>| {
            Payload::SyncObjects(SyncSpec {
                source: PathBuf::from("dist"),
                delete_removed: true,
                revision: revision.map(str::to_string),
                exclude: Vec::new(),
            })
        };
        assert!(sync(Some("abc123")).is_satisfied_by(&bucket, &synced));
        assert!(!sync(Some("def456")).is_satisfied_by(&bucket, &synced));
        assert!(!sync(None).is_satisfied_by(&bucket, &synced));
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let json = serde_json::to_value(Payload::DistributionEnabled(false)).unwrap();
        assert_eq!(json, json!({"type": "distribution_enabled", "spec": false}));
        let json = serde_json::to_value(Payload::EmptyBucket).unwrap();
        assert_eq!(json, json!({"type": "empty_bucket"}));
    }
}
