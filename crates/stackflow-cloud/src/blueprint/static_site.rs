//! Private bucket served through a CDN distribution

use super::Timing;
use crate::error::PlanError;
use crate::handle::{ResourceHandle, ResourceKind};
use crate::payload::{
    BucketPolicy, BucketSpec, DistributionSpec, InvalidationSpec, OacSpec, Payload, ResourceRef,
    SyncSpec,
};
use crate::plan::{Plan, RetryPolicy, Step};
use crate::status::ResourceStatus;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Describes one static site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSpec {
    /// Logical name; also the distribution's name
    pub name: String,
    pub bucket: String,
    pub source: PathBuf,
    pub region: Option<String>,
    pub aliases: Vec<String>,
    pub certificate_arn: Option<String>,
    /// Content revision; makes sync and invalidation skippable on re-runs.
    /// Derived from the source directory when unset.
    pub revision: Option<String>,
    pub spa_fallback: bool,
}

impl SiteSpec {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            bucket: name.clone(),
            name,
            source: source.into(),
            region: None,
            aliases: Vec::new(),
            certificate_arn: None,
            revision: None,
            spa_fallback: false,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>, certificate_arn: impl Into<String>) -> Self {
        self.aliases = aliases;
        self.certificate_arn = Some(certificate_arn.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn spa(mut self) -> Self {
        self.spa_fallback = true;
        self
    }

    pub fn oac_name(&self) -> String {
        format!("{}-oac", self.name)
    }

    fn bucket_handle(&self) -> ResourceHandle {
        let handle = ResourceHandle::bucket(&self.bucket);
        match &self.region {
            Some(region) => handle.with_region(region),
            None => handle,
        }
    }

    /// Explicit revision, or the digest of the source directory
    pub fn resolved_revision(&self) -> Result<String, PlanError> {
        match &self.revision {
            Some(revision) => Ok(revision.clone()),
            None => content_revision(&self.source).map_err(|e| PlanError::UnreadableSource {
                path: self.source.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Number of hex digits kept from the source digest
const REVISION_LEN: usize = 16;

/// Digest of every file's relative path, size and modification time under `source`.
///
/// Stable while the tree is untouched, so a rebuilt plan for the same content
/// is satisfied by the revision tag the previous sync left on the bucket.
pub fn content_revision(source: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();

        hasher.update(relative.join("/").as_bytes());
        hasher.update([0]);
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(modified.as_secs().to_le_bytes());
        hasher.update(modified.subsec_nanos().to_le_bytes());
    }
    let mut revision = hex::encode(hasher.finalize());
    revision.truncate(REVISION_LEN);
    Ok(revision)
}

/// Bucket, origin access control, distribution, policy, upload, invalidation
pub fn deploy(site: &SiteSpec, timing: &Timing) -> Result<Plan, PlanError> {
    let bucket = site.bucket_handle();
    let oac = ResourceHandle::origin_access_control(site.oac_name());
    let distribution = ResourceHandle::distribution(&site.name);
    let revision = site.resolved_revision()?;
    let invalidation =
        ResourceHandle::new(ResourceKind::Invalidation, format!("{}-{}", site.name, revision))
            .with_parent(distribution.key());

    let mut spec = DistributionSpec::for_bucket(&site.bucket);
    spec.origin_region = site.region.clone();
    spec.origin_access_control = Some(ResourceRef::named(site.oac_name()));
    spec.aliases = site.aliases.clone();
    spec.certificate_arn = site.certificate_arn.clone();
    spec.spa_fallback = site.spa_fallback;

    Plan::builder(format!("deploy {}", site.name))
        .step(
            Step::create(
                bucket.clone(),
                Payload::Bucket(BucketSpec {
                    region: site.region.clone(),
                    ..BucketSpec::default()
                }),
            )
            .labeled("ensure bucket")
            .with_retry(timing.retry()),
        )
        .step(
            Step::create(
                oac,
                Payload::OriginAccessControl(OacSpec {
                    description: format!("Origin access for {}", site.bucket),
                }),
            )
            .labeled("ensure origin access control")
            .with_retry(timing.retry()),
        )
        .step(
            Step::create(distribution, Payload::Distribution(spec))
                .labeled("ensure distribution")
                .with_retry(timing.retry())
                .with_wait(timing.distribution_wait(ResourceStatus::Ready)),
        )
        .step(
            Step::update(
                bucket.clone(),
                Payload::BucketPolicy(BucketPolicy::cloudfront_read(&site.name)),
            )
            .labeled("apply bucket policy")
            .with_retry(timing.retry()),
        )
        .step(
            Step::update(
                bucket,
                Payload::SyncObjects(SyncSpec {
                    source: site.source.clone(),
                    delete_removed: true,
                    revision: Some(revision),
                    exclude: Vec::new(),
                }),
            )
            .labeled("sync objects")
            .with_retry(timing.retry()),
        )
        .step(
            Step::create(
                invalidation,
                Payload::Invalidation(InvalidationSpec {
                    distribution: ResourceRef::named(&site.name),
                    paths: vec!["/*".to_string()],
                }),
            )
            .labeled("invalidate cache")
            .with_retry(timing.retry())
            .with_wait(timing.invalidation_wait()),
        )
        .build()
}

/// Disable and delete the distribution, then its origin access control, then the bucket
pub fn teardown(site: &SiteSpec, timing: &Timing) -> Result<Plan, PlanError> {
    let bucket = site.bucket_handle();
    let oac = ResourceHandle::origin_access_control(site.oac_name());
    let distribution = ResourceHandle::distribution(&site.name);

    Plan::builder(format!("teardown {}", site.name))
        .step(
            Step::update(distribution.clone(), Payload::DistributionEnabled(false))
                .labeled("disable distribution")
                .allow_absent()
                .with_retry(timing.retry())
                .with_wait(timing.distribution_wait(ResourceStatus::Disabled)),
        )
        .step(
            Step::delete(distribution.clone())
                .labeled("delete distribution")
                .with_retry(timing.retry()),
        )
        .step(
            Step::delete(oac.clone())
                .labeled("delete origin access control")
                .with_retry(RetryPolicy::new(timing.max_retries, timing.oac_retry_delay)),
        )
        .step(
            Step::update(bucket.clone(), Payload::EmptyBucket)
                .labeled("empty bucket")
                .allow_absent()
                .with_retry(timing.retry()),
        )
        .step(
            Step::delete(bucket.clone())
                .labeled("delete bucket")
                .with_retry(timing.retry()),
        )
        .depends_on(distribution.key(), oac.key())
        .depends_on(distribution.key(), bucket.key())
        .build()
}
