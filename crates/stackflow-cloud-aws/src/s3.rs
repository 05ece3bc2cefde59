//! S3 bucket lifecycle client

use crate::cli::AwsCli;
use crate::error::{AwsError, classify};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use stackflow_cloud::payload::{BucketSpec, SyncSpec};
use stackflow_cloud::status::raw;
use stackflow_cloud::{
    ClientError, LifecycleClient, OperationResult, Payload, ProviderContext, ResourceHandle,
    ResourceKind, ResourceStatus, Result,
};
use std::collections::BTreeMap;

/// Region in which buckets are created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// Maximum number of keys per `delete-objects` call
const DELETE_BATCH: usize = 1000;

pub struct S3BucketClient {
    cli: AwsCli,
}

#[derive(Debug, Deserialize)]
struct PolicyOutput {
    #[serde(rename = "Policy")]
    policy: String,
}

#[derive(Debug, Default, Deserialize)]
struct TaggingOutput {
    #[serde(rename = "TagSet", default)]
    tag_set: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionListing {
    #[serde(default)]
    versions: Option<Vec<ObjectVersion>>,
    #[serde(default)]
    delete_markers: Option<Vec<ObjectVersion>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectVersion {
    key: String,
    version_id: Option<String>,
}

/// `delete-objects` reply; with `Quiet` only the failed keys are listed
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteOutput {
    #[serde(default)]
    errors: Option<Vec<DeleteError>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteError {
    key: String,
    version_id: Option<String>,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl DeleteOutput {
    /// First failed key, classified, or `None` when the whole batch went through
    fn failure(self, bucket: &str) -> Option<ClientError> {
        let errors = self.errors.unwrap_or_default();
        let first = errors.first()?;
        let version = first.version_id.as_deref().unwrap_or("null");
        let message = format!(
            "could not delete {} object version(s) from {}; {}?versionId={}: {} ({})",
            errors.len(),
            bucket,
            first.key,
            version,
            first.message,
            first.code
        );
        Some(classify(&first.code, &message))
    }
}

impl VersionListing {
    fn into_objects(self) -> Vec<ObjectVersion> {
        self.versions
            .unwrap_or_default()
            .into_iter()
            .chain(self.delete_markers.unwrap_or_default())
            .collect()
    }
}

/// `Ok(None)` for a missing sub-resource such as an absent bucket policy
fn optional<T>(result: crate::error::Result<T>) -> crate::error::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl S3BucketClient {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn create_bucket(
        &self,
        ctx: &ProviderContext,
        bucket: &str,
        region: Option<&str>,
        spec: &BucketSpec,
    ) -> Result<()> {
        let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
        let constraint;
        if let Some(region) = region.filter(|r| *r != DEFAULT_REGION) {
            constraint = format!("LocationConstraint={}", region);
            args.push("--create-bucket-configuration");
            args.push(&constraint);
        }

        match self.cli.run(ctx, region, &args).await {
            Ok(_) => tracing::info!("Created bucket: {}", bucket),
            // a bucket we already own is the idempotent case; anyone else's is a real conflict
            Err(e) if e.has_code("BucketAlreadyOwnedByYou") => {
                tracing::debug!("Bucket already exists: {}", bucket)
            }
            Err(e) => return Err(e.into()),
        }

        if spec.block_public_access {
            self.cli
                .run(
                    ctx,
                    region,
                    &[
                        "s3api",
                        "put-public-access-block",
                        "--bucket",
                        bucket,
                        "--public-access-block-configuration",
                        "BlockPublicAcls=true,IgnorePublicAcls=true,BlockPublicPolicy=true,RestrictPublicBuckets=true",
                    ],
                )
                .await?;
        }
        if spec.versioning {
            self.cli
                .run(
                    ctx,
                    region,
                    &[
                        "s3api",
                        "put-bucket-versioning",
                        "--bucket",
                        bucket,
                        "--versioning-configuration",
                        "Status=Enabled",
                    ],
                )
                .await?;
        }
        if spec.encryption {
            let encryption = json!({
                "Rules": [{"ApplyServerSideEncryptionByDefault": {"SSEAlgorithm": "AES256"}}]
            })
            .to_string();
            self.cli
                .run(
                    ctx,
                    region,
                    &[
                        "s3api",
                        "put-bucket-encryption",
                        "--bucket",
                        bucket,
                        "--server-side-encryption-configuration",
                        &encryption,
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn tags(
        &self,
        ctx: &ProviderContext,
        bucket: &str,
        region: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let tagging: Option<TaggingOutput> = optional(
            self.cli
                .json(ctx, region, &["s3api", "get-bucket-tagging", "--bucket", bucket])
                .await,
        )?;
        Ok(tagging
            .unwrap_or_default()
            .tag_set
            .into_iter()
            .map(|t| (t.key, t.value))
            .collect())
    }

    async fn sync(
        &self,
        ctx: &ProviderContext,
        bucket: &str,
        region: Option<&str>,
        spec: &SyncSpec,
    ) -> Result<()> {
        let source = spec.source.to_string_lossy().to_string();
        let target = format!("s3://{}", bucket);
        let mut args = vec!["s3", "sync", source.as_str(), target.as_str(), "--no-progress"];
        if spec.delete_removed {
            args.push("--delete");
        }
        for pattern in &spec.exclude {
            args.push("--exclude");
            args.push(pattern);
        }

        tracing::info!("Syncing {} to {}", source, target);
        self.cli.run(ctx, region, &args).await?;

        if let Some(revision) = &spec.revision {
            let mut tags = self.tags(ctx, bucket, region).await?;
            tags.insert(raw::REVISION_TAG.to_string(), revision.clone());
            let tagging = tagging_document(&tags);
            self.cli
                .run(
                    ctx,
                    region,
                    &["s3api", "put-bucket-tagging", "--bucket", bucket, "--tagging", &tagging],
                )
                .await?;
        }
        Ok(())
    }

    /// Delete every object version and delete marker
    async fn empty(&self, ctx: &ProviderContext, bucket: &str, region: Option<&str>) -> Result<()> {
        let batch = DELETE_BATCH.to_string();
        let mut deleted = 0usize;
        loop {
            let listing: Option<VersionListing> = self
                .cli
                .json(
                    ctx,
                    region,
                    &["s3api", "list-object-versions", "--bucket", bucket, "--max-items", &batch],
                )
                .await?;
            let objects = listing.unwrap_or_default().into_objects();
            if objects.is_empty() {
                break;
            }

            let document = delete_document(&objects);
            let output: Option<DeleteOutput> = self
                .cli
                .json(
                    ctx,
                    region,
                    &["s3api", "delete-objects", "--bucket", bucket, "--delete", &document],
                )
                .await?;
            // locked or denied versions would be listed again on the next pass
            if let Some(error) = output.unwrap_or_default().failure(bucket) {
                tracing::warn!("Emptying bucket {} stopped: {}", bucket, error);
                return Err(error);
            }
            deleted += objects.len();
            tracing::debug!("Deleted {} object version(s) from {}", deleted, bucket);
        }
        tracing::info!("Emptied bucket {} ({} object version(s))", bucket, deleted);
        Ok(())
    }
}

fn tagging_document(tags: &BTreeMap<String, String>) -> String {
    let tag_set: Vec<Value> = tags
        .iter()
        .map(|(k, v)| json!({"Key": k, "Value": v}))
        .collect();
    json!({ "TagSet": tag_set }).to_string()
}

fn delete_document(objects: &[ObjectVersion]) -> String {
    let objects: Vec<Value> = objects
        .iter()
        .map(|o| match &o.version_id {
            Some(version) => json!({"Key": o.key, "VersionId": version}),
            None => json!({"Key": o.key}),
        })
        .collect();
    json!({ "Objects": objects, "Quiet": true }).to_string()
}

#[async_trait]
impl LifecycleClient for S3BucketClient {
    fn name(&self) -> &str {
        "aws-s3"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Bucket
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let Payload::Bucket(spec) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot create a bucket from a {} payload",
                payload.name()
            )));
        };
        let region = spec.region.as_deref().or(handle.region());
        self.create_bucket(ctx, handle.name(), region, spec).await?;
        self.describe(ctx, handle).await
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let bucket = handle.name();
        let region = handle.region();

        self.cli
            .run(ctx, region, &["s3api", "head-bucket", "--bucket", bucket])
            .await?;

        let policy: Option<PolicyOutput> = optional(
            self.cli
                .json(ctx, region, &["s3api", "get-bucket-policy", "--bucket", bucket])
                .await,
        )?;
        let policy = match policy {
            Some(output) => serde_json::from_str::<Value>(&output.policy).map_err(AwsError::from)?,
            None => Value::Null,
        };
        let tags = self.tags(ctx, bucket, region).await?;
        let listing: Option<VersionListing> = self
            .cli
            .json(
                ctx,
                region,
                &["s3api", "list-object-versions", "--bucket", bucket, "--max-items", "1"],
            )
            .await?;
        let has_objects = !listing.unwrap_or_default().into_objects().is_empty();

        Ok(OperationResult::new(ResourceStatus::Ready)
            .with_id(bucket)
            .with_raw(json!({
                "arn": format!("arn:aws:s3:::{}", bucket),
                "policy": policy,
                "tags": tags,
                "has_objects": has_objects,
            })))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        _if_match: Option<&str>,
    ) -> Result<OperationResult> {
        let bucket = handle.name();
        let region = handle.region();

        match payload {
            Payload::BucketPolicy(policy) => {
                let document = policy.render(bucket).ok_or_else(|| {
                    ClientError::InvalidArgument(format!(
                        "bucket policy for {} references a distribution whose ARN is not known yet",
                        bucket
                    ))
                })?;
                let document = document.to_string();
                self.cli
                    .run(
                        ctx,
                        region,
                        &["s3api", "put-bucket-policy", "--bucket", bucket, "--policy", &document],
                    )
                    .await?;
                tracing::info!("Applied bucket policy: {}", bucket);
            }
            Payload::SyncObjects(spec) => self.sync(ctx, bucket, region, spec).await?,
            Payload::EmptyBucket => self.empty(ctx, bucket, region).await?,
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "cannot update a bucket with a {} payload",
                    other.name()
                )));
            }
        }
        self.describe(ctx, handle).await
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        self.cli
            .run(
                ctx,
                handle.region(),
                &["s3api", "delete-bucket", "--bucket", handle.name()],
            )
            .await?;
        tracing::info!("Deleted bucket: {}", handle.name());
        Ok(OperationResult::not_found())
    }
}
