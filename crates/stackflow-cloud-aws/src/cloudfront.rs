//! CloudFront distribution, origin access control and invalidation clients
//!
//! Distributions and origin access controls are found by their logical
//! name (the distribution `Comment`, the OAC `Name`) when the handle has no
//! provider id yet, so re-running a plan never creates a second copy.
//! Invalidations are found by their `CallerReference`.

use crate::cli::AwsCli;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use stackflow_cloud::payload::{DistributionSpec, InvalidationSpec, OacSpec};
use stackflow_cloud::{
    ClientError, LifecycleClient, OperationResult, Payload, ProviderContext, ResourceHandle,
    ResourceKind, ResourceStatus, Result,
};

/// Managed cache policy "CachingOptimized"
const CACHING_OPTIMIZED: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

const ORIGIN_ID: &str = "s3-origin";

/// How many recent invalidations are searched for a caller reference
const INVALIDATION_LOOKBACK: &str = "25";

/// Normalize a distribution status and its enabled flag
pub fn distribution_status(status: &str, enabled: bool) -> ResourceStatus {
    match (status, enabled) {
        ("Deployed", true) => ResourceStatus::Ready,
        ("Deployed", false) => ResourceStatus::Disabled,
        ("InProgress", _) => ResourceStatus::InProgress,
        (other, _) => {
            tracing::warn!("Unknown distribution status: {}", other);
            ResourceStatus::InProgress
        }
    }
}

pub fn invalidation_status(status: &str) -> ResourceStatus {
    match status {
        "Completed" => ResourceStatus::Ready,
        _ => ResourceStatus::InProgress,
    }
}

// ============================================================================
// Distribution
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionOutput {
    distribution: Distribution,
    #[serde(rename = "ETag")]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Distribution {
    id: String,
    #[serde(rename = "ARN")]
    arn: String,
    status: String,
    domain_name: String,
    distribution_config: Value,
}

impl Distribution {
    fn enabled(&self) -> bool {
        self.distribution_config
            .get("Enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn into_result(self, etag: Option<String>) -> OperationResult {
        let enabled = self.enabled();
        let mut result = OperationResult::new(distribution_status(&self.status, enabled))
            .with_id(&self.id)
            .with_raw(json!({
                "arn": self.arn,
                "enabled": enabled,
                "domain_name": self.domain_name,
                "status": self.status,
            }));
        if let Some(etag) = etag {
            result = result.with_version(etag);
        }
        result
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionConfigOutput {
    #[serde(rename = "ETag")]
    etag: String,
    distribution_config: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionListOutput {
    distribution_list: Option<SummaryList<DistributionSummary>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SummaryList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionSummary {
    id: String,
    #[serde(default)]
    comment: String,
}

/// Build the `DistributionConfig` for a private-bucket origin
pub fn distribution_config(name: &str, spec: &DistributionSpec) -> Result<Value> {
    let oac_id = match &spec.origin_access_control {
        Some(oac) => match &oac.id {
            Some(id) => id.clone(),
            None => {
                return Err(ClientError::InvalidArgument(format!(
                    "origin access control '{}' has not been created yet",
                    oac.name
                )));
            }
        },
        None => String::new(),
    };
    let origin_domain = match &spec.origin_region {
        Some(region) => format!("{}.s3.{}.amazonaws.com", spec.origin_bucket, region),
        None => format!("{}.s3.amazonaws.com", spec.origin_bucket),
    };

    let viewer_certificate = match &spec.certificate_arn {
        Some(arn) => json!({
            "ACMCertificateArn": arn,
            "SSLSupportMethod": "sni-only",
            "MinimumProtocolVersion": "TLSv1.2_2021",
        }),
        None => json!({ "CloudFrontDefaultCertificate": true }),
    };

    let error_responses: Vec<Value> = if spec.spa_fallback {
        [403, 404]
            .iter()
            .map(|code| {
                json!({
                    "ErrorCode": code,
                    "ResponsePagePath": format!("/{}", spec.default_root_object),
                    "ResponseCode": "200",
                    "ErrorCachingMinTTL": 10,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(json!({
        "CallerReference": name,
        "Comment": name,
        "Enabled": true,
        "DefaultRootObject": spec.default_root_object,
        "PriceClass": spec.price_class,
        "HttpVersion": "http2",
        "IsIPV6Enabled": true,
        "Aliases": {
            "Quantity": spec.aliases.len(),
            "Items": spec.aliases,
        },
        "Origins": {
            "Quantity": 1,
            "Items": [{
                "Id": ORIGIN_ID,
                "DomainName": origin_domain,
                "S3OriginConfig": { "OriginAccessIdentity": "" },
                "OriginAccessControlId": oac_id,
            }],
        },
        "DefaultCacheBehavior": {
            "TargetOriginId": ORIGIN_ID,
            "ViewerProtocolPolicy": "redirect-to-https",
            "CachePolicyId": CACHING_OPTIMIZED,
            "Compress": true,
            "AllowedMethods": {
                "Quantity": 2,
                "Items": ["GET", "HEAD"],
                "CachedMethods": { "Quantity": 2, "Items": ["GET", "HEAD"] },
            },
        },
        "CustomErrorResponses": {
            "Quantity": error_responses.len(),
            "Items": error_responses,
        },
        "ViewerCertificate": viewer_certificate,
    }))
}

pub struct DistributionClient {
    cli: AwsCli,
}

impl DistributionClient {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    /// Provider id of the distribution whose comment is `name`
    async fn find(&self, ctx: &ProviderContext, name: &str) -> Result<Option<String>> {
        let output: Option<DistributionListOutput> = self
            .cli
            .json(ctx, None, &["cloudfront", "list-distributions"])
            .await?;
        Ok(output
            .and_then(|o| o.distribution_list)
            .map(|list| list.items)
            .unwrap_or_default()
            .into_iter()
            .find(|d| d.comment == name)
            .map(|d| d.id))
    }

    async fn resolve_id(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<String> {
        if let Some(id) = handle.id() {
            return Ok(id.to_string());
        }
        self.find(ctx, handle.name())
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("no distribution named '{}'", handle.name())))
    }

    async fn config(&self, ctx: &ProviderContext, id: &str) -> Result<DistributionConfigOutput> {
        Ok(self
            .cli
            .json(ctx, None, &["cloudfront", "get-distribution-config", "--id", id])
            .await?)
    }
}

#[async_trait]
impl LifecycleClient for DistributionClient {
    fn name(&self) -> &str {
        "aws-cloudfront"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Distribution
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let Payload::Distribution(spec) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot create a distribution from a {} payload",
                payload.name()
            )));
        };

        if let Some(id) = self.find(ctx, handle.name()).await? {
            tracing::debug!("Distribution already exists: {} ({})", handle.name(), id);
            return self.describe(ctx, &handle.clone().with_id(id)).await;
        }

        let config = distribution_config(handle.name(), spec)?.to_string();
        let output: DistributionOutput = self
            .cli
            .json(
                ctx,
                None,
                &["cloudfront", "create-distribution", "--distribution-config", &config],
            )
            .await?;

        tracing::info!(
            "Created distribution: {} ({})",
            handle.name(),
            output.distribution.id
        );
        Ok(output.distribution.into_result(output.etag))
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let id = self.resolve_id(ctx, handle).await?;
        let output: DistributionOutput = self
            .cli
            .json(ctx, None, &["cloudfront", "get-distribution", "--id", &id])
            .await?;
        Ok(output.distribution.into_result(output.etag))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        if_match: Option<&str>,
    ) -> Result<OperationResult> {
        let Payload::DistributionEnabled(enabled) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot update a distribution with a {} payload",
                payload.name()
            )));
        };

        let id = self.resolve_id(ctx, handle).await?;
        let DistributionConfigOutput {
            etag,
            mut distribution_config,
        } = self.config(ctx, &id).await?;

        if let Some(expected) = if_match
            && expected != etag
        {
            return Err(ClientError::Conflict {
                expected_version: Some(etag),
                message: format!(
                    "distribution {} changed since it was read (had {})",
                    id, expected
                ),
            });
        }

        distribution_config["Enabled"] = Value::Bool(*enabled);
        let config = distribution_config.to_string();
        let output: DistributionOutput = self
            .cli
            .json(
                ctx,
                None,
                &[
                    "cloudfront",
                    "update-distribution",
                    "--id",
                    &id,
                    "--if-match",
                    &etag,
                    "--distribution-config",
                    &config,
                ],
            )
            .await?;

        tracing::info!(
            "{} distribution: {}",
            if *enabled { "Enabled" } else { "Disabled" },
            id
        );
        Ok(output.distribution.into_result(output.etag))
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        let id = self.resolve_id(ctx, handle).await?;
        let DistributionConfigOutput { etag, .. } = self.config(ctx, &id).await?;
        self.cli
            .run(
                ctx,
                None,
                &["cloudfront", "delete-distribution", "--id", &id, "--if-match", &etag],
            )
            .await?;
        tracing::info!("Deleted distribution: {}", id);
        Ok(OperationResult::not_found())
    }
}

// ============================================================================
// Origin access control
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OacOutput {
    origin_access_control: OriginAccessControl,
    #[serde(rename = "ETag")]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OriginAccessControl {
    id: String,
    origin_access_control_config: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OacListOutput {
    origin_access_control_list: Option<SummaryList<OacSummary>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OacSummary {
    id: String,
    name: String,
}

pub fn oac_config(name: &str, spec: &OacSpec) -> Value {
    json!({
        "Name": name,
        "Description": spec.description,
        "SigningProtocol": "sigv4",
        "SigningBehavior": "always",
        "OriginAccessControlOriginType": "s3",
    })
}

pub struct OriginAccessControlClient {
    cli: AwsCli,
}

impl OriginAccessControlClient {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn find(&self, ctx: &ProviderContext, name: &str) -> Result<Option<String>> {
        let output: Option<OacListOutput> = self
            .cli
            .json(ctx, None, &["cloudfront", "list-origin-access-controls"])
            .await?;
        Ok(output
            .and_then(|o| o.origin_access_control_list)
            .map(|list| list.items)
            .unwrap_or_default()
            .into_iter()
            .find(|o| o.name == name)
            .map(|o| o.id))
    }

    async fn resolve_id(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<String> {
        if let Some(id) = handle.id() {
            return Ok(id.to_string());
        }
        self.find(ctx, handle.name()).await?.ok_or_else(|| {
            ClientError::NotFound(format!("no origin access control named '{}'", handle.name()))
        })
    }

    async fn get(&self, ctx: &ProviderContext, id: &str) -> Result<OacOutput> {
        Ok(self
            .cli
            .json(ctx, None, &["cloudfront", "get-origin-access-control", "--id", id])
            .await?)
    }
}

fn oac_result(output: OacOutput) -> OperationResult {
    let mut result = OperationResult::new(ResourceStatus::Ready)
        .with_id(&output.origin_access_control.id)
        .with_raw(output.origin_access_control.origin_access_control_config);
    if let Some(etag) = output.etag {
        result = result.with_version(etag);
    }
    result
}

#[async_trait]
impl LifecycleClient for OriginAccessControlClient {
    fn name(&self) -> &str {
        "aws-cloudfront-oac"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::OriginAccessControl
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let Payload::OriginAccessControl(spec) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot create an origin access control from a {} payload",
                payload.name()
            )));
        };

        if let Some(id) = self.find(ctx, handle.name()).await? {
            tracing::debug!("Origin access control already exists: {} ({})", handle.name(), id);
            return Ok(oac_result(self.get(ctx, &id).await?));
        }

        let config = oac_config(handle.name(), spec).to_string();
        let output: OacOutput = self
            .cli
            .json(
                ctx,
                None,
                &[
                    "cloudfront",
                    "create-origin-access-control",
                    "--origin-access-control-config",
                    &config,
                ],
            )
            .await?;
        tracing::info!(
            "Created origin access control: {} ({})",
            handle.name(),
            output.origin_access_control.id
        );
        Ok(oac_result(output))
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let id = self.resolve_id(ctx, handle).await?;
        Ok(oac_result(self.get(ctx, &id).await?))
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        _handle: &ResourceHandle,
        payload: &Payload,
        _if_match: Option<&str>,
    ) -> Result<OperationResult> {
        Err(ClientError::InvalidArgument(format!(
            "origin access controls are not updated in place ({} payload)",
            payload.name()
        )))
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        let id = self.resolve_id(ctx, handle).await?;
        let etag = self.get(ctx, &id).await?.etag.unwrap_or_default();
        self.cli
            .run(
                ctx,
                None,
                &["cloudfront", "delete-origin-access-control", "--id", &id, "--if-match", &etag],
            )
            .await?;
        tracing::info!("Deleted origin access control: {}", id);
        Ok(OperationResult::not_found())
    }
}

// ============================================================================
// Invalidation
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvalidationOutput {
    invalidation: Invalidation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Invalidation {
    id: String,
    status: String,
    #[serde(default)]
    invalidation_batch: Option<InvalidationBatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvalidationBatch {
    caller_reference: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvalidationListOutput {
    invalidation_list: Option<SummaryList<InvalidationSummary>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvalidationSummary {
    id: String,
}

impl Invalidation {
    fn into_result(self) -> OperationResult {
        OperationResult::new(invalidation_status(&self.status))
            .with_id(&self.id)
            .with_raw(json!({ "status": self.status }))
    }
}

pub fn invalidation_batch(caller_reference: &str, spec: &InvalidationSpec) -> Value {
    json!({
        "Paths": { "Quantity": spec.paths.len(), "Items": spec.paths },
        "CallerReference": caller_reference,
    })
}

pub struct InvalidationClient {
    cli: AwsCli,
}

impl InvalidationClient {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn get(
        &self,
        ctx: &ProviderContext,
        distribution_id: &str,
        id: &str,
    ) -> Result<Invalidation> {
        let output: InvalidationOutput = self
            .cli
            .json(
                ctx,
                None,
                &[
                    "cloudfront",
                    "get-invalidation",
                    "--distribution-id",
                    distribution_id,
                    "--id",
                    id,
                ],
            )
            .await?;
        Ok(output.invalidation)
    }

    /// Most recent invalidation whose caller reference is `name`
    async fn find(
        &self,
        ctx: &ProviderContext,
        distribution_id: &str,
        name: &str,
    ) -> Result<Option<Invalidation>> {
        let output: Option<InvalidationListOutput> = self
            .cli
            .json(
                ctx,
                None,
                &[
                    "cloudfront",
                    "list-invalidations",
                    "--distribution-id",
                    distribution_id,
                    "--max-items",
                    INVALIDATION_LOOKBACK,
                ],
            )
            .await?;
        let summaries = output
            .and_then(|o| o.invalidation_list)
            .map(|list| list.items)
            .unwrap_or_default();

        for summary in summaries {
            let invalidation = self.get(ctx, distribution_id, &summary.id).await?;
            let matches = invalidation
                .invalidation_batch
                .as_ref()
                .is_some_and(|b| b.caller_reference == name);
            if matches {
                return Ok(Some(invalidation));
            }
        }
        Ok(None)
    }
}

fn distribution_id(handle: &ResourceHandle, payload: Option<&InvalidationSpec>) -> Result<String> {
    payload
        .and_then(|spec| spec.distribution.id.clone())
        .or_else(|| handle.parent_id().map(str::to_string))
        .ok_or_else(|| {
            ClientError::InvalidArgument(format!(
                "invalidation '{}' is not bound to a distribution",
                handle.name()
            ))
        })
}

#[async_trait]
impl LifecycleClient for InvalidationClient {
    fn name(&self) -> &str {
        "aws-cloudfront-invalidation"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Invalidation
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let Payload::Invalidation(spec) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot create an invalidation from a {} payload",
                payload.name()
            )));
        };
        let distribution = distribution_id(handle, Some(spec))?;

        // the same caller reference and batch returns the existing invalidation
        let batch = invalidation_batch(handle.name(), spec).to_string();
        let output: InvalidationOutput = self
            .cli
            .json(
                ctx,
                None,
                &[
                    "cloudfront",
                    "create-invalidation",
                    "--distribution-id",
                    &distribution,
                    "--invalidation-batch",
                    &batch,
                ],
            )
            .await?;
        tracing::info!(
            "Created invalidation {} on {} ({})",
            handle.name(),
            distribution,
            output.invalidation.id
        );
        Ok(output.invalidation.into_result())
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let distribution = distribution_id(handle, None)?;
        let invalidation = match handle.id() {
            Some(id) => self.get(ctx, &distribution, id).await?,
            None => self
                .find(ctx, &distribution, handle.name())
                .await?
                .ok_or_else(|| {
                    ClientError::NotFound(format!("no invalidation named '{}'", handle.name()))
                })?,
        };
        Ok(invalidation.into_result())
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
        _payload: &Payload,
        _if_match: Option<&str>,
    ) -> Result<OperationResult> {
        Err(ClientError::InvalidArgument(format!(
            "invalidation '{}' cannot be updated",
            handle.name()
        )))
    }

    async fn delete(&self, _ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        Err(ClientError::InvalidArgument(format!(
            "invalidation '{}' cannot be deleted",
            handle.name()
        )))
    }
}
