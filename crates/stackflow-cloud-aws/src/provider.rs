//! AWS provider: one entry point dispatching to the per-service clients

use crate::acm::CertificateClient;
use crate::cli::AwsCli;
use crate::cloudfront::{DistributionClient, InvalidationClient, OriginAccessControlClient};
use crate::dynamodb::TableClient;
use crate::route53::Route53RecordClient;
use crate::s3::S3BucketClient;
use async_trait::async_trait;
use serde::Deserialize;
use stackflow_cloud::{
    AuthStatus, Clock, LifecycleClient, OperationResult, Payload, ProviderContext, ProviderRouter,
    ResourceHandle, ResourceKind, Result, SystemClock,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
    arn: String,
}

/// AWS provider
pub struct AwsProvider {
    cli: AwsCli,
    router: ProviderRouter,
}

impl Default for AwsProvider {
    fn default() -> Self {
        Self::new(AwsCli::new())
    }
}

impl AwsProvider {
    pub fn new(cli: AwsCli) -> Self {
        Self::with_control(cli, Arc::new(SystemClock), CancellationToken::new())
    }

    /// Waits inside a client call sleep on `clock` and end when `cancel` fires
    pub fn with_control(cli: AwsCli, clock: Arc<dyn Clock>, cancel: CancellationToken) -> Self {
        let certificates = CertificateClient::new(cli.clone())
            .with_clock(clock)
            .with_cancellation(cancel);
        let router = ProviderRouter::new()
            .with_client(Arc::new(S3BucketClient::new(cli.clone())))
            .with_client(Arc::new(DistributionClient::new(cli.clone())))
            .with_client(Arc::new(OriginAccessControlClient::new(cli.clone())))
            .with_client(Arc::new(InvalidationClient::new(cli.clone())))
            .with_client(Arc::new(certificates))
            .with_client(Arc::new(TableClient::new(cli.clone())))
            .with_client(Arc::new(Route53RecordClient::new(cli.clone())));
        Self { cli, router }
    }

    pub fn cli(&self) -> &AwsCli {
        &self.cli
    }

    /// Check that the aws CLI is installed and the context resolves to an identity
    pub async fn check_auth(&self, ctx: &ProviderContext) -> AuthStatus {
        let identity: crate::error::Result<CallerIdentity> = self
            .cli
            .json(ctx, None, &["sts", "get-caller-identity"])
            .await;
        match identity {
            Ok(identity) => {
                tracing::debug!("Authenticated as {} ({})", identity.arn, identity.account);
                AuthStatus::ok(format!("{} (account {})", identity.arn, identity.account))
            }
            Err(e) => AuthStatus::failed(e.to_string()),
        }
    }
}

#[async_trait]
impl LifecycleClient for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        self.router.supports(kind)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        self.router.create(ctx, handle, payload).await
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        self.router.describe(ctx, handle).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        if_match: Option<&str>,
    ) -> Result<OperationResult> {
        self.router.update(ctx, handle, payload, if_match).await
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        self.router.delete(ctx, handle).await
    }
}
