//! Lifecycle client trait definition

use crate::context::ProviderContext;
use crate::error::{ClientError, Result};
use crate::handle::{ResourceHandle, ResourceKind};
use crate::payload::Payload;
use crate::status::OperationResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Capability interface a concrete cloud integration implements.
///
/// All four operations must be safe to repeat:
///
/// - `create` on an existing, equivalent resource returns its current
///   result (`Ready`/`InProgress`) instead of an error.
/// - `describe` has no side effects and reports a missing resource as
///   [`ClientError::NotFound`].
/// - `update` takes the optimistic-concurrency token last observed and
///   reports a stale one as [`ClientError::Conflict`].
/// - `delete` may report a missing resource as `NotFound`; callers treat
///   that as success. A resource still referenced by another is `InUse`.
#[async_trait]
pub trait LifecycleClient: Send + Sync {
    /// Returns the client name (e.g., "aws-s3", "aws-cloudfront")
    fn name(&self) -> &str;

    /// Whether this client manages resources of `kind`
    fn supports(&self, kind: ResourceKind) -> bool;

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult>;

    async fn describe(&self, ctx: &ProviderContext, handle: &ResourceHandle)
    -> Result<OperationResult>;

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        if_match: Option<&str>,
    ) -> Result<OperationResult>;

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle)
    -> Result<OperationResult>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Dispatches each call to the first registered client supporting the handle's kind
#[derive(Clone, Default)]
pub struct ProviderRouter {
    clients: Vec<Arc<dyn LifecycleClient>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<dyn LifecycleClient>) -> Self {
        self.clients.push(client);
        self
    }

    pub fn register(&mut self, client: Arc<dyn LifecycleClient>) {
        self.clients.push(client);
    }

    fn route(&self, kind: ResourceKind) -> Result<&Arc<dyn LifecycleClient>> {
        self.clients
            .iter()
            .find(|c| c.supports(kind))
            .ok_or_else(|| ClientError::InvalidArgument(format!("no client registered for {}", kind)))
    }
}

#[async_trait]
impl LifecycleClient for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        self.clients.iter().any(|c| c.supports(kind))
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        self.route(handle.kind())?.create(ctx, handle, payload).await
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        self.route(handle.kind())?.describe(ctx, handle).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        if_match: Option<&str>,
    ) -> Result<OperationResult> {
        self.route(handle.kind())?
            .update(ctx, handle, payload, if_match)
            .await
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        self.route(handle.kind())?.delete(ctx, handle).await
    }
}
