//! DynamoDB table client

use crate::cli::AwsCli;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stackflow_cloud::payload::TableSpec;
use stackflow_cloud::{
    ClientError, LifecycleClient, OperationResult, Payload, ProviderContext, ResourceHandle,
    ResourceKind, ResourceStatus, Result,
};

pub fn table_status(status: &str) -> ResourceStatus {
    match status {
        "CREATING" | "UPDATING" | "DELETING" => ResourceStatus::InProgress,
        "ACTIVE" => ResourceStatus::Ready,
        "INACCESSIBLE_ENCRYPTION_CREDENTIALS" | "ARCHIVED" => ResourceStatus::Failed,
        other => {
            tracing::warn!("Unknown table status: {}", other);
            ResourceStatus::InProgress
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeOutput {
    table: TableDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateOutput {
    table_description: TableDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TableDescription {
    table_name: String,
    table_status: String,
    #[serde(default)]
    table_arn: Option<String>,
}

impl TableDescription {
    fn into_result(self) -> OperationResult {
        OperationResult::new(table_status(&self.table_status))
            .with_id(&self.table_name)
            .with_raw(json!({"arn": self.table_arn, "status": self.table_status}))
    }
}

/// `create-table` arguments for a single string hash key
pub fn create_table_args<'a>(
    name: &'a str,
    spec: &'a TableSpec,
    attributes: &'a str,
    key_schema: &'a str,
) -> Vec<&'a str> {
    let mut args = vec![
        "dynamodb",
        "create-table",
        "--table-name",
        name,
        "--attribute-definitions",
        attributes,
        "--key-schema",
        key_schema,
        "--billing-mode",
        spec.billing_mode.as_str(),
    ];
    if spec.billing_mode == "PROVISIONED" {
        args.push("--provisioned-throughput");
        args.push("ReadCapacityUnits=5,WriteCapacityUnits=5");
    }
    args
}

pub struct TableClient {
    cli: AwsCli,
}

impl TableClient {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl LifecycleClient for TableClient {
    fn name(&self) -> &str {
        "aws-dynamodb"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Table
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let Payload::Table(spec) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot create a table from a {} payload",
                payload.name()
            )));
        };

        let attributes = format!("AttributeName={},AttributeType=S", spec.hash_key);
        let key_schema = format!("AttributeName={},KeyType=HASH", spec.hash_key);
        let args = create_table_args(handle.name(), spec, &attributes, &key_schema);

        let created: crate::error::Result<CreateOutput> =
            self.cli.json(ctx, handle.region(), &args).await;
        match created {
            Ok(output) => {
                tracing::info!("Created table: {}", handle.name());
                Ok(output.table_description.into_result())
            }
            // ResourceInUseException on create means the table already exists
            Err(e) if e.has_code("ResourceInUseException") => {
                tracing::debug!("Table already exists: {}", handle.name());
                self.describe(ctx, handle).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let output: DescribeOutput = self
            .cli
            .json(
                ctx,
                handle.region(),
                &["dynamodb", "describe-table", "--table-name", handle.name()],
            )
            .await?;
        Ok(output.table.into_result())
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        _if_match: Option<&str>,
    ) -> Result<OperationResult> {
        Err(ClientError::InvalidArgument(format!(
            "table '{}' cannot be updated with a {} payload",
            handle.name(),
            payload.name()
        )))
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        let output: CreateOutput = self
            .cli
            .json(
                ctx,
                handle.region(),
                &["dynamodb", "delete-table", "--table-name", handle.name()],
            )
            .await?;
        tracing::info!("Deleting table: {}", handle.name());
        Ok(output.table_description.into_result())
    }
}
