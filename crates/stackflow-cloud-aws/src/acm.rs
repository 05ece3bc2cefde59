//! ACM certificate client

use crate::cli::AwsCli;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use stackflow_cloud::payload::CertificateSpec;
use stackflow_cloud::{
    ClientError, Clock, LifecycleClient, OperationResult, Payload, ProviderContext,
    ResourceHandle, ResourceKind, ResourceStatus, Result, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// ACM attaches the validation record shortly after the request; poll this long for it
const VALIDATION_RECORD_POLLS: u32 = 10;
const VALIDATION_RECORD_INTERVAL: Duration = Duration::from_secs(2);

pub fn certificate_status(status: &str) -> ResourceStatus {
    match status {
        "PENDING_VALIDATION" => ResourceStatus::Pending,
        "ISSUED" => ResourceStatus::Ready,
        "FAILED" | "VALIDATION_TIMED_OUT" | "REVOKED" | "EXPIRED" | "INACTIVE" => {
            ResourceStatus::Failed
        }
        other => {
            tracing::warn!("Unknown certificate status: {}", other);
            ResourceStatus::InProgress
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeOutput {
    certificate: Certificate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Certificate {
    certificate_arn: String,
    domain_name: String,
    status: String,
    #[serde(default)]
    domain_validation_options: Vec<DomainValidation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainValidation {
    domain_name: String,
    #[serde(default)]
    resource_record: Option<ValidationRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidationRecord {
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    value: String,
}

impl ValidationRecord {
    fn to_json(&self) -> Value {
        json!({"name": self.name, "type": self.record_type, "value": self.value})
    }
}

impl Certificate {
    fn into_result(self) -> OperationResult {
        let records: Vec<Value> = self
            .domain_validation_options
            .iter()
            .filter_map(|o| {
                o.resource_record.as_ref().map(|r| {
                    let mut record = r.to_json();
                    record["domain"] = Value::String(o.domain_name.clone());
                    record
                })
            })
            .collect();

        OperationResult::new(certificate_status(&self.status))
            .with_id(&self.certificate_arn)
            .with_raw(json!({
                "arn": self.certificate_arn,
                "domain": self.domain_name,
                "status": self.status,
                "validation_record": records.first().cloned().unwrap_or(Value::Null),
                "validation_records": records,
            }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListOutput {
    #[serde(default)]
    certificate_summary_list: Vec<CertificateSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CertificateSummary {
    certificate_arn: String,
    domain_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestOutput {
    certificate_arn: String,
}

/// Idempotency token: ACM accepts at most 32 word characters
pub fn idempotency_token(domain: &str) -> String {
    domain
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(32)
        .collect()
}

pub struct CertificateClient {
    cli: AwsCli,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl CertificateClient {
    pub fn new(cli: AwsCli) -> Self {
        Self {
            cli,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Stop waiting for the validation record once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Re-describe a pending certificate until ACM attaches its validation record
    async fn await_validation_record(
        &self,
        ctx: &ProviderContext,
        region: Option<&str>,
        arn: &str,
        mut result: OperationResult,
    ) -> Result<OperationResult> {
        for _ in 0..VALIDATION_RECORD_POLLS {
            if result.status != ResourceStatus::Pending
                || result.raw_value("validation_record").is_some()
            {
                break;
            }
            tracing::debug!("Waiting for the validation record of {}", arn);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::warn!("Stopped waiting for the validation record of {}", arn);
                    break;
                }
                _ = self.clock.sleep(VALIDATION_RECORD_INTERVAL) => {}
            }
            result = self.describe_arn(ctx, region, arn).await?;
        }
        Ok(result)
    }

    /// ARN of a pending or issued certificate for `domain`
    async fn find(
        &self,
        ctx: &ProviderContext,
        region: Option<&str>,
        domain: &str,
    ) -> Result<Option<String>> {
        let output: Option<ListOutput> = self
            .cli
            .json(
                ctx,
                region,
                &[
                    "acm",
                    "list-certificates",
                    "--certificate-statuses",
                    "PENDING_VALIDATION",
                    "ISSUED",
                ],
            )
            .await?;
        Ok(output
            .unwrap_or_default()
            .certificate_summary_list
            .into_iter()
            .find(|c| c.domain_name.eq_ignore_ascii_case(domain))
            .map(|c| c.certificate_arn))
    }

    async fn resolve_arn(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<String> {
        if let Some(arn) = handle.id() {
            return Ok(arn.to_string());
        }
        self.find(ctx, handle.region(), handle.name())
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("no certificate for '{}'", handle.name())))
    }

    async fn describe_arn(
        &self,
        ctx: &ProviderContext,
        region: Option<&str>,
        arn: &str,
    ) -> Result<OperationResult> {
        let output: DescribeOutput = self
            .cli
            .json(
                ctx,
                region,
                &["acm", "describe-certificate", "--certificate-arn", arn],
            )
            .await?;
        Ok(output.certificate.into_result())
    }

    async fn request(
        &self,
        ctx: &ProviderContext,
        region: Option<&str>,
        spec: &CertificateSpec,
    ) -> Result<String> {
        let token = idempotency_token(&spec.domain);
        let mut args = vec![
            "acm",
            "request-certificate",
            "--domain-name",
            spec.domain.as_str(),
            "--validation-method",
            "DNS",
            "--idempotency-token",
            token.as_str(),
        ];
        if !spec.subject_alternative_names.is_empty() {
            args.push("--subject-alternative-names");
            args.extend(spec.subject_alternative_names.iter().map(String::as_str));
        }

        let output: RequestOutput = self.cli.json(ctx, region, &args).await?;
        tracing::info!(
            "Requested certificate for {}: {}",
            spec.domain,
            output.certificate_arn
        );
        Ok(output.certificate_arn)
    }
}

#[async_trait]
impl LifecycleClient for CertificateClient {
    fn name(&self) -> &str {
        "aws-acm"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Certificate
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        let Payload::Certificate(spec) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot request a certificate from a {} payload",
                payload.name()
            )));
        };
        let region = handle.region();

        let arn = match self.find(ctx, region, &spec.domain).await? {
            Some(arn) => {
                tracing::debug!("Certificate already requested: {} ({})", spec.domain, arn);
                arn
            }
            None => self.request(ctx, region, spec).await?,
        };

        let result = self.describe_arn(ctx, region, &arn).await?;
        self.await_validation_record(ctx, region, &arn, result).await
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let arn = self.resolve_arn(ctx, handle).await?;
        self.describe_arn(ctx, handle.region(), &arn).await
    }

    async fn update(
        &self,
        _ctx: &ProviderContext,
        handle: &ResourceHandle,
        _payload: &Payload,
        _if_match: Option<&str>,
    ) -> Result<OperationResult> {
        Err(ClientError::InvalidArgument(format!(
            "certificate for '{}' cannot be updated; request a new one",
            handle.name()
        )))
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        let arn = self.resolve_arn(ctx, handle).await?;
        self.cli
            .run(
                ctx,
                handle.region(),
                &["acm", "delete-certificate", "--certificate-arn", &arn],
            )
            .await?;
        tracing::info!("Deleted certificate: {}", arn);
        Ok(OperationResult::not_found())
    }
}
