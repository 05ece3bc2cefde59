//! Route 53 record client and zone adapter
//!
//! Route 53 stores one record *set* per `(name, type)` holding every value.
//! [`Route53Zone`] flattens sets into one [`DnsRecord`] per value for the
//! reconciler and rewrites the whole set on every change. Route 53 records
//! carry no comment, so none of them is ever considered managed.

use crate::cli::AwsCli;
use crate::error::AwsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stackflow_cloud::dns::{DnsRecord, ZoneClient};
use stackflow_cloud::{
    ClientError, LifecycleClient, OperationResult, Payload, ProviderContext, ResourceHandle,
    ResourceKind, ResourceStatus, Result,
};

/// Handle context key: hosted zone id of a record
pub const ZONE_ID: &str = "zone_id";

/// Handle context key: record type (A, CNAME, TXT, ...)
pub const RECORD_TYPE: &str = "record_type";

const DEFAULT_TTL: u32 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordSet {
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "TTL", default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub resource_records: Vec<RecordValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_target: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordValue {
    pub value: String,
}

impl RecordSet {
    fn new(name: &str, record_type: &str, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            record_type: record_type.to_string(),
            ttl: Some(ttl),
            resource_records: Vec::new(),
            alias_target: None,
        }
    }

    fn matches(&self, name: &str, record_type: &str) -> bool {
        let other = DnsRecord::new(name, record_type, "");
        DnsRecord::new(&self.name, &self.record_type, "").key() == other.key()
    }

    fn values(&self) -> Vec<&str> {
        self.resource_records.iter().map(|r| r.value.as_str()).collect()
    }

    fn position(&self, record: &DnsRecord) -> Option<usize> {
        let wanted = record.normalized_content();
        self.resource_records.iter().position(|r| {
            DnsRecord::new(&self.name, &self.record_type, &r.value).normalized_content() == wanted
        })
    }

    fn records(&self) -> Vec<DnsRecord> {
        let name = from_route53_name(&self.name);
        self.resource_records
            .iter()
            .map(|r| {
                let record = DnsRecord::new(&name, &self.record_type, &r.value);
                match self.ttl {
                    Some(ttl) => record.with_ttl(ttl),
                    None => record,
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListRecordSetsOutput {
    #[serde(default)]
    resource_record_sets: Vec<RecordSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeOutput {
    change_info: ChangeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeInfo {
    id: String,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostedZonesOutput {
    #[serde(default)]
    hosted_zones: Vec<HostedZone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostedZone {
    id: String,
    name: String,
}

/// Record name as listed: trailing dot trimmed, `\052` unescaped to `*`
pub fn from_route53_name(name: &str) -> String {
    name.trim_end_matches('.').replace("\\052", "*")
}

/// Route 53 requires TXT and SPF values to be quoted
pub fn to_route53_value(record_type: &str, content: &str) -> String {
    let quoted = matches!(record_type.to_ascii_uppercase().as_str(), "TXT" | "SPF");
    if quoted && !content.starts_with('"') {
        format!("\"{}\"", content.replace('"', "\\\""))
    } else {
        content.to_string()
    }
}

/// `InvalidChangeBatch` covers both "already exists" and "not found"
fn classify_change_error(err: AwsError) -> ClientError {
    let message = err.to_string();
    if err.has_code("InvalidChangeBatch") {
        if message.contains("already exists") {
            return ClientError::AlreadyExists(message);
        }
        if message.contains("it was not found") {
            return ClientError::NotFound(message);
        }
    }
    err.into()
}

pub fn change_batch(action: &str, set: &RecordSet) -> String {
    json!({
        "Comment": "stackflow",
        "Changes": [{ "Action": action, "ResourceRecordSet": set }],
    })
    .to_string()
}

/// Record sets of one hosted zone
#[derive(Debug, Clone)]
struct HostedZoneApi {
    cli: AwsCli,
    zone_id: String,
}

impl HostedZoneApi {
    async fn record_sets(&self, ctx: &ProviderContext) -> Result<Vec<RecordSet>> {
        let output: Option<ListRecordSetsOutput> = self
            .cli
            .json(
                ctx,
                None,
                &["route53", "list-resource-record-sets", "--hosted-zone-id", &self.zone_id],
            )
            .await?;
        Ok(output.unwrap_or_default().resource_record_sets)
    }

    async fn record_set(
        &self,
        ctx: &ProviderContext,
        name: &str,
        record_type: &str,
    ) -> Result<Option<RecordSet>> {
        Ok(self
            .record_sets(ctx)
            .await?
            .into_iter()
            .find(|s| s.matches(name, record_type)))
    }

    async fn change(&self, ctx: &ProviderContext, action: &str, set: &RecordSet) -> Result<ChangeInfo> {
        let batch = change_batch(action, set);
        let output: ChangeOutput = self
            .cli
            .json(
                ctx,
                None,
                &[
                    "route53",
                    "change-resource-record-sets",
                    "--hosted-zone-id",
                    &self.zone_id,
                    "--change-batch",
                    &batch,
                ],
            )
            .await
            .map_err(classify_change_error)?;
        tracing::info!(
            "{} {} {} in {} ({})",
            action,
            set.name,
            set.record_type,
            self.zone_id,
            output.change_info.id
        );
        Ok(output.change_info)
    }
}

fn set_result(set: &RecordSet) -> OperationResult {
    let values = set.values();
    OperationResult::new(ResourceStatus::Ready)
        .with_id(format!("{}|{}", from_route53_name(&set.name), set.record_type))
        .with_raw(json!({
            "content": values.join("\n"),
            "ttl": set.ttl,
            "values": values,
        }))
}

fn change_status(info: &ChangeInfo) -> ResourceStatus {
    match info.status.as_str() {
        "INSYNC" => ResourceStatus::Ready,
        _ => ResourceStatus::InProgress,
    }
}

// ============================================================================
// LifecycleClient: one record set per handle
// ============================================================================

/// Manages a record set as a resource: handle name is the record name,
/// [`ZONE_ID`] and [`RECORD_TYPE`] come from the handle context.
pub struct Route53RecordClient {
    cli: AwsCli,
}

impl Route53RecordClient {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    fn zone(&self, handle: &ResourceHandle) -> Result<HostedZoneApi> {
        let zone_id = handle.context_value(ZONE_ID).ok_or_else(|| {
            ClientError::InvalidArgument(format!("record '{}' has no hosted zone id", handle.name()))
        })?;
        Ok(HostedZoneApi {
            cli: self.cli.clone(),
            zone_id: zone_id.to_string(),
        })
    }

    fn record_type(handle: &ResourceHandle) -> Result<&str> {
        handle.context_value(RECORD_TYPE).ok_or_else(|| {
            ClientError::InvalidArgument(format!("record '{}' has no record type", handle.name()))
        })
    }

    async fn write(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        action: &str,
    ) -> Result<OperationResult> {
        let Payload::Record(record) = payload else {
            return Err(ClientError::InvalidArgument(format!(
                "cannot write a record from a {} payload",
                payload.name()
            )));
        };
        let zone = self.zone(handle)?;
        let mut set = RecordSet::new(
            handle.name(),
            &record.record_type,
            record.ttl.unwrap_or(DEFAULT_TTL),
        );
        set.resource_records.push(RecordValue {
            value: to_route53_value(&record.record_type, &record.content),
        });

        let info = zone.change(ctx, action, &set).await?;
        Ok(OperationResult::new(change_status(&info))
            .with_id(format!("{}|{}", handle.name(), record.record_type))
            .with_raw(json!({
                "content": record.content,
                "ttl": set.ttl,
                "change_id": info.id,
            })))
    }
}

#[async_trait]
impl LifecycleClient for Route53RecordClient {
    fn name(&self) -> &str {
        "aws-route53"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::HostedZoneRecord
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult> {
        self.write(ctx, handle, payload, "CREATE").await
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult> {
        let zone = self.zone(handle)?;
        let record_type = Self::record_type(handle)?;
        let set = zone
            .record_set(ctx, handle.name(), record_type)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("{} {}", handle.name(), record_type)))?;
        Ok(set_result(&set))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        _if_match: Option<&str>,
    ) -> Result<OperationResult> {
        self.write(ctx, handle, payload, "UPSERT").await
    }

    async fn delete(&self, ctx: &ProviderContext, handle: &ResourceHandle) -> Result<OperationResult> {
        let zone = self.zone(handle)?;
        let record_type = Self::record_type(handle)?;
        let set = zone
            .record_set(ctx, handle.name(), record_type)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("{} {}", handle.name(), record_type)))?;
        zone.change(ctx, "DELETE", &set).await?;
        Ok(OperationResult::not_found())
    }
}

// ============================================================================
// ZoneClient: one DnsRecord per value
// ============================================================================

/// Route 53 hosted zone as a [`ZoneClient`]
pub struct Route53Zone {
    api: HostedZoneApi,
    ctx: ProviderContext,
}

impl Route53Zone {
    pub fn new(cli: AwsCli, ctx: ProviderContext, zone_id: impl Into<String>) -> Self {
        let zone_id = zone_id.into();
        Self {
            api: HostedZoneApi {
                cli,
                zone_id: zone_id.trim_start_matches("/hostedzone/").to_string(),
            },
            ctx,
        }
    }

    /// Accept a hosted zone id (`Z0123...`) or a zone name (`example.com`)
    pub async fn lookup(cli: AwsCli, ctx: ProviderContext, zone: &str) -> Result<Self> {
        if !zone.contains('.') {
            return Ok(Self::new(cli, ctx, zone));
        }

        let output: Option<HostedZonesOutput> = cli
            .json(
                &ctx,
                None,
                &["route53", "list-hosted-zones-by-name", "--dns-name", zone],
            )
            .await?;
        let wanted = zone.trim_end_matches('.').to_ascii_lowercase();
        let found = output
            .unwrap_or_default()
            .hosted_zones
            .into_iter()
            .find(|z| z.name.trim_end_matches('.').eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ClientError::NotFound(format!("hosted zone '{}'", zone)))?;

        tracing::debug!("Resolved hosted zone {} to {}", zone, found.id);
        Ok(Self::new(cli, ctx, found.id))
    }

    pub fn zone_id(&self) -> &str {
        &self.api.zone_id
    }

    async fn existing(&self, record: &DnsRecord) -> Result<Option<RecordSet>> {
        self.api
            .record_set(&self.ctx, &record.name, &record.record_type)
            .await
    }
}

#[async_trait]
impl ZoneClient for Route53Zone {
    fn name(&self) -> &str {
        "route53"
    }

    async fn list_records(&self) -> Result<Vec<DnsRecord>> {
        Ok(self
            .api
            .record_sets(&self.ctx)
            .await?
            .iter()
            .filter(|s| s.alias_target.is_none())
            .flat_map(RecordSet::records)
            .collect())
    }

    async fn create_record(&self, record: &DnsRecord) -> Result<DnsRecord> {
        let ttl = record.ttl.unwrap_or(DEFAULT_TTL);
        let mut set = self
            .existing(record)
            .await?
            .unwrap_or_else(|| RecordSet::new(&record.name, &record.record_type, ttl));
        if set.position(record).is_none() {
            set.resource_records.push(RecordValue {
                value: to_route53_value(&record.record_type, &record.content),
            });
        }
        if record.ttl.is_some() {
            set.ttl = Some(ttl);
        }
        self.api.change(&self.ctx, "UPSERT", &set).await?;
        Ok(record.clone())
    }

    async fn update_record(&self, current: &DnsRecord, desired: &DnsRecord) -> Result<DnsRecord> {
        let mut set = self
            .existing(current)
            .await?
            .ok_or_else(|| ClientError::NotFound(current.to_string()))?;
        let value = RecordValue {
            value: to_route53_value(&desired.record_type, &desired.content),
        };
        match set.position(current) {
            Some(index) => set.resource_records[index] = value,
            None => set.resource_records.push(value),
        }
        if let Some(ttl) = desired.ttl {
            set.ttl = Some(ttl);
        }
        self.api.change(&self.ctx, "UPSERT", &set).await?;
        Ok(desired.clone())
    }

    async fn delete_record(&self, record: &DnsRecord) -> Result<()> {
        let set = self
            .existing(record)
            .await?
            .ok_or_else(|| ClientError::NotFound(record.to_string()))?;
        let index = set
            .position(record)
            .ok_or_else(|| ClientError::NotFound(record.to_string()))?;

        if set.resource_records.len() == 1 {
            // DELETE must match the live set exactly
            self.api.change(&self.ctx, "DELETE", &set).await?;
        } else {
            let mut remaining = set;
            remaining.resource_records.remove(index);
            self.api.change(&self.ctx, "UPSERT", &remaining).await?;
        }
        Ok(())
    }
}
