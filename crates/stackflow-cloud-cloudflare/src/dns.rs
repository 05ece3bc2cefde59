//! Cloudflare DNS API client
//!
//! Direct Cloudflare API implementation for DNS record management.
//! Uses Bearer token authentication; record comments carry the managed
//! marker the reconciler relies on.

use crate::error::{CloudflareError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stackflow_cloud::dns::{DnsRecord, ZoneClient};

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Records requested per page when listing a zone
const PAGE_SIZE: u32 = 100;

/// TTL value Cloudflare uses for "automatic"
const AUTO_TTL: u32 = 1;

/// Configuration for DNS manager
#[derive(Clone)]
pub struct DnsConfig {
    pub api_token: String,
    /// Zone id, or a zone name to look up
    pub zone: String,
    pub api_base: String,
}

impl std::fmt::Debug for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsConfig")
            .field("api_token", &"<redacted>")
            .field("zone", &self.zone)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DnsConfig {
    pub fn new(api_token: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            zone: zone.into(),
            api_base: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    /// Read the API token from the environment variable `token_var`
    pub fn from_env(token_var: &str, zone: impl Into<String>) -> Result<Self> {
        let api_token = std::env::var(token_var)
            .map_err(|_| CloudflareError::MissingEnvVar(token_var.to_string()))?;
        Ok(Self::new(api_token, zone))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Zone ids are 32 lower-case hex characters
pub fn is_zone_id(zone: &str) -> bool {
    zone.len() == 32 && zone.chars().all(|c| c.is_ascii_hexdigit())
}

/// Cloudflare DNS manager for one zone
pub struct CloudflareDns {
    client: reqwest::Client,
    api_token: String,
    api_base: String,
    zone_id: String,
}

impl CloudflareDns {
    /// Create a DNS manager, resolving the zone name to its id when needed
    pub async fn connect(config: DnsConfig) -> Result<Self> {
        let mut dns = Self {
            client: reqwest::Client::new(),
            api_token: config.api_token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            zone_id: config.zone.clone(),
        };
        if !is_zone_id(&config.zone) {
            dns.zone_id = dns.find_zone(&config.zone).await?;
        }
        Ok(dns)
    }

    /// Get the zone id
    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    async fn find_zone(&self, name: &str) -> Result<String> {
        let url = format!("{}/zones", self.api_base);
        let request = self
            .client
            .get(&url)
            .query(&[("name", name)])
            .bearer_auth(&self.api_token);
        let (zones, _): (Vec<ApiZone>, _) = self.send(request).await?;

        let zone = zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(name.trim_end_matches('.')))
            .ok_or_else(|| CloudflareError::ZoneNotFound(name.to_string()))?;
        tracing::debug!("Resolved zone {} to {}", name, zone.id);
        Ok(zone.id)
    }

    /// Send a request and unwrap the API envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(T, Option<ResultInfo>)> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let api_response: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(CloudflareError::ApiError {
                    status: status.as_u16(),
                    code: None,
                    message: body,
                });
            }
        };

        match api_response.result {
            Some(result) if api_response.success && status.is_success() => {
                Ok((result, api_response.result_info))
            }
            _ => {
                let first = api_response.errors.first();
                Err(CloudflareError::ApiError {
                    status: status.as_u16(),
                    code: first.map(|e| e.code),
                    message: first
                        .map(|e| e.message.clone())
                        .unwrap_or_else(|| format!("Unknown error (HTTP {})", status)),
                })
            }
        }
    }

    /// List every DNS record in the zone, following pagination
    pub async fn records(&self) -> Result<Vec<DnsRecord>> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, self.zone_id);
        let per_page = PAGE_SIZE.to_string();
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self
                .client
                .get(&url)
                .query(&[("page", page.to_string().as_str()), ("per_page", per_page.as_str())])
                .bearer_auth(&self.api_token);
            let (batch, info): (Vec<ApiDnsRecord>, _) = self.send(request).await?;
            let fetched = batch.len();
            records.extend(batch.into_iter().map(DnsRecord::from));

            let total_pages = info.map(|i| i.total_pages).unwrap_or(page);
            tracing::debug!("Fetched page {}/{} ({} records)", page, total_pages, fetched);
            if page >= total_pages || fetched == 0 {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    /// Create a DNS record
    pub async fn create(&self, record: &DnsRecord) -> Result<DnsRecord> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, self.zone_id);
        tracing::info!("Creating DNS record: {}", record);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&DnsRecordRequest::from(record));
        let (created, _): (ApiDnsRecord, _) = self.send(request).await?;
        Ok(created.into())
    }

    /// Overwrite the record `record_id` with `record`
    pub async fn overwrite(&self, record_id: &str, record: &DnsRecord) -> Result<DnsRecord> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, self.zone_id, record_id
        );
        tracing::info!("Updating DNS record {}: {}", record_id, record);

        let request = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&DnsRecordRequest::from(record));
        let (updated, _): (ApiDnsRecord, _) = self.send(request).await?;
        Ok(updated.into())
    }

    /// Delete a DNS record
    pub async fn delete(&self, record_id: &str) -> Result<()> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, self.zone_id, record_id
        );
        tracing::info!("Deleting DNS record: {}", record_id);

        let request = self.client.delete(&url).bearer_auth(&self.api_token);
        let _: (DeleteResult, _) = self.send(request).await?;
        Ok(())
    }
}

fn record_id(record: &DnsRecord) -> Result<&str> {
    record
        .id
        .as_deref()
        .ok_or_else(|| CloudflareError::MissingRecordId(record.to_string()))
}

#[async_trait]
impl ZoneClient for CloudflareDns {
    fn name(&self) -> &str {
        "cloudflare"
    }

    async fn list_records(&self) -> stackflow_cloud::Result<Vec<DnsRecord>> {
        Ok(self.records().await?)
    }

    async fn create_record(&self, record: &DnsRecord) -> stackflow_cloud::Result<DnsRecord> {
        Ok(self.create(record).await?)
    }

    async fn update_record(
        &self,
        current: &DnsRecord,
        desired: &DnsRecord,
    ) -> stackflow_cloud::Result<DnsRecord> {
        Ok(self.overwrite(record_id(current)?, desired).await?)
    }

    async fn delete_record(&self, record: &DnsRecord) -> stackflow_cloud::Result<()> {
        Ok(self.delete(record_id(record)?).await?)
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default = "first_page")]
    total_pages: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiDnsRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    r#type: String,
    content: String,
    ttl: u32,
    #[serde(default)]
    proxied: bool,
    #[serde(default)]
    comment: Option<String>,
}

impl From<ApiDnsRecord> for DnsRecord {
    fn from(r: ApiDnsRecord) -> Self {
        DnsRecord {
            id: Some(r.id),
            name: r.name,
            record_type: r.r#type,
            content: r.content,
            ttl: (r.ttl != AUTO_TTL).then_some(r.ttl),
            proxied: r.proxied,
            comment: r.comment.filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct DnsRecordRequest<'a> {
    #[serde(rename = "type")]
    r#type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

impl<'a> From<&'a DnsRecord> for DnsRecordRequest<'a> {
    fn from(record: &'a DnsRecord) -> Self {
        Self {
            r#type: &record.record_type,
            name: &record.name,
            content: &record.content,
            ttl: record.ttl.unwrap_or(AUTO_TTL),
            proxied: record.proxied,
            comment: record.comment.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteResult {
    #[allow(dead_code)]
    id: String,
}
