//! Settings file model

use serde::{Deserialize, Serialize};
use stackflow_cloud::{ProviderContext, Timing};
use std::time::Duration;

pub const DEFAULT_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";
pub const DEFAULT_MANAGED_MARKER: &str = "terraform";

/// Contents of `stackflow.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub aws: AwsSettings,
    pub cloudflare: CloudflareSettings,
    pub dns: DnsSettings,
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    pub profile: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudflareSettings {
    /// Name of the environment variable holding the API token
    pub api_token_env: String,
    pub zone_id: Option<String>,
}

impl Default for CloudflareSettings {
    fn default() -> Self {
        Self {
            api_token_env: DEFAULT_TOKEN_ENV.to_string(),
            zone_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSettings {
    /// Comment marker identifying records this tool may delete
    pub managed_marker: String,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            managed_marker: DEFAULT_MANAGED_MARKER.to_string(),
        }
    }
}

/// Polling and retry tuning, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub distribution_poll_ms: u64,
    pub distribution_max_attempts: u32,
    pub oac_retry_delay_ms: u64,
    pub invalidation_poll_ms: u64,
    pub invalidation_max_attempts: u32,
    pub table_poll_ms: u64,
    pub table_max_attempts: u32,
    pub certificate_poll_ms: u64,
    pub certificate_max_attempts: u32,
    pub delete_pause_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            distribution_poll_ms: 60_000,
            distribution_max_attempts: 30,
            oac_retry_delay_ms: 30_000,
            invalidation_poll_ms: 30_000,
            invalidation_max_attempts: 20,
            table_poll_ms: 10_000,
            table_max_attempts: 30,
            certificate_poll_ms: 30_000,
            certificate_max_attempts: 40,
            delete_pause_ms: 100,
            max_retries: 5,
            retry_delay_ms: 30_000,
        }
    }
}

impl TimingSettings {
    pub fn to_timing(&self) -> Timing {
        Timing {
            distribution_poll: Duration::from_millis(self.distribution_poll_ms),
            distribution_max_attempts: self.distribution_max_attempts,
            oac_retry_delay: Duration::from_millis(self.oac_retry_delay_ms),
            invalidation_poll: Duration::from_millis(self.invalidation_poll_ms),
            invalidation_max_attempts: self.invalidation_max_attempts,
            table_poll: Duration::from_millis(self.table_poll_ms),
            table_max_attempts: self.table_max_attempts,
            certificate_poll: Duration::from_millis(self.certificate_poll_ms),
            certificate_max_attempts: self.certificate_max_attempts,
            delete_pause: Duration::from_millis(self.delete_pause_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Settings {
    /// Provider context with command-line overrides applied on top of the file
    pub fn provider_context(&self, profile: Option<&str>, region: Option<&str>) -> ProviderContext {
        let mut ctx = ProviderContext::new();
        if let Some(profile) = profile.or(self.aws.profile.as_deref()) {
            ctx = ctx.with_profile(profile);
        }
        if let Some(region) = region.or(self.aws.region.as_deref()) {
            ctx = ctx.with_region(region);
        }
        ctx
    }

    pub fn timing(&self) -> Timing {
        self.timing.to_timing()
    }
}
