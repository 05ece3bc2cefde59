//! Cloudflare DNS provider for StackFlow
//!
//! Implements [`ZoneClient`](stackflow_cloud::ZoneClient) on top of the
//! Cloudflare v4 REST API.
//!
//! # Requirements
//!
//! - An API token with `Zone.DNS:Edit` on the target zone, read from the
//!   environment (`CLOUDFLARE_API_TOKEN` by default)
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud::ZoneClient;
//! use stackflow_cloud_cloudflare::{CloudflareDns, DnsConfig};
//!
//! let config = DnsConfig::from_env("CLOUDFLARE_API_TOKEN", "example.com")?;
//! let zone = CloudflareDns::connect(config).await?;
//! let records = zone.list_records().await?;
//! ```

pub mod dns;
pub mod error;

pub use dns::{CLOUDFLARE_API_BASE, CloudflareDns, DnsConfig};
pub use error::{CloudflareError, Result};
