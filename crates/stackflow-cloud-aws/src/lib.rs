//! AWS lifecycle clients for StackFlow
//!
//! Implements [`LifecycleClient`](stackflow_cloud::LifecycleClient) for the
//! resources a static site and a state backend need, plus a Route 53
//! [`ZoneClient`](stackflow_cloud::ZoneClient).
//!
//! # Requirements
//!
//! - `aws` CLI must be installed
//! - Credentials resolve through the CLI (profile, environment, instance
//!   role) unless the [`ProviderContext`](stackflow_cloud::ProviderContext)
//!   carries static keys, which are passed to the child process only
//!
//! # Example
//!
//! ```ignore
//! use stackflow_cloud::{LifecycleClient, ProviderContext, ResourceHandle};
//! use stackflow_cloud_aws::AwsProvider;
//!
//! let provider = AwsProvider::default();
//! let ctx = ProviderContext::new().with_profile("ops").with_region("ap-northeast-1");
//!
//! let auth = provider.check_auth(&ctx).await;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! let bucket = provider.describe(&ctx, &ResourceHandle::bucket("docs-example-com")).await?;
//! ```

pub mod acm;
pub mod cli;
pub mod cloudfront;
pub mod dynamodb;
pub mod error;
pub mod provider;
pub mod route53;
pub mod s3;

pub use acm::CertificateClient;
pub use cli::AwsCli;
pub use cloudfront::{DistributionClient, InvalidationClient, OriginAccessControlClient};
pub use dynamodb::TableClient;
pub use error::{AwsError, Result, classify};
pub use provider::AwsProvider;
pub use route53::{Route53RecordClient, Route53Zone};
pub use s3::S3BucketClient;
