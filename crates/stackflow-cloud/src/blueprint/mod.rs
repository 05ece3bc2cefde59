//! Ready-made plans for the supported operations

pub mod certificate;
pub mod state_backend;
pub mod static_site;

use crate::plan::RetryPolicy;
use crate::status::ResourceStatus;
use crate::waiter::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling and retry tuning shared by all blueprints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub distribution_poll: Duration,
    pub distribution_max_attempts: u32,
    pub oac_retry_delay: Duration,
    pub invalidation_poll: Duration,
    pub invalidation_max_attempts: u32,
    pub table_poll: Duration,
    pub table_max_attempts: u32,
    pub certificate_poll: Duration,
    pub certificate_max_attempts: u32,
    pub delete_pause: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            distribution_poll: Duration::from_secs(60),
            distribution_max_attempts: 30,
            oac_retry_delay: Duration::from_secs(30),
            invalidation_poll: Duration::from_secs(30),
            invalidation_max_attempts: 20,
            table_poll: Duration::from_secs(10),
            table_max_attempts: 30,
            certificate_poll: Duration::from_secs(30),
            certificate_max_attempts: 40,
            delete_pause: Duration::from_millis(100),
            max_retries: 5,
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl Timing {
    /// Zero delays, for tests driven by a manual clock
    pub fn immediate() -> Self {
        Self {
            distribution_poll: Duration::ZERO,
            oac_retry_delay: Duration::ZERO,
            invalidation_poll: Duration::ZERO,
            table_poll: Duration::ZERO,
            certificate_poll: Duration::ZERO,
            delete_pause: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    fn distribution_wait(&self, terminal: ResourceStatus) -> WaitPolicy {
        WaitPolicy::until([terminal])
            .every(self.distribution_poll)
            .at_most(self.distribution_max_attempts)
    }

    fn invalidation_wait(&self) -> WaitPolicy {
        WaitPolicy::until_ready()
            .every(self.invalidation_poll)
            .at_most(self.invalidation_max_attempts)
    }

    fn table_wait(&self, terminal: ResourceStatus) -> WaitPolicy {
        WaitPolicy::until([terminal])
            .every(self.table_poll)
            .at_most(self.table_max_attempts)
    }

    fn certificate_wait(&self) -> WaitPolicy {
        WaitPolicy::until_ready()
            .every(self.certificate_poll)
            .at_most(self.certificate_max_attempts)
    }
}
