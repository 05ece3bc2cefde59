//! Remote-state backend: versioned bucket plus lock table

use super::Timing;
use crate::error::PlanError;
use crate::handle::ResourceHandle;
use crate::payload::{BucketSpec, Payload, TableSpec};
use crate::plan::{Plan, Step};
use crate::status::ResourceStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub bucket: String,
    pub table: String,
    pub region: Option<String>,
}

impl BackendSpec {
    pub fn new(bucket: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            table: table.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    fn bucket_handle(&self) -> ResourceHandle {
        regional(ResourceHandle::bucket(&self.bucket), &self.region)
    }

    fn table_handle(&self) -> ResourceHandle {
        regional(ResourceHandle::table(&self.table), &self.region)
    }
}

fn regional(handle: ResourceHandle, region: &Option<String>) -> ResourceHandle {
    match region {
        Some(region) => handle.with_region(region),
        None => handle,
    }
}

pub fn setup(backend: &BackendSpec, timing: &Timing) -> Result<Plan, PlanError> {
    Plan::builder(format!("backend setup {}", backend.bucket))
        .step(
            Step::create(
                backend.bucket_handle(),
                Payload::Bucket(BucketSpec {
                    region: backend.region.clone(),
                    block_public_access: true,
                    versioning: true,
                    encryption: true,
                }),
            )
            .labeled("ensure state bucket")
            .with_retry(timing.retry()),
        )
        .step(
            Step::create(backend.table_handle(), Payload::Table(TableSpec::lock_table()))
                .labeled("ensure lock table")
                .with_retry(timing.retry())
                .with_wait(timing.table_wait(ResourceStatus::Ready)),
        )
        .build()
}

pub fn teardown(backend: &BackendSpec, timing: &Timing) -> Result<Plan, PlanError> {
    let bucket = backend.bucket_handle();

    Plan::builder(format!("backend destroy {}", backend.bucket))
        .step(
            Step::update(bucket.clone(), Payload::EmptyBucket)
                .labeled("empty state bucket")
                .allow_absent()
                .with_retry(timing.retry()),
        )
        .step(
            Step::delete(bucket)
                .labeled("delete state bucket")
                .with_retry(timing.retry()),
        )
        .step(
            Step::delete(backend.table_handle())
                .labeled("delete lock table")
                .with_retry(timing.retry())
                .with_wait(timing.table_wait(ResourceStatus::NotFound)),
        )
        .build()
}
