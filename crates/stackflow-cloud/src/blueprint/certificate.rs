//! DNS-validated certificate request

use super::Timing;
use crate::error::PlanError;
use crate::handle::ResourceHandle;
use crate::payload::{CertificateSpec, Payload};
use crate::plan::{Checkpoint, Plan, Step};
use crate::status::ResourceStatus;

/// CDN certificates must live in this region
pub const CDN_CERTIFICATE_REGION: &str = "us-east-1";

/// Request a certificate, hand the validation record to the operator, wait until issued
pub fn request(
    domain: &str,
    subject_alternative_names: &[String],
    timing: &Timing,
) -> Result<Plan, PlanError> {
    let handle = ResourceHandle::certificate(domain).with_region(CDN_CERTIFICATE_REGION);

    Plan::builder(format!("certificate {}", domain))
        .step(
            Step::create(
                handle,
                Payload::Certificate(CertificateSpec {
                    domain: domain.to_string(),
                    subject_alternative_names: subject_alternative_names.to_vec(),
                }),
            )
            .labeled("request certificate")
            .with_retry(timing.retry())
            .with_checkpoint(Checkpoint::new(format!(
                "Add the DNS validation record for {} to its zone",
                domain
            )))
            .with_wait(
                timing
                    .certificate_wait()
                    .failing_on([ResourceStatus::Failed]),
            ),
        )
        .build()
}
