//! StackFlow Cloud Lifecycle
//!
//! This crate drives cloud resources through create/update/delete
//! lifecycles whose effects only become visible after the provider has
//! converged, by combining idempotent client calls with bounded polling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  StackFlow CLI                   │
//! │     (site deploy / site teardown / dns ...)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │  Plan (validated at build time)
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │             Orchestrator                  │   │
//! │  │  describe → mutate (retry) → wait         │   │
//! │  └──────────────┬───────────────────────────┘   │
//! │  ┌──────────────▼─┐  ┌──────────────────────┐   │
//! │  │ PollingWaiter  │  │   ZoneReconciler     │   │
//! │  └──────────────┬─┘  └──────────┬───────────┘   │
//! │  ┌──────────────▼─────┐ ┌───────▼───────────┐   │
//! │  │ trait LifecycleClient│ │  trait ZoneClient │   │
//! │  └────────────────────┘ └───────────────────┘   │
//! └───────┬──────────────────────────┬──────────────┘
//!         │                          │
//! ┌───────▼───────┐          ┌───────▼───────┐
//! │      aws      │          │  cloudflare   │
//! │  (aws CLI)    │          │  (REST API)   │
//! └───────────────┘          └───────────────┘
//! ```

pub mod bindings;
pub mod blueprint;
pub mod client;
pub mod clock;
pub mod context;
pub mod dns;
pub mod error;
pub mod gate;
pub mod handle;
pub mod orchestrator;
pub mod payload;
pub mod plan;
pub mod report;
pub mod status;
pub mod waiter;

// Re-exports
pub use bindings::Bindings;
pub use blueprint::Timing;
pub use client::{AuthStatus, LifecycleClient, ProviderRouter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{Credentials, ProviderContext};
pub use dns::{ApplyResult, ChangeSet, DnsRecord, SkipReason, ZoneClient, ZoneReconciler};
pub use error::{ClientError, PlanError, Result, StepError, WaitError};
pub use gate::{
    AlwaysConfirm, ConfirmationGate, PhraseGate, require_confirmation, require_zone_confirmation,
};
pub use handle::{HandleKey, ResourceHandle, ResourceKind};
pub use orchestrator::{
    DeferAll, ExternalActionHandler, ExternalActionRequest, ExternalActionResponse, Orchestrator,
};
pub use payload::Payload;
pub use plan::{Action, Checkpoint, Plan, PlanBuilder, PlanSummary, RetryPolicy, Step};
pub use report::{PlanReport, PlanStatus, StepFailure, StepRecord, StepState};
pub use status::{OperationResult, ResourceStatus};
pub use waiter::{OnTimeout, PollingWaiter, WaitOutcome, WaitPolicy};
