mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{FakeCloud, ScriptedOperator};
use stackflow_cloud::blueprint::static_site::{self, SiteSpec};
use stackflow_cloud::blueprint::{Timing, certificate, state_backend};
use stackflow_cloud::payload::{Payload, TableSpec};
use stackflow_cloud::{
    ClientError, Clock, ExternalActionHandler, ExternalActionRequest, ExternalActionResponse,
    LifecycleClient, ManualClock, OperationResult, Orchestrator, Plan, PlanStatus, ProviderContext,
    ResourceHandle, ResourceKind, ResourceStatus, RetryPolicy, Step, StepState, WaitPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn orchestrator(cloud: &Arc<FakeCloud>) -> Orchestrator {
    Orchestrator::new(cloud.clone(), ProviderContext::new().with_region("ap-northeast-1"))
        .with_clock(Arc::new(ManualClock::default()))
}

fn docs_site() -> SiteSpec {
    SiteSpec::new("docs", "./dist")
        .with_bucket("docs-example-com")
        .with_revision("r1")
}

async fn deployed(cloud: &Arc<FakeCloud>) {
    let plan = static_site::deploy(&docs_site(), &Timing::immediate()).unwrap();
    let report = orchestrator(cloud).execute(&plan).await;
    assert_eq!(report.status, PlanStatus::Completed, "{:?}", report.failure);
    cloud.clear_calls();
}

/// デプロイを2回実行しても2回目は変更を行わないことを確認
#[tokio::test]
async fn test_deploy_rerun_performs_no_mutations() {
    let cloud = Arc::new(FakeCloud::new());
    let plan = static_site::deploy(&docs_site(), &Timing::immediate()).unwrap();

    let first = orchestrator(&cloud).execute(&plan).await;
    assert_eq!(first.status, PlanStatus::Completed, "{:?}", first.failure);
    assert_eq!(cloud.resource_count(), 4);
    assert_eq!(first.count(StepState::Succeeded), 6);

    let distribution = cloud.resource(ResourceKind::Distribution, "docs").unwrap();
    assert_eq!(distribution.status, ResourceStatus::Ready);
    let bucket = cloud.resource(ResourceKind::Bucket, "docs-example-com").unwrap();
    let policy = bucket.policy.unwrap().to_string();
    assert!(policy.contains(&format!("distribution/{}", distribution.id)));
    assert!(bucket.has_objects);

    cloud.clear_calls();
    let second = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(second.status, PlanStatus::Completed);
    assert!(cloud.mutations().is_empty(), "unexpected {:?}", cloud.mutations());
    assert_eq!(second.count(StepState::Skipped), 6);
    assert_eq!(second.mutation_count(), 0);
    assert_eq!(cloud.resource_count(), 4);
    // already-terminal resources are never re-polled
    assert!(second.steps.iter().all(|s| s.polls == 0));
}

/// リビジョン未指定でも、同じ内容の再デプロイでは同期を行わないことを確認
#[tokio::test]
async fn test_deploy_rerun_without_revision_performs_no_mutations() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("index.html"), "<h1>docs</h1>").unwrap();
    let site = SiteSpec::new("docs", source.path()).with_bucket("docs-example-com");
    let cloud = Arc::new(FakeCloud::new());

    let plan = static_site::deploy(&site, &Timing::immediate()).unwrap();
    let first = orchestrator(&cloud).execute(&plan).await;
    assert_eq!(first.status, PlanStatus::Completed, "{:?}", first.failure);

    cloud.clear_calls();
    let second = orchestrator(&cloud).execute(&plan).await;
    assert_eq!(second.status, PlanStatus::Completed);
    assert!(cloud.mutations().is_empty(), "unexpected {:?}", cloud.mutations());

    // a plan rebuilt from the untouched directory is satisfied as well
    cloud.clear_calls();
    let rebuilt = static_site::deploy(&site, &Timing::immediate()).unwrap();
    let third = orchestrator(&cloud).execute(&rebuilt).await;
    assert_eq!(third.status, PlanStatus::Completed);
    assert!(cloud.mutations().is_empty(), "unexpected {:?}", cloud.mutations());
    assert_eq!(third.count(StepState::Skipped), 6);
}

/// 削除順序が正しいティアダウンが成功することを確認
#[tokio::test]
async fn test_teardown_deletes_in_dependency_order() {
    let cloud = Arc::new(FakeCloud::new());
    deployed(&cloud).await;

    let plan = static_site::teardown(&docs_site(), &Timing::immediate()).unwrap();
    let report = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(report.status, PlanStatus::Completed, "{:?}", report.failure);
    assert_eq!(
        cloud.mutations(),
        vec![
            "update distribution:docs",
            "delete distribution:docs",
            "delete origin-access-control:docs-oac",
            "update bucket:docs-example-com",
            "delete bucket:docs-example-com",
        ]
    );
    assert!(!cloud.exists(ResourceKind::Distribution, "docs"));
    assert!(!cloud.exists(ResourceKind::OriginAccessControl, "docs-oac"));
    assert!(!cloud.exists(ResourceKind::Bucket, "docs-example-com"));
    assert_eq!(report.steps[0].polls, 2);
}

/// 中断後のティアダウン再実行が安全であることを確認
#[tokio::test]
async fn test_teardown_rerun_skips_missing_resources() {
    let cloud = Arc::new(FakeCloud::new());
    deployed(&cloud).await;
    let plan = static_site::teardown(&docs_site(), &Timing::immediate()).unwrap();
    orchestrator(&cloud).execute(&plan).await;
    cloud.clear_calls();

    let report = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(report.status, PlanStatus::Completed);
    assert!(cloud.mutations().is_empty());
    assert_eq!(report.count(StepState::Skipped), 5);
}

/// OAC をディストリビューションより先に削除すると InUse で失敗することを確認
#[tokio::test]
async fn test_misordered_teardown_exhausts_in_use_retries() {
    let cloud = Arc::new(FakeCloud::new());
    deployed(&cloud).await;

    let distribution = ResourceHandle::distribution("docs");
    let oac = ResourceHandle::origin_access_control("docs-oac");
    let bucket = ResourceHandle::bucket("docs-example-com");
    let plan = Plan::builder("teardown docs (misordered)")
        .step(
            Step::update(distribution.clone(), Payload::DistributionEnabled(false))
                .with_wait(WaitPolicy::until_disabled().every(Duration::ZERO).at_most(10)),
        )
        .step(Step::delete(oac).with_retry(RetryPolicy::new(3, Duration::from_secs(30))))
        .step(Step::delete(distribution))
        .step(Step::update(bucket.clone(), Payload::EmptyBucket))
        .step(Step::delete(bucket))
        .build()
        .unwrap();

    let clock = Arc::new(ManualClock::default());
    let report = orchestrator(&cloud)
        .with_clock(clock.clone())
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Failed);
    let failure = report.failure().unwrap();
    assert_eq!(failure.step, 1);
    assert_eq!(failure.attempts, 4);
    assert!(failure.message.contains("OriginAccessControlInUse"));
    assert!(failure.resource.contains("docs-oac"));
    assert_eq!(cloud.count("delete origin-access-control"), 4);
    assert_eq!(clock.sleeps().iter().filter(|d| **d == Duration::from_secs(30)).count(), 3);

    // nothing after the failed step ran
    assert!(cloud.exists(ResourceKind::Distribution, "docs"));
    assert_eq!(report.steps[2].state, StepState::Pending);
    assert_eq!(report.steps[4].state, StepState::Pending);
}

struct AddsValidationRecord {
    cloud: Arc<FakeCloud>,
}

impl ExternalActionHandler for AddsValidationRecord {
    fn request(&self, request: &ExternalActionRequest) -> ExternalActionResponse {
        self.cloud.validate_certificate(request.handle.name());
        ExternalActionResponse::Confirmed
    }
}

/// 証明書リクエストが検証レコードの追加待ちで中断し、再開できることを確認
#[tokio::test]
async fn test_certificate_checkpoint_suspends_and_resumes() {
    let cloud = Arc::new(FakeCloud::new());
    let plan = certificate::request("example.com", &[], &Timing::immediate()).unwrap();

    let operator = Arc::new(ScriptedOperator::deferring());
    let report = orchestrator(&cloud)
        .with_operator(operator.clone())
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Suspended);
    assert_eq!(report.steps[0].state, StepState::WaitingOnExternalAction);
    let requests = operator.requests();
    assert_eq!(requests.len(), 1);
    let record = requests[0].validation_record().unwrap();
    assert_eq!(record["type"], "CNAME");
    assert_eq!(record["value"], "_424c7224.acm-validations.aws.");

    let report = orchestrator(&cloud)
        .with_operator(Arc::new(AddsValidationRecord {
            cloud: cloud.clone(),
        }))
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Completed, "{:?}", report.failure);
    assert_eq!(report.steps[0].state, StepState::Skipped);
    assert_eq!(report.steps[0].polls, 1);
    assert_eq!(cloud.count("create"), 1);
    assert_eq!(
        cloud.resource(ResourceKind::Certificate, "example.com").unwrap().status,
        ResourceStatus::Ready
    );
}

/// 実行前にキャンセルされた場合は何も呼び出さないことを確認
#[tokio::test]
async fn test_cancelled_before_start() {
    let cloud = Arc::new(FakeCloud::new());
    let token = CancellationToken::new();
    token.cancel();

    let plan = static_site::deploy(&docs_site(), &Timing::immediate()).unwrap();
    let report = orchestrator(&cloud)
        .with_cancellation(token)
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Cancelled);
    assert!(cloud.calls().is_empty());
    assert!(report.steps.iter().all(|s| s.state == StepState::Pending));
}

struct CancelOnSleep {
    token: CancellationToken,
    inner: ManualClock,
}

#[async_trait]
impl Clock for CancelOnSleep {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.token.cancel();
        self.inner.sleep(duration).await;
    }
}

/// ポーリング中のキャンセルで途中までのレポートが返ることを確認
#[tokio::test]
async fn test_cancel_during_wait_returns_partial_report() {
    let cloud = Arc::new(FakeCloud::new());
    let token = CancellationToken::new();
    let clock = Arc::new(CancelOnSleep {
        token: token.clone(),
        inner: ManualClock::default(),
    });

    let plan = static_site::deploy(&docs_site(), &Timing::immediate()).unwrap();
    let report = orchestrator(&cloud)
        .with_clock(clock)
        .with_cancellation(token)
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Cancelled);
    assert_eq!(report.steps[0].state, StepState::Succeeded);
    assert_eq!(report.steps[1].state, StepState::Succeeded);
    assert_eq!(report.steps[2].state, StepState::Pending);
    assert!(report.steps[2].error.is_some());
    assert_eq!(report.steps[3].state, StepState::Pending);
    assert!(report.failure.is_none());
    // the distribution exists; a re-run picks it up instead of creating another one
    assert!(cloud.exists(ResourceKind::Distribution, "docs"));
}

/// 作成呼び出しの最中に中断されるクライアント
struct CancelOnCreate {
    token: CancellationToken,
    inner: Arc<FakeCloud>,
}

#[async_trait]
impl LifecycleClient for CancelOnCreate {
    fn name(&self) -> &str {
        "cancel-on-create"
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        self.inner.supports(kind)
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
    ) -> Result<OperationResult, ClientError> {
        let result = self.inner.create(ctx, handle, payload).await;
        self.token.cancel();
        result
    }

    async fn describe(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult, ClientError> {
        self.inner.describe(ctx, handle).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
        payload: &Payload,
        if_match: Option<&str>,
    ) -> Result<OperationResult, ClientError> {
        self.inner.update(ctx, handle, payload, if_match).await
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        handle: &ResourceHandle,
    ) -> Result<OperationResult, ClientError> {
        self.inner.delete(ctx, handle).await
    }
}

/// 作成中にキャンセルされた場合はチェックポイントで確認を求めないことを確認
#[tokio::test]
async fn test_cancel_during_create_skips_checkpoint() {
    let cloud = Arc::new(FakeCloud::new());
    let token = CancellationToken::new();
    let client = Arc::new(CancelOnCreate {
        token: token.clone(),
        inner: cloud.clone(),
    });
    let operator = Arc::new(ScriptedOperator::confirming());

    let plan = certificate::request("example.com", &[], &Timing::immediate()).unwrap();
    let report = Orchestrator::new(client, ProviderContext::new())
        .with_clock(Arc::new(ManualClock::default()))
        .with_operator(operator.clone())
        .with_cancellation(token)
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Cancelled);
    assert!(operator.requests().is_empty());
    assert_eq!(cloud.count("create"), 1);
}

/// バージョン競合時に再取得して1回だけ再試行することを確認
#[tokio::test]
async fn test_conflict_rereads_and_retries_once() {
    let cloud = Arc::new(FakeCloud::new());
    deployed(&cloud).await;
    cloud.fail_next(
        "update",
        ClientError::Conflict {
            expected_version: Some("v9".into()),
            message: "PreconditionFailed".into(),
        },
    );

    let plan = Plan::builder("disable docs")
        .step(
            Step::update(ResourceHandle::distribution("docs"), Payload::DistributionEnabled(false))
                .with_wait(WaitPolicy::until_disabled().every(Duration::ZERO)),
        )
        .build()
        .unwrap();
    let report = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(report.status, PlanStatus::Completed, "{:?}", report.failure);
    assert_eq!(report.steps[0].attempts, 2);
    assert_eq!(cloud.count("update"), 2);
    assert!(!cloud.resource(ResourceKind::Distribution, "docs").unwrap().enabled);
}

fn lock_table_plan(retry: RetryPolicy, wait: WaitPolicy) -> Plan {
    Plan::builder("locks")
        .step(
            Step::create(ResourceHandle::table("locks"), Payload::Table(TableSpec::lock_table()))
                .with_retry(retry)
                .with_wait(wait),
        )
        .build()
        .unwrap()
}

/// 一時的なエラーは固定間隔で再試行されることを確認
#[tokio::test]
async fn test_transient_error_is_retried_with_fixed_delay() {
    let cloud = Arc::new(FakeCloud::new());
    cloud.fail_next("create", ClientError::Transient("ThrottlingException".into()));
    let clock = Arc::new(ManualClock::default());

    let plan = lock_table_plan(
        RetryPolicy::new(2, Duration::from_secs(5)),
        WaitPolicy::until_ready().every(Duration::from_secs(10)),
    );
    let report = orchestrator(&cloud)
        .with_clock(clock.clone())
        .execute(&plan)
        .await;

    assert_eq!(report.status, PlanStatus::Completed);
    assert_eq!(report.steps[0].attempts, 2);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
}

/// 権限エラーは再試行せずに即座に失敗することを確認
#[tokio::test]
async fn test_permission_denied_is_fatal() {
    let cloud = Arc::new(FakeCloud::new());
    cloud.fail_next(
        "create",
        ClientError::PermissionDenied("AccessDeniedException: not authorized".into()),
    );

    let plan = lock_table_plan(RetryPolicy::default(), WaitPolicy::until_ready());
    let report = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(report.status, PlanStatus::Failed);
    let failure = report.failure().unwrap();
    assert_eq!(failure.attempts, 1);
    assert!(failure.message.contains("AccessDeniedException"));
    assert!(failure.to_string().contains("create table 'locks'"));
    assert_eq!(cloud.count("create"), 1);
}

/// 待機がタイムアウトした場合にポーリング回数が報告されることを確認
#[tokio::test]
async fn test_wait_timeout_reports_attempts() {
    let cloud = Arc::new(FakeCloud::with_settle_polls(100));
    let plan = lock_table_plan(
        RetryPolicy::none(),
        WaitPolicy::until_ready().every(Duration::ZERO).at_most(3),
    );

    let report = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(report.status, PlanStatus::Failed);
    let failure = report.failure().unwrap();
    assert_eq!(failure.attempts, 3);
    assert!(failure.message.contains("Timed out"));
    assert_eq!(report.steps[0].polls, 3);
    assert_eq!(cloud.count("describe"), 4);
}

/// 存在しないリソースの更新は失敗することを確認
#[tokio::test]
async fn test_update_of_missing_resource_fails() {
    let cloud = Arc::new(FakeCloud::new());
    let plan = Plan::builder("disable")
        .step(Step::update(
            ResourceHandle::distribution("ghost"),
            Payload::DistributionEnabled(false),
        ))
        .build()
        .unwrap();

    let report = orchestrator(&cloud).execute(&plan).await;

    assert_eq!(report.status, PlanStatus::Failed);
    assert!(report.failure().unwrap().message.contains("does not exist"));
    assert!(cloud.mutations().is_empty());
}

/// 削除済みリソースの削除は成功扱いになることを確認
#[tokio::test]
async fn test_delete_not_found_is_success() {
    let cloud = Arc::new(FakeCloud::new());
    let plan = Plan::builder("drop locks")
        .step(Step::delete(ResourceHandle::table("locks")))
        .build()
        .unwrap();

    let report = orchestrator(&cloud).execute(&plan).await;
    assert_eq!(report.status, PlanStatus::Completed);
    assert_eq!(report.steps[0].state, StepState::Skipped);

    // vanished between describe and delete
    let setup = lock_table_plan(RetryPolicy::none(), WaitPolicy::until_ready().every(Duration::ZERO));
    orchestrator(&cloud).execute(&setup).await;
    cloud.fail_next("delete", ClientError::NotFound("ResourceNotFoundException".into()));

    let report = orchestrator(&cloud).execute(&plan).await;
    assert_eq!(report.status, PlanStatus::Completed);
    assert_eq!(report.steps[0].state, StepState::Succeeded);
}

/// Create を2回呼んでもリソースは1つだけであることを確認
#[tokio::test]
async fn test_create_is_idempotent() {
    let cloud = FakeCloud::new();
    let ctx = ProviderContext::new();
    let handle = ResourceHandle::table("locks");
    let payload = Payload::Table(TableSpec::lock_table());

    let first = cloud.create(&ctx, &handle, &payload).await.unwrap();
    let second = cloud.create(&ctx, &handle, &payload).await.unwrap();

    assert_eq!(first.resource_id, second.resource_id);
    assert_ne!(second.status, ResourceStatus::Failed);
    assert_eq!(cloud.resource_count(), 1);
}

/// ステートバックエンドの作成と削除を確認
#[tokio::test]
async fn test_state_backend_lifecycle() {
    let cloud = Arc::new(FakeCloud::new());
    let backend = state_backend::BackendSpec::new("acme-tfstate", "acme-tflock");

    let setup = state_backend::setup(&backend, &Timing::immediate()).unwrap();
    let report = orchestrator(&cloud).execute(&setup).await;
    assert_eq!(report.status, PlanStatus::Completed, "{:?}", report.failure);
    assert_eq!(report.steps[1].polls, 2);

    let teardown = state_backend::teardown(&backend, &Timing::immediate()).unwrap();
    let report = orchestrator(&cloud).execute(&teardown).await;
    assert_eq!(report.status, PlanStatus::Completed, "{:?}", report.failure);
    // an empty bucket needs no emptying
    assert_eq!(report.steps[0].state, StepState::Skipped);
    assert_eq!(cloud.resource_count(), 0);
}

/// 独立したプランを並行実行してもレポート順が保たれることを確認
#[tokio::test]
async fn test_execute_many_keeps_plan_order() {
    let cloud = Arc::new(FakeCloud::new());
    let plans = vec![
        static_site::deploy(&SiteSpec::new("blog", "./blog").with_revision("a"), &Timing::immediate())
            .unwrap(),
        static_site::deploy(&SiteSpec::new("docs", "./docs").with_revision("b"), &Timing::immediate())
            .unwrap(),
    ];

    let reports = orchestrator(&cloud).execute_many(&plans, 2).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].plan, "deploy blog");
    assert_eq!(reports[1].plan, "deploy docs");
    assert!(reports.iter().all(|r| r.is_success()));
    assert!(cloud.exists(ResourceKind::Distribution, "blog"));
    assert!(cloud.exists(ResourceKind::Distribution, "docs"));
}
