use crate::report;
use colored::Colorize;
use stackflow_cloud::{
    AlwaysConfirm, ChangeSet, ExternalActionHandler, Orchestrator, PhraseGate, Plan, PlanStatus,
    ProviderContext, SystemClock, Timing, require_confirmation, require_zone_confirmation,
};
use stackflow_cloud_aws::{AwsCli, AwsProvider};
use stackflow_config::Settings;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 設定・コンテキスト・タイミングをまとめたコマンド実行環境
pub struct Runtime {
    pub settings: Settings,
    pub ctx: ProviderContext,
    pub timing: Timing,
}

impl Runtime {
    pub fn load(profile: Option<&str>, region: Option<&str>) -> anyhow::Result<Self> {
        let settings = stackflow_config::load()?;
        let ctx = settings.provider_context(profile, region);
        let timing = settings.timing();
        tracing::debug!(
            "Provider context: profile={:?} region={:?}",
            ctx.profile,
            ctx.region
        );
        Ok(Self {
            settings,
            ctx,
            timing,
        })
    }

    /// Ctrl-C の中断はプロバイダ内の待機にも伝わる
    pub fn orchestrator(&self) -> Orchestrator {
        let cancel = CancellationToken::new();
        let provider = AwsProvider::with_control(AwsCli::new(), Arc::new(SystemClock), cancel.clone());
        Orchestrator::new(Arc::new(provider), self.ctx.clone()).with_cancellation(cancel)
    }

    pub fn orchestrator_with(&self, operator: Arc<dyn ExternalActionHandler>) -> Orchestrator {
        self.orchestrator().with_operator(operator)
    }
}

/// 破壊的なプランの実行確認（--yes なら省略）
pub fn confirm(plan: &Plan, yes: bool) -> anyhow::Result<bool> {
    let confirmed = if yes {
        require_confirmation(&AlwaysConfirm, plan)?
    } else {
        require_confirmation(&PhraseGate::stdio(), plan)?
    };
    if !confirmed {
        println!("{}", "キャンセルしました。".yellow());
    }
    Ok(confirmed)
}

/// ゾーンのレコード削除・上書きの実行確認（--yes なら省略）
pub fn confirm_zone(zone: &str, changes: &ChangeSet, yes: bool) -> anyhow::Result<bool> {
    let confirmed = if yes {
        require_zone_confirmation(&AlwaysConfirm, zone, changes)?
    } else {
        require_zone_confirmation(&PhraseGate::stdio(), zone, changes)?
    };
    if !confirmed {
        println!("{}", "キャンセルしました。".yellow());
    }
    Ok(confirmed)
}

/// プランを実行し、Ctrl-C で中断できるようにする
pub async fn execute(orchestrator: Orchestrator, plan: &Plan) -> anyhow::Result<()> {
    println!("{} {}", "▶".blue(), plan.name().bold());
    println!("  {}", plan.summary().to_string().dimmed());

    let cancel = orchestrator.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "中断しています（次の待機で停止します）...".yellow());
            cancel.cancel();
        }
    });

    let report = orchestrator.execute(plan).await;
    watcher.abort();

    report::print(&report);

    match report.status {
        PlanStatus::Completed => Ok(()),
        PlanStatus::Suspended => {
            println!();
            println!(
                "{}",
                "外部作業の完了後、同じコマンドを再実行してください。".yellow()
            );
            Ok(())
        }
        PlanStatus::Cancelled => Err(anyhow::anyhow!(
            "プラン '{}' は中断されました。同じコマンドを再実行すると続きから処理します",
            report.plan
        )),
        PlanStatus::Failed => match report.into_result() {
            Err(failure) => Err(failure.into()),
            Ok(report) => Err(anyhow::anyhow!("プラン '{}' が失敗しました", report.plan)),
        },
    }
}
