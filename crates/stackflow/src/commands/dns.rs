use crate::DnsProvider;
use crate::runtime::{self, Runtime};
use colored::Colorize;
use serde::Deserialize;
use stackflow_cloud::{ChangeSet, DnsRecord, SystemClock, ZoneClient, ZoneReconciler};
use stackflow_cloud_aws::{AwsCli, Route53Zone};
use stackflow_cloud_cloudflare::{CloudflareDns, DnsConfig};
use std::path::{Path, PathBuf};

pub struct TakeoverArgs {
    pub provider: DnsProvider,
    pub zone: Option<String>,
    pub records: PathBuf,
    pub filter: Option<String>,
    pub apply: bool,
    pub yes: bool,
}

/// レコード定義ファイル: リスト、または `records:` キーの下のリスト
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    List(Vec<DnsRecord>),
    Wrapped { records: Vec<DnsRecord> },
}

/// YAML（JSON を含む）のレコード定義を読み込む
pub fn load_records(path: &Path) -> anyhow::Result<Vec<DnsRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!(
            "レコード定義ファイルを読み込めません ({}): {}",
            path.display(),
            e
        )
    })?;
    let file: RecordsFile = serde_yaml::from_str(&content).map_err(|e| {
        anyhow::anyhow!(
            "レコード定義ファイルの形式が不正です ({}): {}",
            path.display(),
            e
        )
    })?;
    Ok(match file {
        RecordsFile::List(records) => records,
        RecordsFile::Wrapped { records } => records,
    })
}

async fn connect(
    runtime: &Runtime,
    provider: DnsProvider,
    zone: Option<String>,
) -> anyhow::Result<Box<dyn ZoneClient>> {
    match provider {
        DnsProvider::Cloudflare => {
            let zone = zone
                .or_else(|| runtime.settings.cloudflare.zone_id.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!("--zone を指定するか設定ファイルに cloudflare.zone_id を記述してください")
                })?;
            let config = DnsConfig::from_env(&runtime.settings.cloudflare.api_token_env, zone)?;
            Ok(Box::new(CloudflareDns::connect(config).await?))
        }
        DnsProvider::Route53 => {
            let zone = zone.ok_or_else(|| anyhow::anyhow!("--zone を指定してください"))?;
            let zone = Route53Zone::lookup(AwsCli::new(), runtime.ctx.clone(), &zone).await?;
            Ok(Box::new(zone))
        }
    }
}

fn print_changes(changes: &ChangeSet) {
    for record in &changes.create {
        println!("  {} {}", "+".green(), record);
    }
    for change in &changes.update {
        println!(
            "  {} {} → {}",
            "~".yellow(),
            change.current,
            change.desired.content
        );
    }
    for record in &changes.delete {
        println!("  {} {}", "-".red(), record);
    }
    for skipped in &changes.unmanaged_skipped {
        println!(
            "  {} {} ({})",
            "=".dimmed(),
            skipped.record.to_string().dimmed(),
            skipped.reason
        );
    }
    println!();
    println!("{}", changes.to_string().bold());
}

pub async fn takeover(runtime: &Runtime, args: TakeoverArgs) -> anyhow::Result<()> {
    let desired = load_records(&args.records)?;
    println!(
        "{} ({} 件)",
        "レコード定義を読み込みました".blue(),
        desired.len()
    );

    let zone = connect(runtime, args.provider, args.zone).await?;
    let live = zone.list_records().await?;
    println!("ゾーン ({}): {} 件のレコード", zone.name().cyan(), live.len());

    let mut reconciler = ZoneReconciler::new(&runtime.settings.dns.managed_marker)
        .with_delete_pause(runtime.timing.delete_pause);
    if let Some(filter) = args.filter {
        reconciler = reconciler.with_target_filter(filter);
    }

    let changes = reconciler.plan(&desired, &live);
    println!();
    print_changes(&changes);

    if changes.is_empty() {
        println!("{}", "✓ 変更はありません".green());
        return Ok(());
    }
    if !args.apply {
        println!();
        println!("{}", "適用するには --apply を指定してください".yellow());
        return Ok(());
    }

    println!();
    if !runtime::confirm_zone(zone.name(), &changes, args.yes)? {
        return Ok(());
    }

    let result = reconciler
        .apply(zone.as_ref(), &changes, &SystemClock)
        .await;

    println!();
    for done in &result.succeeded {
        println!("  {} {}", "✓".green(), done.message);
    }
    for failed in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failed.action_id,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    if result.is_success() {
        println!();
        println!(
            "{} ({} ms)",
            "✓ ゾーンを更新しました".green(),
            result.duration_ms
        );
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} 件の変更に失敗しました",
            result.failed.len()
        ))
    }
}
