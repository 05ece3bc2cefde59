use crate::runtime::{self, Runtime};
use colored::Colorize;
use stackflow_cloud::blueprint::state_backend::{self, BackendSpec};

fn backend_spec(runtime: &Runtime, bucket: &str, table: &str) -> BackendSpec {
    let backend = BackendSpec::new(bucket, table);
    match &runtime.ctx.region {
        Some(region) => backend.with_region(region),
        None => backend,
    }
}

pub async fn setup(runtime: &Runtime, bucket: &str, table: &str) -> anyhow::Result<()> {
    let backend = backend_spec(runtime, bucket, table);
    println!("{}", "ステート用バックエンドを作成します...".blue().bold());
    println!("バケット: {}", backend.bucket.cyan());
    println!("ロックテーブル: {}", backend.table.cyan());

    let plan = state_backend::setup(&backend, &runtime.timing)?;
    runtime::execute(runtime.orchestrator(), &plan).await
}

pub async fn destroy(runtime: &Runtime, bucket: &str, table: &str, yes: bool) -> anyhow::Result<()> {
    let backend = backend_spec(runtime, bucket, table);
    println!("{}", "ステート用バックエンドを削除します...".yellow().bold());
    println!(
        "{}",
        "警告: バケット内のすべてのバージョンが削除されます。".yellow()
    );
    println!();

    let plan = state_backend::teardown(&backend, &runtime.timing)?;
    if !runtime::confirm(&plan, yes)? {
        return Ok(());
    }
    runtime::execute(runtime.orchestrator(), &plan).await
}
