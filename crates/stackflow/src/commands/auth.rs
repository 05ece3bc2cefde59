use crate::runtime::Runtime;
use colored::Colorize;
use stackflow_cloud_aws::AwsProvider;

pub async fn handle(runtime: &Runtime) -> anyhow::Result<()> {
    println!("{}", "AWS の認証状態を確認中...".blue());
    if let Some(profile) = &runtime.ctx.profile {
        println!("プロファイル: {}", profile.cyan());
    }

    let status = AwsProvider::default().check_auth(&runtime.ctx).await;
    if status.authenticated {
        println!(
            "{} {}",
            "✓ 認証済み:".green(),
            status.account_info.unwrap_or_default()
        );
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "認証に失敗しました: {}",
            status.error.unwrap_or_default()
        ))
    }
}
