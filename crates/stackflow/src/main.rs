mod commands;
mod operator;
mod report;
mod runtime;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "収束するまで待つ。何度でも安全に。", long_about = None)]
struct Cli {
    /// AWS プロファイル（設定ファイルより優先）
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// 既定リージョン（設定ファイルより優先）
    #[arg(long, global = true)]
    region: Option<String>,

    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 静的サイト（S3 + CloudFront）を管理
    #[command(subcommand)]
    Site(SiteCommands),
    /// ACM 証明書を管理
    #[command(subcommand)]
    Cert(CertCommands),
    /// Terraform のリモートステート用バックエンドを管理
    #[command(subcommand)]
    Backend(BackendCommands),
    /// DNS ゾーンを管理
    #[command(subcommand)]
    Dns(DnsCommands),
    /// AWS の認証状態を確認
    Auth,
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum SiteCommands {
    /// バケット・配信・アップロード・キャッシュ削除を一括で実行
    Deploy {
        /// サイト名（配信の識別子）
        #[arg(short, long)]
        name: String,
        /// アップロードするディレクトリ
        #[arg(short, long)]
        source: PathBuf,
        /// バケット名（省略時はサイト名）
        #[arg(long)]
        bucket: Option<String>,
        /// 代替ドメイン名（複数指定可）
        #[arg(long = "domain")]
        domains: Vec<String>,
        /// 代替ドメイン用の証明書 ARN
        #[arg(long)]
        certificate_arn: Option<String>,
        /// コンテンツのリビジョン（再実行時のアップロードを省略）
        #[arg(long)]
        revision: Option<String>,
        /// 403/404 を /index.html に返す（SPA 向け）
        #[arg(long)]
        spa: bool,
    },
    /// 配信とバケットを削除
    Teardown {
        /// サイト名
        #[arg(short, long)]
        name: String,
        /// バケット名（省略時はサイト名）
        #[arg(long)]
        bucket: Option<String>,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CertCommands {
    /// DNS 検証で証明書を発行
    Request {
        /// ドメイン名
        #[arg(short, long)]
        domain: String,
        /// 追加のドメイン名（複数指定可）
        #[arg(long = "san")]
        sans: Vec<String>,
    },
}

#[derive(Subcommand)]
enum BackendCommands {
    /// ステート用バケットとロックテーブルを作成
    Setup {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        table: String,
    },
    /// ステート用バケットとロックテーブルを削除
    Destroy {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        table: String,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DnsProvider {
    Cloudflare,
    Route53,
}

#[derive(Subcommand)]
enum DnsCommands {
    /// 既存ゾーンをレコード定義に合わせる（管理マーカー付きのレコードのみ削除）
    Takeover {
        /// DNS プロバイダー
        #[arg(long, value_enum)]
        provider: DnsProvider,
        /// ゾーン名またはゾーン ID
        #[arg(long)]
        zone: Option<String>,
        /// レコード定義ファイル（YAML / JSON）
        #[arg(long)]
        records: PathBuf,
        /// 削除対象をこの文字列を含むレコードに限定
        #[arg(long)]
        filter: Option<String>,
        /// 変更を適用する（省略時は差分の表示のみ）
        #[arg(long)]
        apply: bool,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let runtime = runtime::Runtime::load(cli.profile.as_deref(), cli.region.as_deref())?;

    match cli.command {
        Commands::Site(SiteCommands::Deploy {
            name,
            source,
            bucket,
            domains,
            certificate_arn,
            revision,
            spa,
        }) => {
            let site = commands::site::SiteArgs {
                name,
                bucket,
                source,
                domains,
                certificate_arn,
                revision,
                spa,
            };
            commands::site::deploy(&runtime, site).await?;
        }
        Commands::Site(SiteCommands::Teardown { name, bucket, yes }) => {
            commands::site::teardown(&runtime, &name, bucket, yes).await?;
        }
        Commands::Cert(CertCommands::Request { domain, sans }) => {
            commands::cert::request(&runtime, &domain, &sans).await?;
        }
        Commands::Backend(BackendCommands::Setup { bucket, table }) => {
            commands::backend::setup(&runtime, &bucket, &table).await?;
        }
        Commands::Backend(BackendCommands::Destroy { bucket, table, yes }) => {
            commands::backend::destroy(&runtime, &bucket, &table, yes).await?;
        }
        Commands::Dns(DnsCommands::Takeover {
            provider,
            zone,
            records,
            filter,
            apply,
            yes,
        }) => {
            let takeover = commands::dns::TakeoverArgs {
                provider,
                zone,
                records,
                filter,
                apply,
                yes,
            };
            commands::dns::takeover(&runtime, takeover).await?;
        }
        Commands::Auth => {
            commands::auth::handle(&runtime).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
