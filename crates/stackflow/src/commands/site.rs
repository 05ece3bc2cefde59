use crate::runtime::{self, Runtime};
use colored::Colorize;
use stackflow_cloud::blueprint::static_site::{self, SiteSpec};
use std::path::PathBuf;

pub struct SiteArgs {
    pub name: String,
    pub bucket: Option<String>,
    pub source: PathBuf,
    pub domains: Vec<String>,
    pub certificate_arn: Option<String>,
    pub revision: Option<String>,
    pub spa: bool,
}

fn site_spec(runtime: &Runtime, name: &str, source: PathBuf, bucket: Option<String>) -> SiteSpec {
    let mut site = SiteSpec::new(name, source);
    if let Some(bucket) = bucket {
        site = site.with_bucket(bucket);
    }
    if let Some(region) = &runtime.ctx.region {
        site = site.with_region(region);
    }
    site
}

pub async fn deploy(runtime: &Runtime, args: SiteArgs) -> anyhow::Result<()> {
    if !args.source.is_dir() {
        return Err(anyhow::anyhow!(
            "アップロード元のディレクトリが見つかりません: {}",
            args.source.display()
        ));
    }

    let mut site = site_spec(runtime, &args.name, args.source, args.bucket);
    if !args.domains.is_empty() {
        let certificate_arn = args.certificate_arn.ok_or_else(|| {
            anyhow::anyhow!(
                "--domain を指定する場合は --certificate-arn も必要です\nヒント: stackflow cert request --domain {}",
                args.domains[0]
            )
        })?;
        site = site.with_aliases(args.domains, certificate_arn);
    }
    if let Some(revision) = args.revision {
        site = site.with_revision(revision);
    }
    if args.spa {
        site = site.spa();
    }

    println!("{}", "静的サイトをデプロイします...".blue().bold());
    println!("サイト: {}", site.name.cyan());
    println!("バケット: {}", site.bucket.cyan());
    println!("ソース: {}", site.source.display().to_string().cyan());

    let plan = static_site::deploy(&site, &runtime.timing)?;
    runtime::execute(runtime.orchestrator(), &plan).await
}

pub async fn teardown(
    runtime: &Runtime,
    name: &str,
    bucket: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let site = site_spec(runtime, name, PathBuf::new(), bucket);
    let plan = static_site::teardown(&site, &runtime.timing)?;

    println!("{}", "静的サイトを削除します...".yellow().bold());
    println!("サイト: {}", site.name.cyan());
    println!("バケット: {}", site.bucket.cyan());
    println!();

    if !runtime::confirm(&plan, yes)? {
        return Ok(());
    }
    runtime::execute(runtime.orchestrator(), &plan).await
}
