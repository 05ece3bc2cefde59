use crate::operator::TerminalOperator;
use crate::runtime::{self, Runtime};
use colored::Colorize;
use stackflow_cloud::blueprint::certificate;
use std::sync::Arc;

pub async fn request(runtime: &Runtime, domain: &str, sans: &[String]) -> anyhow::Result<()> {
    println!("{}", "証明書をリクエストします...".blue().bold());
    println!("ドメイン: {}", domain.cyan());
    for san in sans {
        println!("  + {}", san.cyan());
    }

    let plan = certificate::request(domain, sans, &runtime.timing)?;
    let orchestrator = runtime.orchestrator_with(Arc::new(TerminalOperator));
    runtime::execute(orchestrator, &plan).await
}
