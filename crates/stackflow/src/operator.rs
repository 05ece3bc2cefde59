use colored::Colorize;
use stackflow_cloud::{ExternalActionHandler, ExternalActionRequest, ExternalActionResponse};
use std::io::Write;

/// チェックポイントで端末のオペレーターに確認する
pub struct TerminalOperator;

impl TerminalOperator {
    fn ask(&self) -> std::io::Result<bool> {
        print!("完了しましたか？ [y/N]: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        Ok(input.trim().eq_ignore_ascii_case("y"))
    }
}

impl ExternalActionHandler for TerminalOperator {
    fn request(&self, request: &ExternalActionRequest) -> ExternalActionResponse {
        println!();
        println!("{} {}", "⏸".yellow(), request.prompt.bold());

        if let Some(record) = request.validation_record() {
            let field = |key: &str| record[key].as_str().unwrap_or("-").to_string();
            println!("  以下の DNS レコードを追加してください:");
            println!("    名前:   {}", field("name").cyan());
            println!("    タイプ: {}", field("type").cyan());
            println!("    値:     {}", field("value").cyan());
        }

        match self.ask() {
            Ok(true) => ExternalActionResponse::Confirmed,
            Ok(false) => ExternalActionResponse::Deferred,
            Err(e) => {
                tracing::warn!("Failed to read operator answer: {}", e);
                ExternalActionResponse::Deferred
            }
        }
    }
}
