use colored::Colorize;
use stackflow_cloud::{PlanReport, PlanStatus, StepRecord, StepState};

fn marker(state: StepState) -> colored::ColoredString {
    match state {
        StepState::Succeeded => "✓".green(),
        StepState::Skipped => "-".dimmed(),
        StepState::Failed => "✗".red(),
        StepState::WaitingOnExternalAction => "⏸".yellow(),
        StepState::Executing => "…".blue(),
        StepState::Pending => "·".dimmed(),
    }
}

fn print_step(step: &StepRecord) {
    let mut line = format!(
        "  {} {} ({} {})",
        marker(step.state),
        step.label,
        step.action,
        step.handle
    );
    if step.mutated && step.attempts > 1 {
        line.push_str(&format!(" [{} 回試行]", step.attempts));
    }
    if step.polls > 0 {
        line.push_str(&format!(" [確認 {} 回]", step.polls));
    }
    println!("{}", line);

    if step.wait_timed_out {
        println!(
            "      {}",
            "⚠ 待機がタイムアウトしました（最後に確認した状態で続行）".yellow()
        );
    }
    if let Some(error) = &step.error {
        println!("      {}", error.red());
    }
}

/// 実行結果を表示
pub fn print(report: &PlanReport) {
    println!();
    for step in &report.steps {
        print_step(step);
    }

    let elapsed = report.finished_at - report.started_at;
    let status = match report.status {
        PlanStatus::Completed => "完了".green().bold(),
        PlanStatus::Failed => "失敗".red().bold(),
        PlanStatus::Suspended => "保留".yellow().bold(),
        PlanStatus::Cancelled => "中断".yellow().bold(),
    };

    println!();
    println!(
        "{} 変更 {} 件 / スキップ {} 件 / {} 秒",
        status,
        report.mutation_count(),
        report.count(StepState::Skipped),
        elapsed.num_seconds()
    );
}
