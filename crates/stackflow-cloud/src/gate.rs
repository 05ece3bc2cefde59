//! Caller-side confirmation before destructive plans run

use crate::dns::ChangeSet;
use crate::plan::Plan;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Phrase the operator must type to allow a destructive plan
pub const CONFIRMATION_PHRASE: &str = "DELETE";

/// Asks whether a destructive change may run.
///
/// Consulted before the plan is handed to the orchestrator, never during a run.
pub trait ConfirmationGate {
    /// Show `title` and the irreversible `changes`, then ask
    fn confirm_changes(&self, title: &str, changes: &[String]) -> std::io::Result<bool>;

    fn confirm(&self, plan: &Plan) -> std::io::Result<bool> {
        let changes: Vec<String> = plan
            .steps()
            .iter()
            .filter(|s| s.is_destructive())
            .map(|s| s.label.clone())
            .collect();
        self.confirm_changes(&format!("Plan '{}'", plan.name()), &changes)
    }
}

/// Gate that always allows (`--yes`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmationGate for AlwaysConfirm {
    fn confirm_changes(&self, _title: &str, _changes: &[String]) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Prints the destructive steps and requires the literal phrase on `input`
pub struct PhraseGate<R, W> {
    io: Mutex<(R, W)>,
    phrase: String,
}

impl<R: BufRead, W: Write> PhraseGate<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
            phrase: CONFIRMATION_PHRASE.to_string(),
        }
    }

    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = phrase.into();
        self
    }
}

impl PhraseGate<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConfirmationGate for PhraseGate<R, W> {
    fn confirm_changes(&self, title: &str, changes: &[String]) -> std::io::Result<bool> {
        let mut io = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let (input, output) = &mut *io;

        writeln!(output, "{} will make irreversible changes:", title)?;
        for change in changes {
            writeln!(output, "  - {}", change)?;
        }
        write!(output, "Type {} to continue: ", self.phrase)?;
        output.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(answer.trim() == self.phrase)
    }
}

/// Ask `gate` only when the plan is destructive
pub fn require_confirmation(gate: &dyn ConfirmationGate, plan: &Plan) -> std::io::Result<bool> {
    if !plan.is_destructive() {
        return Ok(true);
    }
    gate.confirm(plan)
}

/// Ask `gate` only when applying `changes` would delete or overwrite records
pub fn require_zone_confirmation(
    gate: &dyn ConfirmationGate,
    zone: &str,
    changes: &ChangeSet,
) -> std::io::Result<bool> {
    if changes.delete.is_empty() && changes.update.is_empty() {
        return Ok(true);
    }
    let lines: Vec<String> = changes
        .update
        .iter()
        .map(|u| format!("overwrite {} with '{}'", u.current, u.desired.content))
        .chain(changes.delete.iter().map(|r| format!("delete {}", r)))
        .collect();
    gate.confirm_changes(&format!("Zone '{}'", zone), &lines)
}
