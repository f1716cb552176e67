//! Terminal output: a spinner while a cycle runs and a coloured summary after.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::coordinator::CycleReport;
use crate::state_machine::ProcessingState;

/// Spinner tracking one cycle.
pub struct CycleProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl CycleProgress {
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("START: {description}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Show the stage the cycle just entered.
    pub fn update(&self, state: &ProcessingState) {
        self.pb.set_message(stage_line(state));
    }

    pub fn complete(&self, report: &CycleReport) {
        self.pb.finish_and_clear();
        match &report.error {
            None => println!(
                "  {} Processed {} item(s) in {} ms",
                self.green.apply_to("✓"),
                report.processed_count,
                report.duration_ms()
            ),
            Some(err) => {
                println!(
                    "  {} Cycle stopped at {} after {} item(s): {err}",
                    self.red.apply_to("✗"),
                    report.final_stage,
                    report.processed_count
                );
                if let Some(item) = report.state.current_item() {
                    println!("    {}", self.dim.apply_to(format!("item: {item}")));
                }
            }
        }
        println!("    {}", self.dim.apply_to(format!("cycle {}", report.cycle_id)));
    }

    /// Print the recorded transitions, or only the last `tail` of them.
    pub fn print_history(&self, report: &CycleReport, tail: Option<usize>) {
        println!("{}", self.dim.apply_to("─── Transitions ───"));
        for line in history_lines(report, tail) {
            println!("    {}", self.dim.apply_to(line));
        }
    }
}

/// One line per transition: `CHECK_QUEUE → ANALYZE_ITEM  Found 2 item(s) to process`.
pub fn history_lines(report: &CycleReport, tail: Option<usize>) -> Vec<String> {
    let transitions = &report.transitions;
    let skip = tail.map_or(0, |n| transitions.len().saturating_sub(n));
    transitions
        .iter()
        .skip(skip)
        .map(|t| format!("{} → {}  {}", t.from, t.to, t.reason))
        .collect()
}

fn stage_line(state: &ProcessingState) -> String {
    let total = state.queue().len();
    match state.current_item() {
        Some(item) => format!(
            "{} [{}/{}] {item}",
            state.stage(),
            (state.cursor() + 1).min(total),
            total
        ),
        None => format!("{} ({} processed)", state.stage(), state.processed_count()),
    }
}
