//! Single-run and cyclic execution on top of the [`Coordinator`].

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, CycleReport};
use crate::executor::{ContentLoader, SkillExecutor, ToolExecutor};
use crate::ui::{self, CycleProgress};

/// Transitions shown after a failed cycle unless the full history was requested.
const FAILURE_HISTORY_TAIL: usize = 10;

/// Totals across the cycles of one `run_forever` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u32,
    pub failed_cycles: u32,
    pub processed: u32,
}

impl RunSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.processed += report.processed_count;
        if !report.is_success() {
            self.failed_cycles += 1;
        }
    }
}

pub struct CycleRunner<S, T, L> {
    coordinator: Coordinator<S, T, L>,
    show_progress: bool,
    show_history: bool,
}

impl<S, T, L> CycleRunner<S, T, L>
where
    S: SkillExecutor,
    T: ToolExecutor,
    L: ContentLoader,
{
    pub fn new(coordinator: Coordinator<S, T, L>) -> Self {
        Self {
            coordinator,
            show_progress: false,
            show_history: false,
        }
    }

    /// Print every transition of every cycle, not only the tail of failed ones.
    pub fn with_history(mut self, show: bool) -> Self {
        self.show_history = show;
        self
    }

    /// Draw a spinner and a summary line for every cycle.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run one cycle from a fresh state.
    pub async fn run_once(&self) -> CycleReport {
        let report = if self.show_progress {
            let source = self.coordinator.locations().source.display().to_string();
            let progress = CycleProgress::start(&source);
            let report = self
                .coordinator
                .run_cycle_with(None, |state| progress.update(state))
                .await;
            progress.complete(&report);
            if let Some(tail) = self.history_tail(&report) {
                progress.print_history(&report, tail);
            }
            report
        } else {
            self.coordinator.run_cycle(None).await
        };

        match &report.error {
            None => info!(
                cycle = %report.cycle_id,
                processed = report.processed_count,
                duration_ms = report.duration_ms(),
                "cycle completed"
            ),
            Some(err) => {
                error!(
                    cycle = %report.cycle_id,
                    processed = report.processed_count,
                    stage = %err.stage(),
                    "cycle failed: {err}"
                );
                if !self.show_progress {
                    for line in ui::history_lines(&report, Some(FAILURE_HISTORY_TAIL)) {
                        warn!(cycle = %report.cycle_id, "{line}");
                    }
                }
            }
        }
        report
    }

    // `None` hides the history, `Some(None)` shows all of it.
    fn history_tail(&self, report: &CycleReport) -> Option<Option<usize>> {
        if self.show_history {
            Some(None)
        } else if !report.is_success() {
            Some(Some(FAILURE_HISTORY_TAIL))
        } else {
            None
        }
    }

    /// Run a cycle, wait `interval`, repeat until `shutdown` resolves.
    ///
    /// A failed cycle does not stop the loop. Shutdown is only observed
    /// between cycles, so a running cycle always finishes.
    pub async fn run_forever<F>(&self, interval: Duration, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        loop {
            let report = self.run_once().await;
            summary.record(&report);
            info!(
                cycles = summary.cycles,
                failed = summary.failed_cycles,
                next_in_secs = interval.as_secs(),
                "waiting for next cycle"
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        summary
    }
}
