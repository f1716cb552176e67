use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::error::{ContractViolation, CycleError};
use crate::executor::{
    ContentLoader, ExecutorOutput, SkillContext, SkillExecutor, ToolExecutor, ToolRequest,
};
use crate::state_machine::handlers::{self, Applied};
use crate::state_machine::{Action, ProcessingState, Stage, ToolOperation, next_action};

/// Default bound on consecutive steps that complete no item.
pub const DEFAULT_MAX_IDLE_STEPS: usize = 100;

/// Where the tool operations point: source container, archive and report sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locations {
    pub source: PathBuf,
    pub archive: PathBuf,
    pub report: PathBuf,
}

/// One recorded stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Outcome of one cycle.
///
/// On failure `state` is the last successfully applied state, so the item
/// under its cursor is the one that needs attention.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: String,
    pub processed_count: u32,
    pub final_stage: Stage,
    pub error: Option<CycleError>,
    pub state: ProcessingState,
    pub transitions: Vec<StageTransition>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

/// Drives a `ProcessingState` through the workflow.
///
/// The transition table picks the executor, the executor does the work, a
/// handler turns the result into the next state. Nothing here asks a model
/// what to do next.
pub struct Coordinator<S, T, L> {
    skills: S,
    tools: T,
    loader: L,
    locations: Locations,
    max_idle_steps: usize,
}

impl<S, T, L> Coordinator<S, T, L>
where
    S: SkillExecutor,
    T: ToolExecutor,
    L: ContentLoader,
{
    pub fn new(skills: S, tools: T, loader: L, locations: Locations) -> Self {
        Self {
            skills,
            tools,
            loader,
            locations,
            max_idle_steps: DEFAULT_MAX_IDLE_STEPS,
        }
    }

    /// Fail a cycle that goes `max_idle_steps` steps without archiving an item.
    /// The count restarts on every archive, so queue length is unbounded.
    pub fn with_max_idle_steps(mut self, max_idle_steps: usize) -> Self {
        self.max_idle_steps = max_idle_steps;
        self
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    /// Run one stage: look up its action, execute it, apply the result.
    ///
    /// A terminal state is returned unchanged. On error the caller's state is
    /// still the last good one.
    pub async fn step(&self, state: &ProcessingState) -> Result<(ProcessingState, Stage), CycleError> {
        self.apply_step(state)
            .await
            .map(|applied| (applied.state, applied.next))
    }

    async fn apply_step(&self, state: &ProcessingState) -> Result<Applied, CycleError> {
        let stage = state.stage();
        if stage.is_terminal() {
            return Ok(Applied {
                state: state.clone(),
                next: stage,
                reason: "Cycle already complete".to_string(),
            });
        }

        let entry = next_action(stage).map_err(|e| CycleError::contract(stage, e))?;
        debug!(
            stage = %stage,
            kind = %entry.kind(),
            operation = entry.operation_name(),
            "{}",
            entry.description
        );

        let mut loaded = None;
        let output = match entry.action {
            Action::Skill(operation) => {
                let with_content = self.load_content(stage, state).await?;
                let context = SkillContext {
                    identifier: with_content.current_item().unwrap_or_default().to_string(),
                    content: with_content.current_content().unwrap_or_default().to_string(),
                };
                let output = self
                    .skills
                    .run(operation, &context)
                    .await
                    .map_err(|e| CycleError::execution(stage, e))?;
                loaded = Some(with_content);
                ExecutorOutput::Skill(output)
            }
            Action::Tool(operation) => {
                let request = self.tool_request(stage, operation, state)?;
                let outcome = self
                    .tools
                    .run(operation, request)
                    .await
                    .map_err(|e| CycleError::execution(stage, e))?;
                debug!(operation = operation.name(), success = outcome.success, "{}", outcome.message);
                ExecutorOutput::Tool(outcome)
            }
        };

        let working = loaded.as_ref().unwrap_or(state);
        handlers::apply(stage, working, output, Utc::now())
    }

    /// Run a full cycle from `initial` (or a fresh state) to `COMPLETED` or the first error.
    pub async fn run_cycle(&self, initial: Option<ProcessingState>) -> CycleReport {
        self.run_cycle_with(initial, |_| {}).await
    }

    /// Like [`run_cycle`](Self::run_cycle), calling `on_step` with every newly applied state.
    pub async fn run_cycle_with<F>(&self, initial: Option<ProcessingState>, mut on_step: F) -> CycleReport
    where
        F: FnMut(&ProcessingState),
    {
        let cycle_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let span = info_span!("cycle", id = %cycle_id);
        let mut state = initial.unwrap_or_default();

        let (state, transitions, error) = async move {
            let mut transitions = Vec::new();
            let mut archived: HashSet<String> = HashSet::new();
            let mut idle_steps = 0usize;

            while !state.stage().is_terminal() {
                if idle_steps >= self.max_idle_steps {
                    let err = CycleError::StepLimit {
                        stage: state.stage(),
                        limit: self.max_idle_steps,
                    };
                    error!("{err}");
                    return (state, transitions, Some(err));
                }
                idle_steps += 1;

                let applied = match self.apply_step(&state).await {
                    Ok(applied) => applied,
                    Err(err) => {
                        error!(stage = %err.stage(), item = state.current_item().unwrap_or("-"), "{err}");
                        return (state, transitions, Some(err));
                    }
                };

                let from = state.stage();
                if applied.state.processed_count() > state.processed_count() {
                    idle_steps = 0;
                    if let Some(item) = state.current_item() {
                        archived.insert(item.to_string());
                    }
                }
                if from == Stage::CheckNext {
                    if let Some(item) = applied.state.current_item().filter(|i| archived.contains(*i)) {
                        let err = CycleError::contract(from, ContractViolation::NotDrained(item.to_string()));
                        error!(stage = %from, item, "{err}");
                        return (state, transitions, Some(err));
                    }
                }

                info!(
                    from = %from,
                    to = %applied.next,
                    item = applied.state.current_item().unwrap_or("-"),
                    processed = applied.state.processed_count(),
                    remaining = applied.state.remaining(),
                    "{}",
                    applied.reason
                );
                transitions.push(StageTransition {
                    from,
                    to: applied.next,
                    reason: applied.reason,
                    at: Utc::now(),
                });
                on_step(&applied.state);
                state = applied.state;
            }

            (state, transitions, None)
        }
        .instrument(span)
        .await;

        CycleReport {
            cycle_id,
            processed_count: state.processed_count(),
            final_stage: state.stage(),
            error,
            state,
            transitions,
            started_at,
            completed_at: Utc::now(),
        }
    }

    // Returns `state` with the current item's content present, loading it if needed.
    async fn load_content(
        &self,
        stage: Stage,
        state: &ProcessingState,
    ) -> Result<ProcessingState, CycleError> {
        let Some(identifier) = state.current_item() else {
            return Err(no_current_item(stage, state));
        };
        if state.current_content().is_some() {
            return Ok(state.clone());
        }
        let content = self
            .loader
            .load(identifier)
            .await
            .map_err(|e| CycleError::execution(stage, e))?;
        Ok(state.clone().with_content(content))
    }

    fn tool_request(
        &self,
        stage: Stage,
        operation: ToolOperation,
        state: &ProcessingState,
    ) -> Result<ToolRequest, CycleError> {
        match operation {
            ToolOperation::EnumerateQueue | ToolOperation::RescanQueue => Ok(ToolRequest::Enumerate {
                source: self.locations.source.clone(),
            }),
            ToolOperation::PersistResult => {
                let result = state
                    .current_result()
                    .cloned()
                    .ok_or_else(|| CycleError::contract(stage, ContractViolation::MissingResult(stage)))?;
                Ok(ToolRequest::Persist {
                    destination: self.locations.report.clone(),
                    result,
                })
            }
            ToolOperation::ArchiveItem => {
                let item = state
                    .current_item()
                    .ok_or_else(|| no_current_item(stage, state))?;
                Ok(ToolRequest::Archive {
                    item: item.to_string(),
                    destination: self.locations.archive.clone(),
                })
            }
        }
    }
}

fn no_current_item(stage: Stage, state: &ProcessingState) -> CycleError {
    CycleError::contract(
        stage,
        ContractViolation::NoCurrentItem {
            stage,
            cursor: state.cursor(),
            len: state.queue().len(),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ExecutionError;
    use crate::executor::{SkillOutput, ToolOutcome};
    use crate::state_machine::{
        AnalysisOutput, ExtractionResult, Sentiment, SkillOperation, Urgency,
    };

    /// In-memory source container that records every tool call.
    #[derive(Default)]
    struct FakeTools {
        inbox: Mutex<Vec<String>>,
        arrivals: Mutex<Vec<String>>,
        log: Mutex<Vec<String>>,
        persisted: Mutex<Vec<ExtractionResult>>,
        fail_persist_on: Option<String>,
        keep_archived: bool,
    }

    impl FakeTools {
        fn with_items(items: &[&str]) -> Self {
            Self {
                inbox: Mutex::new(items.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn calls(&self, prefix: &str) -> usize {
            self.log().iter().filter(|l| l.starts_with(prefix)).count()
        }
    }

    impl ToolExecutor for FakeTools {
        async fn run(
            &self,
            operation: ToolOperation,
            request: ToolRequest,
        ) -> Result<ToolOutcome, ExecutionError> {
            match request {
                ToolRequest::Enumerate { .. } => {
                    let mut inbox = self.inbox.lock().unwrap();
                    if operation == ToolOperation::RescanQueue {
                        inbox.extend(self.arrivals.lock().unwrap().drain(..));
                    }
                    self.log.lock().unwrap().push(operation.name().to_string());
                    Ok(ToolOutcome::listing(inbox.clone()))
                }
                ToolRequest::Persist { result, .. } => {
                    self.log
                        .lock()
                        .unwrap()
                        .push(format!("persist:{}", result.source));
                    if self.fail_persist_on.as_deref() == Some(result.source.as_str()) {
                        return Ok(ToolOutcome::failed("disk full"));
                    }
                    self.persisted.lock().unwrap().push(result);
                    Ok(ToolOutcome::ok("saved"))
                }
                ToolRequest::Archive { item, .. } => {
                    self.log.lock().unwrap().push(format!("archive:{item}"));
                    if !self.keep_archived {
                        self.inbox.lock().unwrap().retain(|i| *i != item);
                    }
                    Ok(ToolOutcome::ok("moved"))
                }
            }
        }
    }

    /// Flags content containing "urgent" as high urgency, negative sentiment.
    #[derive(Default)]
    struct FakeSkills {
        calls: AtomicUsize,
    }

    impl SkillExecutor for FakeSkills {
        async fn run(
            &self,
            operation: SkillOperation,
            context: &SkillContext,
        ) -> Result<SkillOutput, ExecutionError> {
            assert_eq!(operation, SkillOperation::AnalyzeItem);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let urgent = context.content.contains("urgent");
            Ok(SkillOutput::Analysis(AnalysisOutput {
                topic: format!("topic of {}", context.identifier),
                category: "Support".into(),
                contacts: String::new(),
                urgency: if urgent { Urgency::High } else { Urgency::Medium },
                sentiment: if urgent { Sentiment::Negative } else { Sentiment::Neutral },
                summary: context.content.clone(),
                event_time: None,
            }))
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        loads: AtomicUsize,
        missing: Option<String>,
    }

    impl ContentLoader for FakeLoader {
        async fn load(&self, identifier: &str) -> Result<String, ExecutionError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.missing.as_deref() == Some(identifier) {
                return Err(ExecutionError::NotFound(identifier.to_string()));
            }
            if identifier == "a.txt" {
                return Ok("urgent: the server is down".into());
            }
            Ok(format!("hello from {identifier}"))
        }
    }

    fn locations() -> Locations {
        Locations {
            source: "inbox".into(),
            archive: "archive".into(),
            report: "report.csv".into(),
        }
    }

    fn coordinator(tools: FakeTools) -> Coordinator<FakeSkills, FakeTools, FakeLoader> {
        Coordinator::new(FakeSkills::default(), tools, FakeLoader::default(), locations())
    }

    #[tokio::test]
    async fn two_items_are_processed_in_order() {
        let coord = coordinator(FakeTools::with_items(&["a.txt", "b.txt"]));

        let report = coord.run_cycle(None).await;

        assert!(report.is_success());
        assert_eq!(report.processed_count, 2);
        assert_eq!(report.final_stage, Stage::Completed);

        let persisted = coord.tools.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].source, "a.txt");
        assert_eq!(persisted[0].urgency, Urgency::High);
        assert_eq!(persisted[0].sentiment, Sentiment::Negative);
        assert_eq!(persisted[1].source, "b.txt");
        assert_eq!(persisted[1].urgency, Urgency::Medium);
        assert_eq!(persisted[1].sentiment, Sentiment::Neutral);

        let stages: Vec<Stage> = report.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            stages,
            vec![
                Stage::AnalyzeItem,
                Stage::PersistResult,
                Stage::ArchiveItem,
                Stage::CheckNext,
                Stage::AnalyzeItem,
                Stage::PersistResult,
                Stage::ArchiveItem,
                Stage::CheckNext,
                Stage::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn empty_source_completes_without_analysis() {
        let coord = coordinator(FakeTools::default());

        let report = coord.run_cycle(None).await;

        assert!(report.is_success());
        assert_eq!(report.processed_count, 0);
        assert_eq!(report.final_stage, Stage::Completed);
        assert_eq!(coord.skills.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coord.loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(coord.tools.log(), vec!["enumerate_queue"]);
    }

    #[tokio::test]
    async fn persist_failure_on_only_item_reports_stage() {
        let tools = FakeTools {
            fail_persist_on: Some("a.txt".into()),
            ..FakeTools::with_items(&["a.txt"])
        };
        let coord = coordinator(tools);

        let report = coord.run_cycle(None).await;

        let err = report.error.as_ref().unwrap();
        assert_eq!(err.stage(), Stage::PersistResult);
        assert_eq!(report.final_stage, Stage::PersistResult);
        assert_eq!(report.processed_count, 0);
        assert_eq!(coord.tools.calls("archive:"), 0);
    }

    #[tokio::test]
    async fn persist_failure_leaves_earlier_items_counted() {
        let tools = FakeTools {
            fail_persist_on: Some("b.txt".into()),
            ..FakeTools::with_items(&["a.txt", "b.txt", "c.txt"])
        };
        let coord = coordinator(tools);

        let report = coord.run_cycle(None).await;

        assert_eq!(report.error.as_ref().unwrap().stage(), Stage::PersistResult);
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.state.current_item(), Some("b.txt"));
        assert!(report.state.current_result().is_some());
        assert_eq!(coord.tools.log().last().unwrap(), "persist:b.txt");
    }

    #[tokio::test]
    async fn every_item_is_persisted_before_it_is_archived() {
        let coord = coordinator(FakeTools::with_items(&["a.txt", "b.txt", "c.txt"]));

        let report = coord.run_cycle(None).await;
        assert!(report.is_success());

        let log = coord.tools.log();
        for item in ["a.txt", "b.txt", "c.txt"] {
            let persist = log.iter().position(|l| *l == format!("persist:{item}")).unwrap();
            let archive = log.iter().position(|l| *l == format!("archive:{item}")).unwrap();
            assert!(persist < archive, "{item} archived before it was persisted");
        }
    }

    #[tokio::test]
    async fn cycle_drains_queue_of_any_size() {
        for n in 0..5 {
            let names: Vec<String> = (0..n).map(|i| format!("item-{i}.txt")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let coord = coordinator(FakeTools::with_items(&refs));

            let report = coord.run_cycle(None).await;

            assert!(report.is_success());
            assert_eq!(report.final_stage, Stage::Completed);
            assert_eq!(report.processed_count, n as u32);
            assert_eq!(coord.skills.calls.load(Ordering::SeqCst), n);
            assert_eq!(coord.tools.calls("persist:"), n);
            assert_eq!(coord.tools.calls("archive:"), n);
        }
    }

    #[tokio::test]
    async fn processed_count_only_moves_on_archive() {
        let coord = coordinator(FakeTools::with_items(&["a.txt", "b.txt"]));
        let mut state = ProcessingState::new();

        while !state.stage().is_terminal() {
            let before = state.processed_count();
            let archiving = state.stage() == Stage::ArchiveItem;
            let (next_state, next) = coord.step(&state).await.unwrap();
            assert_eq!(next_state.stage(), next);
            if archiving {
                assert_eq!(next_state.processed_count(), before + 1);
            } else {
                assert_eq!(next_state.processed_count(), before);
            }
            state = next_state;
        }
        assert_eq!(state.processed_count(), 2);
    }

    #[tokio::test]
    async fn rescan_picks_up_items_added_mid_cycle() {
        let tools = FakeTools::with_items(&["a.txt"]);
        tools.arrivals.lock().unwrap().push("late.txt".into());
        let coord = coordinator(tools);

        let report = coord.run_cycle(None).await;

        assert!(report.is_success());
        assert_eq!(report.processed_count, 2);
        assert_eq!(coord.tools.calls("rescan_queue"), 2);
        assert!(coord.tools.log().contains(&"archive:late.txt".to_string()));
    }

    #[tokio::test]
    async fn step_on_completed_is_a_no_op() {
        let coord = coordinator(FakeTools::with_items(&["a.txt"]));
        let state = ProcessingState::new().with_stage(Stage::Completed);

        let (next_state, next) = coord.step(&state).await.unwrap();

        assert_eq!(next, Stage::Completed);
        assert_eq!(next_state, state);
        assert!(coord.tools.log().is_empty());
    }

    #[tokio::test]
    async fn source_that_never_drains_is_stopped() {
        let tools = FakeTools {
            keep_archived: true,
            ..FakeTools::with_items(&["stuck.txt"])
        };
        let coord = coordinator(tools);

        let report = coord.run_cycle(None).await;

        let err = report.error.as_ref().unwrap();
        assert_eq!(err.stage(), Stage::CheckNext);
        assert!(matches!(
            err,
            CycleError::Contract {
                source: ContractViolation::NotDrained(item),
                ..
            } if item == "stuck.txt"
        ));
        assert_eq!(report.final_stage, Stage::CheckNext);
        assert_eq!(coord.tools.calls("archive:"), 1);
        assert_eq!(coord.skills.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idle_step_limit_stops_a_cycle_that_completes_nothing() {
        let coord = coordinator(FakeTools::with_items(&["a.txt"])).with_max_idle_steps(3);

        let report = coord.run_cycle(None).await;

        assert!(matches!(
            report.error,
            Some(CycleError::StepLimit {
                stage: Stage::ArchiveItem,
                limit: 3
            })
        ));
        assert_eq!(report.transitions.len(), 3);
        assert_eq!(report.processed_count, 0);
    }

    #[tokio::test]
    async fn idle_step_count_restarts_after_each_archive() {
        let coord = coordinator(FakeTools::with_items(&["a.txt", "b.txt", "c.txt"]))
            .with_max_idle_steps(4);

        let report = coord.run_cycle(None).await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.processed_count, 3);
    }

    #[tokio::test]
    async fn large_queue_drains_with_default_limits() {
        let names: Vec<String> = (0..300).map(|i| format!("item-{i:03}.txt")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let coord = coordinator(FakeTools::with_items(&refs));

        let report = coord.run_cycle(None).await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.final_stage, Stage::Completed);
        assert_eq!(report.processed_count, 300);
        assert_eq!(report.transitions.len(), 1 + 4 * 300);
    }

    #[tokio::test]
    async fn transitions_carry_reasons() {
        let coord = coordinator(FakeTools::with_items(&["a.txt"]));

        let report = coord.run_cycle(None).await;

        let reasons: Vec<&str> = report.transitions.iter().map(|t| t.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "Found 1 item(s) to process",
                "Analyzed a.txt: Support, High urgency",
                "saved",
                "moved",
                "Queue drained after 1 item(s)",
            ]
        );
    }

    #[tokio::test]
    async fn cached_content_is_not_reloaded() {
        let coord = coordinator(FakeTools::with_items(&["a.txt"]));
        let state = ProcessingState::new()
            .with_queue(vec!["a.txt".into()])
            .with_content("already here".into())
            .with_stage(Stage::AnalyzeItem);

        let (next_state, next) = coord.step(&state).await.unwrap();

        assert_eq!(next, Stage::PersistResult);
        assert_eq!(coord.loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(next_state.current_result().unwrap().summary, "already here");
    }

    #[tokio::test]
    async fn missing_item_content_fails_analysis() {
        let coord = Coordinator::new(
            FakeSkills::default(),
            FakeTools::with_items(&["gone.txt"]),
            FakeLoader {
                missing: Some("gone.txt".into()),
                ..Default::default()
            },
            locations(),
        );

        let report = coord.run_cycle(None).await;

        let err = report.error.as_ref().unwrap();
        assert_eq!(err.stage(), Stage::AnalyzeItem);
        assert!(matches!(
            err,
            CycleError::Execution {
                source: ExecutionError::NotFound(_),
                ..
            }
        ));
        assert_eq!(report.processed_count, 0);
        assert_eq!(coord.skills.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persist_without_result_is_a_contract_violation() {
        let coord = coordinator(FakeTools::with_items(&["a.txt"]));
        let state = ProcessingState::new()
            .with_queue(vec!["a.txt".into()])
            .with_stage(Stage::PersistResult);

        let err = coord.step(&state).await.unwrap_err();

        assert!(matches!(
            err,
            CycleError::Contract {
                source: ContractViolation::MissingResult(Stage::PersistResult),
                ..
            }
        ));
        assert!(coord.tools.log().is_empty());
    }

    #[tokio::test]
    async fn observer_sees_every_applied_state() {
        let coord = coordinator(FakeTools::with_items(&["a.txt"]));
        let mut seen = Vec::new();

        let report = coord
            .run_cycle_with(None, |state| seen.push(state.stage()))
            .await;

        assert_eq!(seen.len(), report.transitions.len());
        assert_eq!(seen.last(), Some(&Stage::Completed));
    }
}
