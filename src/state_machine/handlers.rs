//! Pure state-update functions, one per stage.
//!
//! A handler receives the state the executor ran against plus the executor's
//! output, and returns a fresh state together with the stage to move to. The
//! branch out of CHECK_QUEUE and CHECK_NEXT is decided here, from the result.

use chrono::{DateTime, Utc};

use super::stage::Stage;
use super::state::{ExtractionResult, ProcessingState};
use super::transition::{ActionKind, ToolOperation};
use crate::error::{ContractViolation, CycleError, ExecutionError};
use crate::executor::{ExecutorOutput, SkillOutput, ToolOutcome, ToolPayload};

/// A handler's verdict. `state.stage()` already equals `next`.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub state: ProcessingState,
    pub next: Stage,
    /// Human-readable account of what happened, e.g. "Found 3 item(s) to process".
    pub reason: String,
}

impl Applied {
    fn new(state: ProcessingState, next: Stage, reason: String) -> Self {
        Self {
            state: state.with_stage(next),
            next,
            reason,
        }
    }
}

/// Route an executor output to the handler for `stage`.
///
/// `now` is the analysis wall-clock time, used when the skill gives no event time.
pub fn apply(
    stage: Stage,
    state: &ProcessingState,
    output: ExecutorOutput,
    now: DateTime<Utc>,
) -> Result<Applied, CycleError> {
    match (stage, output) {
        (Stage::CheckQueue, ExecutorOutput::Tool(outcome)) => queue_checked(state, outcome),
        (Stage::AnalyzeItem, ExecutorOutput::Skill(output)) => item_analyzed(state, output, now),
        (Stage::PersistResult, ExecutorOutput::Tool(outcome)) => result_persisted(state, outcome),
        (Stage::ArchiveItem, ExecutorOutput::Tool(outcome)) => item_archived(state, outcome),
        (Stage::CheckNext, ExecutorOutput::Tool(outcome)) => next_checked(state, outcome),
        (Stage::Completed, _) => Err(CycleError::contract(
            stage,
            ContractViolation::NoTransition(stage),
        )),
        (Stage::AnalyzeItem, ExecutorOutput::Tool(_)) => Err(mismatch(stage, ActionKind::Skill)),
        (_, ExecutorOutput::Skill(_)) => Err(mismatch(stage, ActionKind::Tool)),
    }
}

fn queue_checked(state: &ProcessingState, outcome: ToolOutcome) -> Result<Applied, CycleError> {
    let items = listing(Stage::CheckQueue, ToolOperation::EnumerateQueue, outcome)?;
    let reason = match items.len() {
        0 => "No items to process".to_string(),
        n => format!("Found {n} item(s) to process"),
    };
    Ok(branch_on_queue(state.clone().with_queue(items), reason))
}

fn item_analyzed(
    state: &ProcessingState,
    output: SkillOutput,
    now: DateTime<Utc>,
) -> Result<Applied, CycleError> {
    let SkillOutput::Analysis(analysis) = output;
    let source = current_item(Stage::AnalyzeItem, state)?;
    let result = ExtractionResult::from_output(analysis, source, now);
    let reason = format!(
        "Analyzed {source}: {}, {} urgency",
        result.category, result.urgency
    );
    Ok(Applied::new(
        state.clone().with_result(result),
        Stage::PersistResult,
        reason,
    ))
}

fn result_persisted(state: &ProcessingState, outcome: ToolOutcome) -> Result<Applied, CycleError> {
    ensure_success(Stage::PersistResult, ToolOperation::PersistResult, &outcome)?;
    Ok(Applied::new(state.clone(), Stage::ArchiveItem, outcome.message))
}

fn item_archived(state: &ProcessingState, outcome: ToolOutcome) -> Result<Applied, CycleError> {
    ensure_success(Stage::ArchiveItem, ToolOperation::ArchiveItem, &outcome)?;
    current_item(Stage::ArchiveItem, state)?;
    Ok(Applied::new(state.clone().advance(), Stage::CheckNext, outcome.message))
}

fn next_checked(state: &ProcessingState, outcome: ToolOutcome) -> Result<Applied, CycleError> {
    let items = listing(Stage::CheckNext, ToolOperation::RescanQueue, outcome)?;
    let processed = state.processed_count();
    let reason = match items.len() {
        0 => format!("Queue drained after {processed} item(s)"),
        n => format!("{n} item(s) remaining"),
    };
    Ok(branch_on_queue(state.clone().with_queue(items), reason))
}

fn branch_on_queue(state: ProcessingState, reason: String) -> Applied {
    let next = if state.queue().is_empty() {
        Stage::Completed
    } else {
        Stage::AnalyzeItem
    };
    Applied::new(state, next, reason)
}

fn listing(
    stage: Stage,
    operation: ToolOperation,
    outcome: ToolOutcome,
) -> Result<Vec<String>, CycleError> {
    ensure_success(stage, operation, &outcome)?;
    match outcome.payload {
        ToolPayload::Listing { items, count } if count == items.len() => Ok(items),
        ToolPayload::Listing { items, count } => Err(malformed(
            stage,
            operation,
            format!("count {count} does not match {} listed items", items.len()),
        )),
        ToolPayload::Empty => Err(malformed(stage, operation, "missing item listing".into())),
    }
}

fn ensure_success(
    stage: Stage,
    operation: ToolOperation,
    outcome: &ToolOutcome,
) -> Result<(), CycleError> {
    if outcome.success {
        return Ok(());
    }
    Err(CycleError::execution(
        stage,
        ExecutionError::Rejected {
            operation: operation.name(),
            message: outcome.message.clone(),
        },
    ))
}

fn current_item(stage: Stage, state: &ProcessingState) -> Result<&str, CycleError> {
    state.current_item().ok_or_else(|| {
        CycleError::contract(
            stage,
            ContractViolation::NoCurrentItem {
                stage,
                cursor: state.cursor(),
                len: state.queue().len(),
            },
        )
    })
}

fn malformed(stage: Stage, operation: ToolOperation, detail: String) -> CycleError {
    CycleError::contract(
        stage,
        ContractViolation::MalformedResult {
            operation: operation.name(),
            detail,
        },
    )
}

fn mismatch(stage: Stage, expected: ActionKind) -> CycleError {
    CycleError::contract(stage, ContractViolation::ExecutorMismatch { stage, expected })
}
