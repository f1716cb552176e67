use std::time::Duration;

use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::state_machine::{ActionKind, Stage};

/// A broken promise between the coordinator, its table and its executors.
///
/// Always a programming error: never retried, always ends the cycle.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("no transition defined for stage {0}")]
    NoTransition(Stage),

    #[error("{operation} returned a malformed result: {detail}")]
    MalformedResult {
        operation: &'static str,
        detail: String,
    },

    #[error("stage {stage} has no current item (cursor {cursor}, queue length {len})")]
    NoCurrentItem {
        stage: Stage,
        cursor: usize,
        len: usize,
    },

    #[error("stage {0} requires an extraction result but none is present")]
    MissingResult(Stage),

    #[error("stage {stage} expected output from the {expected} executor")]
    ExecutorMismatch { stage: Stage, expected: ActionKind },

    #[error("{0} was archived but the source still lists it")]
    NotDrained(String),
}

/// Failure reported by a skill, tool or content loader.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("failed to parse skill output: {0}")]
    Parse(String),

    #[error("report error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{operation} reported failure: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid request for {operation}: {detail}")]
    InvalidRequest {
        operation: &'static str,
        detail: String,
    },
}

/// Why a cycle stopped before reaching `COMPLETED`, tagged with the stage it stopped at.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("contract violation at {stage}: {source}")]
    Contract {
        stage: Stage,
        #[source]
        source: ContractViolation,
    },

    #[error("{stage} failed: {source}")]
    Execution {
        stage: Stage,
        #[source]
        source: ExecutionError,
    },

    #[error("no item completed within {limit} steps, stopped at {stage}")]
    StepLimit { stage: Stage, limit: usize },
}

impl CycleError {
    pub fn contract(stage: Stage, source: ContractViolation) -> Self {
        CycleError::Contract { stage, source }
    }

    pub fn execution(stage: Stage, source: ExecutionError) -> Self {
        CycleError::Execution { stage, source }
    }

    /// The stage the cycle was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            CycleError::Contract { stage, .. }
            | CycleError::Execution { stage, .. }
            | CycleError::StepLimit { stage, .. } => *stage,
        }
    }
}
