//! Capabilities the coordinator consumes.
//!
//! The coordinator only knows these traits. Concrete collaborators live in
//! [`crate::skills`] (LLM and keyword analysis) and [`crate::tools`]
//! (file-system scan, report and archive).

use std::path::PathBuf;

use serde::Serialize;

use crate::error::ExecutionError;
use crate::state_machine::{AnalysisOutput, ExtractionResult, SkillOperation, ToolOperation};

/// Input handed to the skill executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillContext {
    pub identifier: String,
    pub content: String,
}

/// Structured result of a skill operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillOutput {
    Analysis(AnalysisOutput),
}

/// Input handed to the tool executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Enumerate {
        source: PathBuf,
    },
    Persist {
        destination: PathBuf,
        result: ExtractionResult,
    },
    Archive {
        item: String,
        destination: PathBuf,
    },
}

/// Operation-specific payload of a tool outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ToolPayload {
    Listing { items: Vec<String>, count: usize },
    Empty,
}

/// What every tool operation reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    pub payload: ToolPayload,
}

impl ToolOutcome {
    pub fn listing(items: Vec<String>) -> Self {
        let count = items.len();
        Self {
            success: true,
            message: format!("Found {count} item(s)"),
            payload: ToolPayload::Listing { items, count },
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: ToolPayload::Empty,
        }
    }

    #[cfg(test)]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: ToolPayload::Empty,
        }
    }
}

/// Either executor's output, as fed to the handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorOutput {
    Skill(SkillOutput),
    Tool(ToolOutcome),
}

/// AI-backed extraction.
///
/// Implementations may do asynchronous I/O internally; the coordinator awaits
/// each call to completion before considering anything else.
pub trait SkillExecutor {
    async fn run(
        &self,
        operation: SkillOperation,
        context: &SkillContext,
    ) -> Result<SkillOutput, ExecutionError>;
}

/// Side effects on the source container, report sink and archive.
pub trait ToolExecutor {
    async fn run(
        &self,
        operation: ToolOperation,
        request: ToolRequest,
    ) -> Result<ToolOutcome, ExecutionError>;
}

/// Reads the raw text of an item.
pub trait ContentLoader {
    async fn load(&self, identifier: &str) -> Result<String, ExecutionError>;
}
