use std::fmt;

use serde::{Deserialize, Serialize};

/// The discrete points of the intake workflow.
///
/// A cycle flows through: CHECK_QUEUE → (ANALYZE_ITEM → PERSIST_RESULT →
/// ARCHIVE_ITEM → CHECK_NEXT)* → COMPLETED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    CheckQueue,
    AnalyzeItem,
    PersistResult,
    ArchiveItem,
    CheckNext,
    Completed,
}

impl Stage {
    /// Every stage, in typical traversal order.
    #[cfg(test)]
    pub const ALL: [Stage; 6] = [
        Stage::CheckQueue,
        Stage::AnalyzeItem,
        Stage::PersistResult,
        Stage::ArchiveItem,
        Stage::CheckNext,
        Stage::Completed,
    ];

    /// The stage every cycle starts from.
    pub const ENTRY: Stage = Stage::CheckQueue;

    /// `Completed` has no outgoing transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CheckQueue => write!(f, "CHECK_QUEUE"),
            Stage::AnalyzeItem => write!(f, "ANALYZE_ITEM"),
            Stage::PersistResult => write!(f, "PERSIST_RESULT"),
            Stage::ArchiveItem => write!(f, "ARCHIVE_ITEM"),
            Stage::CheckNext => write!(f, "CHECK_NEXT"),
            Stage::Completed => write!(f, "COMPLETED"),
        }
    }
}
