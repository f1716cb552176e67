use std::fmt;

use serde::Serialize;

use super::stage::Stage;
use crate::error::ContractViolation;

/// Which executor a stage is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Skill,
    Tool,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Skill => write!(f, "SKILL"),
            ActionKind::Tool => write!(f, "TOOL"),
        }
    }
}

/// Operations served by the skill executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkillOperation {
    AnalyzeItem,
}

impl SkillOperation {
    pub fn name(self) -> &'static str {
        match self {
            SkillOperation::AnalyzeItem => "analyze_item",
        }
    }
}

/// Operations served by the tool executor.
///
/// `RescanQueue` performs the same enumeration as `EnumerateQueue`; it is a
/// separate name so logs and fakes can tell the initial scan from a re-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolOperation {
    EnumerateQueue,
    PersistResult,
    ArchiveItem,
    RescanQueue,
}

impl ToolOperation {
    pub fn name(self) -> &'static str {
        match self {
            ToolOperation::EnumerateQueue => "enumerate_queue",
            ToolOperation::PersistResult => "persist_result",
            ToolOperation::ArchiveItem => "archive_item",
            ToolOperation::RescanQueue => "rescan_queue",
        }
    }
}

/// The operation to run, already bound to its executor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Skill(SkillOperation),
    Tool(ToolOperation),
}

impl Action {
    pub fn kind(self) -> ActionKind {
        match self {
            Action::Skill(_) => ActionKind::Skill,
            Action::Tool(_) => ActionKind::Tool,
        }
    }

    pub fn operation_name(self) -> &'static str {
        match self {
            Action::Skill(op) => op.name(),
            Action::Tool(op) => op.name(),
        }
    }
}

/// What must run to leave a stage. Says nothing about where the cycle goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionEntry {
    pub stage: Stage,
    pub action: Action,
    pub description: &'static str,
}

impl TransitionEntry {
    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn operation_name(&self) -> &'static str {
        self.action.operation_name()
    }
}

/// Look up the action for a non-terminal stage.
///
/// The match is exhaustive, so a new `Stage` variant does not compile until
/// it is either given an entry or routed to the terminal arm.
pub fn next_action(stage: Stage) -> Result<TransitionEntry, ContractViolation> {
    let (action, description) = match stage {
        Stage::CheckQueue => (
            Action::Tool(ToolOperation::EnumerateQueue),
            "Checking the source container for new items",
        ),
        Stage::AnalyzeItem => (
            Action::Skill(SkillOperation::AnalyzeItem),
            "Extracting structured data from the current item",
        ),
        Stage::PersistResult => (
            Action::Tool(ToolOperation::PersistResult),
            "Saving the extraction to the report",
        ),
        Stage::ArchiveItem => (
            Action::Tool(ToolOperation::ArchiveItem),
            "Moving the processed item to the archive",
        ),
        Stage::CheckNext => (
            Action::Tool(ToolOperation::RescanQueue),
            "Checking the source container for more items",
        ),
        Stage::Completed => return Err(ContractViolation::NoTransition(stage)),
    };

    Ok(TransitionEntry {
        stage,
        action,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_non_terminal_stage_has_one_entry() {
        for stage in Stage::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let entry = next_action(stage).unwrap();
            assert_eq!(entry.stage, stage);
            assert!(!entry.description.is_empty());
        }
    }

    #[test]
    fn completed_has_no_entry() {
        let err = next_action(Stage::Completed).unwrap_err();
        assert!(matches!(err, ContractViolation::NoTransition(Stage::Completed)));
    }

    #[test]
    fn only_analysis_goes_to_the_skill_executor() {
        let skill_stages: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .filter(|s| next_action(*s).unwrap().kind() == ActionKind::Skill)
            .collect();
        assert_eq!(skill_stages, vec![Stage::AnalyzeItem]);
    }

    #[test]
    fn operation_names() {
        let names: Vec<&str> = Stage::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .map(|s| next_action(s).unwrap().operation_name())
            .collect();
        assert_eq!(
            names,
            vec![
                "enumerate_queue",
                "analyze_item",
                "persist_result",
                "archive_item",
                "rescan_queue"
            ]
        );
    }

    #[test]
    fn queue_checks_are_both_enumerations() {
        let first = next_action(Stage::CheckQueue).unwrap().action;
        let again = next_action(Stage::CheckNext).unwrap().action;
        assert_eq!(first, Action::Tool(ToolOperation::EnumerateQueue));
        assert_eq!(again, Action::Tool(ToolOperation::RescanQueue));
    }
}
