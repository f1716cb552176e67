use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::Stage;

/// Urgency assigned by the analysis skill. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Sentiment assigned by the analysis skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// A level string outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} level: {value:?}")]
pub struct ParseLevelError {
    kind: &'static str,
    value: String,
}

impl FromStr for Urgency {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            _ => Err(ParseLevelError {
                kind: "urgency",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for Sentiment {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            _ => Err(ParseLevelError {
                kind: "sentiment",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Urgency {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Sentiment {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Low => write!(f, "Low"),
            Urgency::Medium => write!(f, "Medium"),
            Urgency::High => write!(f, "High"),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "Positive"),
            Sentiment::Neutral => write!(f, "Neutral"),
            Sentiment::Negative => write!(f, "Negative"),
        }
    }
}

/// What the analysis skill returns for one item.
///
/// Source and event time are stamped by the handler, not by the skill.
/// The `main_topic`/`business_category`/`contact_data` aliases accept the
/// field names older prompts asked the model for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    #[serde(alias = "main_topic")]
    pub topic: String,
    #[serde(alias = "business_category")]
    pub category: String,
    #[serde(alias = "contact_data")]
    pub contacts: String,
    pub urgency: Urgency,
    pub sentiment: Sentiment,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
}

/// Structured record extracted from exactly one queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub topic: String,
    pub category: String,
    pub contacts: String,
    pub urgency: Urgency,
    pub sentiment: Sentiment,
    pub summary: String,
    pub event_time: DateTime<Utc>,
    pub source: String,
}

impl ExtractionResult {
    /// Attribute an analysis to `source`, defaulting the event time to `analyzed_at`.
    pub fn from_output(output: AnalysisOutput, source: &str, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            topic: output.topic,
            category: output.category,
            contacts: output.contacts,
            urgency: output.urgency,
            sentiment: output.sentiment,
            summary: output.summary,
            event_time: output.event_time.unwrap_or(analyzed_at),
            source: source.to_string(),
        }
    }
}

/// The working set of one cycle.
///
/// Values are never edited in place: every change consumes the state and
/// returns a new one, so a handler's input stays valid after it runs.
/// Invariant: `cursor <= queue.len()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingState {
    stage: Stage,
    queue: Vec<String>,
    cursor: usize,
    current_content: Option<String>,
    current_result: Option<ExtractionResult>,
    processed_count: u32,
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingState {
    /// An empty state at the entry stage.
    pub fn new() -> Self {
        Self {
            stage: Stage::ENTRY,
            queue: Vec::new(),
            cursor: 0,
            current_content: None,
            current_result: None,
            processed_count: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_content(&self) -> Option<&str> {
        self.current_content.as_deref()
    }

    pub fn current_result(&self) -> Option<&ExtractionResult> {
        self.current_result.as_ref()
    }

    pub fn processed_count(&self) -> u32 {
        self.processed_count
    }

    /// Identifier of the item under the cursor, if any.
    pub fn current_item(&self) -> Option<&str> {
        self.queue.get(self.cursor).map(String::as_str)
    }

    /// Items at or after the cursor.
    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn with_stage(self, stage: Stage) -> Self {
        Self { stage, ..self }
    }

    /// Replace the queue and rewind the cursor to its head.
    pub fn with_queue(self, queue: Vec<String>) -> Self {
        Self {
            queue,
            cursor: 0,
            current_content: None,
            ..self
        }
    }

    pub fn with_content(self, content: String) -> Self {
        Self {
            current_content: Some(content),
            ..self
        }
    }

    pub fn with_result(self, result: ExtractionResult) -> Self {
        Self {
            current_result: Some(result),
            ..self
        }
    }

    /// Count the current item as done and move past it.
    pub fn advance(self) -> Self {
        let cursor = (self.cursor + 1).min(self.queue.len());
        Self {
            cursor,
            current_content: None,
            current_result: None,
            processed_count: self.processed_count + 1,
            ..self
        }
    }
}
