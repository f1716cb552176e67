use regex::Regex;

use crate::error::ExecutionError;
use crate::executor::{SkillContext, SkillExecutor, SkillOutput};
use crate::state_machine::{AnalysisOutput, Sentiment, SkillOperation, Urgency};

const TOPIC_MAX_CHARS: usize = 60;
const SUMMARY_MAX_CHARS: usize = 200;

const URGENT_KEYWORDS: &[(&str, u32)] = &[
    ("asap", 10),
    ("urgent", 10),
    ("critical", 10),
    ("emergency", 10),
    ("immediately", 8),
    ("outage", 8),
    ("failure", 7),
    ("deadline", 5),
    ("down", 5),
];

const RELAXED_KEYWORDS: &[(&str, u32)] = &[
    ("no rush", 10),
    ("fyi", 8),
    ("when you have time", 8),
    ("whenever", 7),
    ("newsletter", 6),
];

// A trailing `*` matches any word starting with the stem; other keywords
// must match whole words.
const POSITIVE_KEYWORDS: &[(&str, u32)] = &[
    ("thank*", 5),
    ("appreciat*", 5),
    ("great", 4),
    ("excellent", 5),
    ("pleased", 4),
    ("happy", 4),
];

const NEGATIVE_KEYWORDS: &[(&str, u32)] = &[
    ("unacceptable", 8),
    ("disappoint*", 6),
    ("frustrat*", 6),
    ("angry", 6),
    ("terrible", 6),
    ("complain*", 5),
    ("not working", 5),
    ("refund*", 4),
    ("broken", 4),
];

const CATEGORY_KEYWORDS: &[(&str, &str, u32)] = &[
    ("invoice*", "Accounting", 10),
    ("payroll", "HR", 10),
    ("quote", "Sales", 10),
    ("login", "Tech Support", 10),
    ("vacation", "HR", 10),
    ("payment*", "Accounting", 8),
    ("pricing", "Sales", 8),
    ("password", "Tech Support", 8),
    ("crash*", "Tech Support", 8),
    ("hiring", "HR", 8),
    ("resume", "HR", 8),
    ("error*", "Tech Support", 7),
    ("bug", "Tech Support", 7),
    ("refund*", "Accounting", 6),
    ("purchase", "Sales", 6),
    ("order", "Sales", 5),
    ("leave", "HR", 5),
];

const DEFAULT_CATEGORY: &str = "General";

type Weights = Vec<(Regex, u32)>;

/// Offline analysis by weighted keyword scoring. Used when no API key is set.
pub struct KeywordSkillExecutor {
    email: Regex,
    phone: Regex,
    urgent: Weights,
    relaxed: Weights,
    positive: Weights,
    negative: Weights,
    categories: Vec<(Regex, &'static str, u32)>,
}

impl KeywordSkillExecutor {
    pub fn new() -> Result<Self, regex::Error> {
        let categories = CATEGORY_KEYWORDS
            .iter()
            .map(|&(keyword, category, weight)| Ok((keyword_pattern(keyword)?, category, weight)))
            .collect::<Result<_, regex::Error>>()?;
        Ok(Self {
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            phone: Regex::new(r"\+?\d[\d ().-]{6,}\d")?,
            urgent: weights(URGENT_KEYWORDS)?,
            relaxed: weights(RELAXED_KEYWORDS)?,
            positive: weights(POSITIVE_KEYWORDS)?,
            negative: weights(NEGATIVE_KEYWORDS)?,
            categories,
        })
    }

    pub fn analyze(&self, content: &str) -> AnalysisOutput {
        let lower = content.to_lowercase();
        AnalysisOutput {
            topic: topic(content),
            category: self.category(&lower),
            contacts: self.contacts(content),
            urgency: self.urgency(&lower),
            sentiment: self.sentiment(&lower),
            summary: summary(content),
            event_time: None,
        }
    }

    fn urgency(&self, lower: &str) -> Urgency {
        let urgent = score(lower, &self.urgent);
        let relaxed = score(lower, &self.relaxed);
        if urgent > relaxed && urgent >= 7 {
            Urgency::High
        } else if relaxed > urgent && relaxed >= 7 {
            Urgency::Low
        } else {
            Urgency::Medium
        }
    }

    fn sentiment(&self, lower: &str) -> Sentiment {
        let positive = score(lower, &self.positive);
        let negative = score(lower, &self.negative);
        if positive > negative {
            Sentiment::Positive
        } else if negative > positive {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    // Highest total wins; ties go to the category listed first.
    fn category(&self, lower: &str) -> String {
        let mut scores: Vec<(&str, u32)> = Vec::new();
        for (pattern, category, weight) in &self.categories {
            if !pattern.is_match(lower) {
                continue;
            }
            match scores.iter_mut().find(|(c, _)| c == category) {
                Some((_, total)) => *total += weight,
                None => scores.push((category, *weight)),
            }
        }

        let mut best: Option<(&str, u32)> = None;
        for (category, total) in scores {
            if best.is_none_or(|(_, top)| total > top) {
                best = Some((category, total));
            }
        }
        best.map(|(c, _)| c).unwrap_or(DEFAULT_CATEGORY).to_string()
    }

    fn contacts(&self, content: &str) -> String {
        let mut found: Vec<String> = Vec::new();
        let matches = self
            .email
            .find_iter(content)
            .chain(self.phone.find_iter(content));
        for m in matches {
            let value = m.as_str().trim().to_string();
            if !found.contains(&value) {
                found.push(value);
            }
        }
        found.join(", ")
    }
}

impl SkillExecutor for KeywordSkillExecutor {
    async fn run(
        &self,
        operation: SkillOperation,
        context: &SkillContext,
    ) -> Result<SkillOutput, ExecutionError> {
        match operation {
            SkillOperation::AnalyzeItem => Ok(SkillOutput::Analysis(self.analyze(&context.content))),
        }
    }
}

fn keyword_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    let pattern = match keyword.strip_suffix('*') {
        Some(stem) => format!(r"\b{}", regex::escape(stem)),
        None => format!(r"\b{}\b", regex::escape(keyword)),
    };
    Regex::new(&pattern)
}

fn weights(table: &[(&str, u32)]) -> Result<Weights, regex::Error> {
    table
        .iter()
        .map(|&(keyword, weight)| Ok((keyword_pattern(keyword)?, weight)))
        .collect()
}

fn score(lower: &str, weights: &[(Regex, u32)]) -> u32 {
    weights
        .iter()
        .filter(|(pattern, _)| pattern.is_match(lower))
        .map(|(_, weight)| weight)
        .sum()
}

fn is_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    ["subject:", "from:", "to:", "cc:", "date:"]
        .iter()
        .any(|h| lower.starts_with(h))
}

fn topic(content: &str) -> String {
    let subject = content.lines().find_map(|line| {
        let line = line.trim();
        line.to_ascii_lowercase()
            .starts_with("subject:")
            .then(|| line["subject:".len()..].trim().to_string())
    });
    let topic = subject
        .filter(|s| !s.is_empty())
        .or_else(|| {
            content
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !is_header(l))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Untitled".to_string());
    truncate(&topic, TOPIC_MAX_CHARS)
}

fn summary(content: &str) -> String {
    let body: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_header(l))
        .collect();
    let body = body.join(" ");
    let sentence = match body.find(['.', '!', '?']) {
        Some(end) => &body[..=end],
        None => body.as_str(),
    };
    if sentence.is_empty() {
        return "No content.".to_string();
    }
    truncate(sentence, SUMMARY_MAX_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
