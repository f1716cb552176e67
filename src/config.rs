//! Configuration loaded from `mailroom.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! Environment variables (after `.env` is loaded) take precedence over the
//! file. The result is built once at startup and passed explicitly to the
//! executors and the runner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::coordinator::Locations;
use crate::skills::ModelTier;

pub const DEFAULT_CONFIG_FILE: &str = "mailroom.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct MailroomConfig {
    /// Anthropic API key. Empty selects the offline keyword analysis.
    #[serde(default)]
    pub api_key: String,

    /// Messages endpoint override, e.g. for a proxy.
    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default = "default_model_tier")]
    pub model_tier: ModelTier,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on one analysis call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Directory scanned for new items.
    #[serde(default = "default_inbox_path")]
    pub inbox_path: PathBuf,

    /// Directory processed items are moved to.
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,

    /// CSV report extraction results are appended to.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Only files with this extension are queued.
    #[serde(default = "default_item_extension")]
    pub item_extension: String,

    #[serde(default)]
    pub cyclic_mode: bool,

    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// Consecutive steps allowed without archiving an item.
    #[serde(default = "default_max_idle_steps", alias = "max_steps")]
    pub max_idle_steps: usize,
}

fn default_model_tier() -> ModelTier {
    ModelTier::Haiku
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_inbox_path() -> PathBuf {
    PathBuf::from("data/inbox")
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("data/archive")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("data/email_report.csv")
}

fn default_item_extension() -> String {
    "txt".to_string()
}

fn default_cycle_interval_secs() -> u64 {
    3600
}

fn default_max_idle_steps() -> usize {
    crate::coordinator::DEFAULT_MAX_IDLE_STEPS
}

impl Default for MailroomConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: None,
            model_tier: default_model_tier(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            inbox_path: default_inbox_path(),
            archive_path: default_archive_path(),
            report_path: default_report_path(),
            item_extension: default_item_extension(),
            cyclic_mode: false,
            cycle_interval_secs: default_cycle_interval_secs(),
            max_idle_steps: default_max_idle_steps(),
        }
    }
}

impl MailroomConfig {
    /// Load `.env`, then `path` (or `mailroom.toml` in the current directory),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        let file = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let mut config = Self::from_file(file, path.is_some())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() {
            if required {
                bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Override fields from environment-style variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = var("ANTHROPIC_BASE_URL") {
            self.api_base_url = Some(url);
        }
        if let Some(path) = var("INBOX_PATH") {
            self.inbox_path = PathBuf::from(path);
        }
        if let Some(path) = var("ARCHIVE_PATH") {
            self.archive_path = PathBuf::from(path);
        }
        // EXCEL_PATH is the older name; REPORT_PATH wins when both are set.
        if let Some(path) = var("EXCEL_PATH") {
            self.report_path = PathBuf::from(path);
        }
        if let Some(path) = var("REPORT_PATH") {
            self.report_path = PathBuf::from(path);
        }
        if let Some(flag) = var("CYCLIC_MODE") {
            self.cyclic_mode = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(secs) = var("CYCLE_INTERVAL_SECONDS") {
            self.cycle_interval_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("CYCLE_INTERVAL_SECONDS is not a number: {secs}"))?;
        }
        Ok(())
    }

    pub fn locations(&self) -> Locations {
        Locations {
            source: self.inbox_path.clone(),
            archive: self.archive_path.clone(),
            report: self.report_path.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = MailroomConfig::default();
        assert!(config.api_key.is_empty());
        assert_eq!(config.model_tier, ModelTier::Haiku);
        assert_eq!(config.inbox_path, PathBuf::from("data/inbox"));
        assert_eq!(config.archive_path, PathBuf::from("data/archive"));
        assert_eq!(config.report_path, PathBuf::from("data/email_report.csv"));
        assert_eq!(config.item_extension, "txt");
        assert!(!config.cyclic_mode);
        assert_eq!(config.cycle_interval_secs, 3600);
        assert_eq!(config.max_idle_steps, 100);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            model_tier = "sonnet"
            inbox_path = "/srv/mail/in"
            cyclic_mode = true
        "#;
        let config: MailroomConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model_tier, ModelTier::Sonnet);
        assert_eq!(config.inbox_path, PathBuf::from("/srv/mail/in"));
        assert!(config.cyclic_mode);
        assert_eq!(config.archive_path, PathBuf::from("data/archive"));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: MailroomConfig = toml::from_str(r#"api_key = "from-file""#).unwrap();
        config
            .apply_env(env(&[
                ("ANTHROPIC_API_KEY", "sk-env"),
                ("ANTHROPIC_BASE_URL", "http://localhost:8080/v1/messages"),
                ("INBOX_PATH", "in"),
                ("EXCEL_PATH", "legacy/report.csv"),
                ("REPORT_PATH", "out/report.csv"),
                ("CYCLIC_MODE", "TRUE"),
                ("CYCLE_INTERVAL_SECONDS", "90"),
            ]))
            .unwrap();

        assert_eq!(config.api_key, "sk-env");
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("http://localhost:8080/v1/messages")
        );
        assert_eq!(config.inbox_path, PathBuf::from("in"));
        assert_eq!(config.report_path, PathBuf::from("out/report.csv"));
        assert!(config.cyclic_mode);
        assert_eq!(config.cycle_interval(), Duration::from_secs(90));
        assert_eq!(config.locations().source, PathBuf::from("in"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config: MailroomConfig = toml::from_str(r#"api_key = "from-file""#).unwrap();
        config.apply_env(env(&[("ANTHROPIC_API_KEY", "  ")])).unwrap();
        assert_eq!(config.api_key, "from-file");
        assert!(config.has_api_key());
    }

    #[test]
    fn excel_path_sets_report_location() {
        let mut config = MailroomConfig::default();
        config
            .apply_env(env(&[("EXCEL_PATH", "reports/mail.csv")]))
            .unwrap();
        assert_eq!(config.report_path, PathBuf::from("reports/mail.csv"));
        assert_eq!(config.locations().report, PathBuf::from("reports/mail.csv"));
    }

    #[test]
    fn bad_interval_is_an_error() {
        let mut config = MailroomConfig::default();
        let err = config
            .apply_env(env(&[("CYCLE_INTERVAL_SECONDS", "hourly")]))
            .unwrap_err();
        assert!(err.to_string().contains("CYCLE_INTERVAL_SECONDS"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(MailroomConfig::from_file(&missing, true).is_err());
        assert!(MailroomConfig::from_file(&missing, false).is_ok());
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailroom.toml");
        std::fs::write(&path, "max_idle_steps = 50\nitem_extension = \"eml\"\n").unwrap();

        let config = MailroomConfig::from_file(&path, true).unwrap();
        assert_eq!(config.max_idle_steps, 50);
        assert_eq!(config.item_extension, "eml");
    }
}
