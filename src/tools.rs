//! File-system collaborators: the source directory is the queue, a CSV file
//! is the report sink, and a second directory is the archive.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::executor::{ContentLoader, ToolExecutor, ToolOutcome, ToolRequest};
use crate::state_machine::{ExtractionResult, ToolOperation};

/// Tool executor backed by local directories.
#[derive(Debug, Clone)]
pub struct FsToolExecutor {
    extension: String,
}

impl FsToolExecutor {
    /// `extension` filters enumerated files (case-insensitive, without the dot).
    /// An empty extension accepts every regular file.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// List matching files in `source`, sorted by path. A missing directory is
    /// created and reported as empty.
    pub async fn enumerate(&self, source: &Path) -> Result<Vec<String>, ExecutionError> {
        if !fs::try_exists(source).await? {
            debug!(source = %source.display(), "creating missing source directory");
            fs::create_dir_all(source).await?;
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(source).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.accepts(&path) {
                items.push(path.to_string_lossy().into_owned());
            }
        }
        items.sort();
        Ok(items)
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extension.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    async fn persist(&self, destination: &Path, result: &ExtractionResult) -> Result<ToolOutcome, ExecutionError> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let needs_header = match fs::metadata(destination).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)
            .await?;
        file.write_all(&report_rows(result, needs_header)?).await?;
        file.flush().await?;

        Ok(ToolOutcome::ok(format!(
            "Saved analysis of {} to {}",
            result.source,
            destination.display()
        )))
    }

    async fn archive(&self, item: &str, destination: &Path) -> Result<ToolOutcome, ExecutionError> {
        let source = PathBuf::from(item);
        if !fs::try_exists(&source).await? {
            return Err(ExecutionError::NotFound(item.to_string()));
        }
        let Some(name) = source.file_name() else {
            return Err(ExecutionError::InvalidRequest {
                operation: ToolOperation::ArchiveItem.name(),
                detail: format!("{item} has no file name"),
            });
        };

        fs::create_dir_all(destination).await?;
        let target = free_target(destination, &source, name).await?;

        if let Err(e) = fs::rename(&source, &target).await {
            // rename fails across filesystems
            warn!(item, error = %e, "rename failed, falling back to copy");
            fs::copy(&source, &target).await?;
            fs::remove_file(&source).await?;
        }

        Ok(ToolOutcome::ok(format!(
            "Archived {} to {}",
            name.to_string_lossy(),
            target.display()
        )))
    }
}

/// Column titles of the report, in row order.
pub const REPORT_HEADER: [&str; 8] = [
    "Main Topic",
    "Business Category",
    "Contact Data",
    "Urgency",
    "Sentiment",
    "Summary",
    "Event Date",
    "Source File",
];

// One CSV record for `result`, preceded by the header row on a fresh file.
fn report_rows(result: &ExtractionResult, header: bool) -> Result<Vec<u8>, ExecutionError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    if header {
        writer.write_record(REPORT_HEADER)?;
    }
    let urgency = result.urgency.to_string();
    let sentiment = result.sentiment.to_string();
    let event_date = result.event_time.to_rfc3339_opts(SecondsFormat::Secs, true);
    writer.write_record([
        result.topic.as_str(),
        result.category.as_str(),
        result.contacts.as_str(),
        urgency.as_str(),
        sentiment.as_str(),
        result.summary.as_str(),
        event_date.as_str(),
        result.source.as_str(),
    ])?;
    writer.into_inner().map_err(|e| ExecutionError::Io(e.into_error()))
}

// First unused name in `destination`: `a.txt`, then `a_20250101_120000.txt`,
// then `a_20250101_120000_2.txt` and so on.
async fn free_target(destination: &Path, source: &Path, name: &OsStr) -> Result<PathBuf, ExecutionError> {
    let target = destination.join(name);
    if !fs::try_exists(&target).await? {
        return Ok(target);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut suffix = 1u32;
    loop {
        let candidate = destination.join(archived_name(source, &stamp, suffix));
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

fn archived_name(source: &Path, stamp: &str, suffix: u32) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tag = match suffix {
        1 => stamp.to_string(),
        n => format!("{stamp}_{n}"),
    };
    match source.extension() {
        Some(ext) => format!("{stem}_{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{tag}"),
    }
}

impl ToolExecutor for FsToolExecutor {
    async fn run(
        &self,
        operation: ToolOperation,
        request: ToolRequest,
    ) -> Result<ToolOutcome, ExecutionError> {
        match (operation, request) {
            (
                ToolOperation::EnumerateQueue | ToolOperation::RescanQueue,
                ToolRequest::Enumerate { source },
            ) => self.enumerate(&source).await.map(ToolOutcome::listing),
            (ToolOperation::PersistResult, ToolRequest::Persist { destination, result }) => {
                self.persist(&destination, &result).await
            }
            (ToolOperation::ArchiveItem, ToolRequest::Archive { item, destination }) => {
                self.archive(&item, &destination).await
            }
            (operation, request) => Err(ExecutionError::InvalidRequest {
                operation: operation.name(),
                detail: format!("unexpected request {request:?}"),
            }),
        }
    }
}

/// Reads items as UTF-8 text files.
#[derive(Debug, Clone, Default)]
pub struct FsContentLoader;

impl ContentLoader for FsContentLoader {
    async fn load(&self, identifier: &str) -> Result<String, ExecutionError> {
        match fs::read_to_string(identifier).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ExecutionError::NotFound(identifier.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
