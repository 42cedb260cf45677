//! Append-only log destination.
//!
//! Each append opens the file, writes one newline-terminated line in a single
//! write and closes it again. Concurrent appends from different requests rely
//! on `O_APPEND`; nothing here takes a lock.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppendError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("append task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Handle on the configured destination. Cloning shares the path.
#[derive(Debug, Clone)]
pub struct AppendWriter {
    path: Arc<PathBuf>,
}

impl AppendWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort append: failures are logged and swallowed so the caller
    /// can still acknowledge the request.
    pub async fn append(&self, line: &str) {
        if let Err(err) = self.try_append(line).await {
            tracing::warn!(path = %self.path.display(), "failed to write log line: {err}");
        }
    }

    /// Appends `line` followed by a newline, reporting any failure.
    pub async fn try_append(&self, line: &str) -> Result<(), AppendError> {
        let path = Arc::clone(&self.path);
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        tokio::task::spawn_blocking(move || append_record(&path, record.as_bytes())).await?
    }
}

fn append_record(path: &Path, record: &[u8]) -> Result<(), AppendError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AppendError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    file.write_all(record).map_err(|source| AppendError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates the directory holding `log_file` (and any missing ancestors).
///
/// Failure is logged only; later appends will fail individually.
pub fn ensure_log_dir(log_file: &Path) {
    if let Err(err) = create_parent_dir(log_file) {
        tracing::warn!(
            path = %log_file.display(),
            "failed to create log directory: {err}"
        );
    }
}

fn create_parent_dir(log_file: &Path) -> io::Result<()> {
    match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
