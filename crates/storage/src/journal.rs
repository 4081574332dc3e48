// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daily evidence journal (C6.1).
//!
//! One append-only, line-flushed JSON-lines file per UTC date at
//! `<journal_dir>/YYYY-MM-DD.mimolo.jsonl`. The journal is the system's
//! ground truth: the core never rewrites a line it has already written.
//! Rotation happens lazily — the next write after UTC midnight opens the
//! new day's file.

use chrono::{DateTime, NaiveDate, Utc};
use mimolo_core::EvidenceRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("io error opening journal: {0}")]
    Open(#[source] std::io::Error),
    #[error("io error writing journal line: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to serialize evidence record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Appends [`EvidenceRecord`]s to the date-bucketed journal file, rotating
/// to a new file whenever the UTC date of an incoming write differs from
/// the currently open file's date.
pub struct Journal {
    dir: PathBuf,
    open_date: Option<NaiveDate>,
    file: Option<File>,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open_date: None,
            file: None,
        }
    }

    /// Appends one record, line-flushing to the OS before returning.
    /// Rotates to a new date file first if needed.
    #[allow(clippy::expect_used)]
    pub fn append(&mut self, record: &EvidenceRecord) -> Result<(), JournalError> {
        self.ensure_open(record.timestamp)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let file = self.file.as_mut().expect("ensure_open guarantees a file");
        file.write_all(line.as_bytes()).map_err(JournalError::Write)?;
        file.flush().map_err(JournalError::Write)?;
        Ok(())
    }

    /// Journal file path for `date`, independent of whether it is currently open.
    pub fn path_for_date(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.mimolo.jsonl", date.format("%Y-%m-%d")))
    }

    fn ensure_open(&mut self, at: DateTime<Utc>) -> Result<(), JournalError> {
        let date = at.date_naive();
        if self.open_date == Some(date) && self.file.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir).map_err(JournalError::Open)?;
        let path = self.path_for_date(date);
        let file = open_append(&path)?;
        if self.open_date.is_some() {
            tracing::info!(journal_path = %path.display(), "rotated journal to new UTC date");
        }
        self.open_date = Some(date);
        self.file = Some(file);
        Ok(())
    }
}

#[cfg(unix)]
fn open_append(path: &Path) -> Result<File, JournalError> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(JournalError::Open)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> Result<File, JournalError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(JournalError::Open)
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
