//! Annotation store
//!
//! Append-only JSON Lines log of [`EquationRecord`]s per paper, with
//! idempotent replace-by-key and delete-by-key implemented as a full-file
//! rewrite. Every destructive rewrite is preceded by a timestamped full copy
//! of the log into a per-paper history directory, so any mutation has a
//! point-in-time predecessor available for manual recovery. Backups are never
//! read by the store itself and are never pruned.
//!
//! The store assumes a single writer per paper at a time; concurrent rewrites
//! of the same log must be serialized by the caller.
//!
//! Layout on disk:
//!
//! ```text
//! <profiles_root>/<paper_id>/equations.jsonl
//! <profiles_root>/<paper_id>/history/equations-<UTC timestamp>.jsonl
//! ```

use std::path::PathBuf;

use chrono::Utc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

mod types;

pub use types::{EquationBox, EquationRecord, LogLine};

/// Errors from annotation persistence
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record presented with no boxes; rejected before any store mutation
    #[error("equation record '{eq_uid}' has no boxes")]
    EmptyBoxes { eq_uid: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistent annotation log, one JSONL resource per paper
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    profiles_root: PathBuf,
}

impl AnnotationStore {
    pub fn new(profiles_root: impl Into<PathBuf>) -> Self {
        Self {
            profiles_root: profiles_root.into(),
        }
    }

    fn paper_dir(&self, paper_id: &str) -> PathBuf {
        self.profiles_root.join(paper_id)
    }

    fn log_path(&self, paper_id: &str) -> PathBuf {
        self.paper_dir(paper_id).join("equations.jsonl")
    }

    fn history_dir(&self, paper_id: &str) -> PathBuf {
        self.paper_dir(paper_id).join("history")
    }

    /// Read the log in append order
    ///
    /// A missing log yields an empty list. Unreadable lines are skipped with
    /// a warning so a partially corrupt log degrades instead of failing.
    pub async fn read(&self, paper_id: &str) -> Result<Vec<EquationRecord>, StoreError> {
        let lines = self.read_lines(paper_id).await?;
        Ok(lines
            .into_iter()
            .filter_map(|line| match line {
                LogLine::Record(record) => Some(record),
                LogLine::Unreadable(raw) => {
                    tracing::warn!(
                        paper_id = paper_id,
                        line = raw.as_str(),
                        "skipping unreadable annotation log line"
                    );
                    None
                }
            })
            .collect())
    }

    /// Append one record as a single serialized line
    ///
    /// Never rewrites existing lines; O(1) I/O. The empty-boxes precondition
    /// is checked by the caller via [`EquationRecord::validate`].
    pub async fn append(&self, record: &EquationRecord) -> Result<(), StoreError> {
        let path = self.log_path(&record.paper_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            paper_id = record.paper_id.as_str(),
            eq_uid = record.eq_uid.as_str(),
            "appended equation record"
        );
        Ok(())
    }

    /// Replace the record keyed by `eq_uid`, appending when absent (upsert)
    ///
    /// The whole log is rewritten after an unconditional backup. Upsert
    /// semantics mean a client retry after a partial failure still converges
    /// on the intended state.
    ///
    /// Precondition: `new_record.eq_uid` must equal `eq_uid`. Key agreement
    /// is enforced at the transport edge; a mismatch here would silently
    /// rename an annotation.
    pub async fn update(
        &self,
        paper_id: &str,
        eq_uid: &str,
        new_record: EquationRecord,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(
            new_record.eq_uid, eq_uid,
            "update key must match the record's eq_uid"
        );
        let mut lines = self.read_lines(paper_id).await?;
        self.backup(paper_id).await?;

        match lines.iter().position(|line| line.eq_uid() == Some(eq_uid)) {
            Some(i) => lines[i] = LogLine::Record(new_record),
            None => {
                tracing::debug!(
                    paper_id = paper_id,
                    eq_uid = eq_uid,
                    "update key absent, appending instead"
                );
                lines.push(LogLine::Record(new_record));
            }
        }

        self.rewrite(paper_id, &lines).await
    }

    /// Remove the record keyed by `eq_uid`
    ///
    /// Returns whether a record was actually removed; an absent key is an
    /// expected outcome, not a fault. A backup is taken even when the delete
    /// turns out to be a no-op.
    pub async fn delete(&self, paper_id: &str, eq_uid: &str) -> Result<bool, StoreError> {
        let lines = self.read_lines(paper_id).await?;
        self.backup(paper_id).await?;

        let before = lines.len();
        let kept: Vec<LogLine> = lines
            .into_iter()
            .filter(|line| line.eq_uid() != Some(eq_uid))
            .collect();
        let removed = kept.len() < before;

        self.rewrite(paper_id, &kept).await?;
        Ok(removed)
    }

    /// Decode the log line by line, tagging unreadable lines
    async fn read_lines(&self, paper_id: &str) -> Result<Vec<LogLine>, StoreError> {
        let path = self.log_path(paper_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(LogLine::decode)
            .collect())
    }

    /// Copy the current log into the history area under a UTC timestamp
    ///
    /// Returns the backup path, or `None` when no log exists yet. Runs before
    /// every rewrite, including no-op mutations.
    async fn backup(&self, paper_id: &str) -> Result<Option<PathBuf>, StoreError> {
        let log = self.log_path(paper_id);
        if tokio::fs::metadata(&log).await.is_err() {
            return Ok(None);
        }

        let history = self.history_dir(paper_id);
        tokio::fs::create_dir_all(&history).await?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut path = history.join(format!("equations-{stamp}.jsonl"));
        let mut n = 1u32;
        while tokio::fs::metadata(&path).await.is_ok() {
            path = history.join(format!("equations-{stamp}-{n}.jsonl"));
            n += 1;
        }

        tokio::fs::copy(&log, &path).await?;
        tracing::debug!(
            paper_id = paper_id,
            backup = %path.display(),
            "backed up annotation log"
        );
        Ok(Some(path))
    }

    /// Rewrite the whole log via write-to-temp-then-rename
    ///
    /// Unreadable lines are carried through verbatim so a rewrite never
    /// destroys data it could not parse.
    async fn rewrite(&self, paper_id: &str, lines: &[LogLine]) -> Result<(), StoreError> {
        let path = self.log_path(paper_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut content = String::new();
        for line in lines {
            match line {
                LogLine::Record(record) => content.push_str(&serde_json::to_string(record)?),
                LogLine::Unreadable(raw) => content.push_str(raw),
            }
            content.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// List backup files for a paper, oldest first
    ///
    /// The core never restores from backups itself; this exists for external
    /// recovery tooling and tests.
    pub async fn list_backups(&self, paper_id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.history_dir(paper_id);
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            out.push(entry.path());
        }
        out.sort();
        Ok(out)
    }
}
