//! Checkpoint file persistence with timestamped backups.
//!
//! The checkpoint is a plain JSON file shared with the downstream attacher.
//! Every overwrite first copies the previous version to
//! `<path>.<unix-ms>.bak`. That copy is best-effort: its outcome is reported
//! but never fails the stage. The write itself must succeed.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::model::SelectionBatch;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{missing} item(s) have no resolved id; refusing to overwrite {}", .path.display())]
    Unresolved { missing: usize, path: PathBuf },
    #[error("failed to write checkpoint {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read checkpoint {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {} is not a valid selection batch: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize selection batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Whether a stage may write items that still lack an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Reconciled write-back: every item must carry an id.
    RequireResolved,
    /// Raw staging: record whatever was submitted.
    AcceptPartial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum BackupOutcome {
    NoPrevious,
    Saved { path: PathBuf },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReceipt {
    pub count: usize,
    pub path: PathBuf,
    pub backup: BackupOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub path: PathBuf,
    pub stamp_ms: i64,
}

#[derive(Debug, Clone)]
pub struct Stager {
    path: PathBuf,
}

impl Stager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current checkpoint; `None` when no file exists yet.
    pub async fn load(&self) -> Result<Option<SelectionBatch>, StageError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let batch = serde_json::from_slice(&raw).map_err(|source| StageError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(batch))
    }

    /// Stamp `batch` with the current time and write it to the checkpoint,
    /// backing up any previous version first. `batch.staged_at` only changes
    /// once the write has succeeded.
    pub async fn stage(
        &self,
        batch: &mut SelectionBatch,
        mode: StageMode,
    ) -> Result<StageReceipt, StageError> {
        self.stage_at(batch, mode, Utc::now()).await
    }

    #[instrument(skip_all, fields(path = %self.path.display(), items = batch.len()))]
    async fn stage_at(
        &self,
        batch: &mut SelectionBatch,
        mode: StageMode,
        now: DateTime<Utc>,
    ) -> Result<StageReceipt, StageError> {
        if mode == StageMode::RequireResolved {
            let missing = batch.missing_ids().len();
            if missing > 0 {
                warn!(missing, "batch incomplete; checkpoint left untouched");
                return Err(StageError::Unresolved {
                    missing,
                    path: self.path.clone(),
                });
            }
        }

        let mut stamped = batch.clone();
        stamped.staged_at = Some(now);
        let mut body = serde_json::to_vec_pretty(&stamped)?;
        body.push(b'\n');

        let backup = self.backup_previous(now.timestamp_millis()).await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StageError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }
        fs::write(&self.path, &body)
            .await
            .map_err(|source| StageError::Write {
                path: self.path.clone(),
                source,
            })?;
        batch.staged_at = stamped.staged_at;

        let path = fs::canonicalize(&self.path)
            .await
            .unwrap_or_else(|_| self.path.clone());
        info!(count = batch.len(), path = %path.display(), ?backup, "staged selection batch");
        Ok(StageReceipt {
            count: batch.len(),
            path,
            backup,
        })
    }

    async fn backup_previous(&self, stamp_ms: i64) -> BackupOutcome {
        match fs::try_exists(&self.path).await {
            Ok(true) => {}
            Ok(false) => return BackupOutcome::NoPrevious,
            Err(err) => {
                warn!(?err, "could not check for previous checkpoint; skipping backup");
                return BackupOutcome::Failed {
                    error: err.to_string(),
                };
            }
        }

        let mut stamp = stamp_ms;
        let mut target = backup_path(&self.path, stamp);
        // Two stages within the same millisecond must not clobber each other's backup.
        while fs::try_exists(&target).await.unwrap_or(false) {
            stamp += 1;
            target = backup_path(&self.path, stamp);
        }

        match fs::copy(&self.path, &target).await {
            Ok(_) => BackupOutcome::Saved { path: target },
            Err(err) => {
                warn!(?err, target = %target.display(), "checkpoint backup failed; continuing");
                BackupOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Backups of this checkpoint, oldest first.
    pub async fn backups(&self) -> std::io::Result<Vec<BackupEntry>> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let Some(file_name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}.", file_name);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stamp) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".bak"))
                .and_then(|ms| ms.parse::<i64>().ok())
            else {
                continue;
            };
            out.push(BackupEntry {
                path: entry.path(),
                stamp_ms: stamp,
            });
        }
        out.sort_by_key(|b| b.stamp_ms);
        Ok(out)
    }
}

/// `<path>.<unix-ms>.bak`
pub fn backup_path(path: &Path, stamp_ms: i64) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}.bak", stamp_ms));
    PathBuf::from(name)
}
