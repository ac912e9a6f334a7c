//! Read-only pollers an admin UI uses to follow a pipeline run.
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, instrument};

pub const DEFAULT_TAIL_LINES: usize = 40;
pub const MAX_TAIL_LINES: usize = 2000;

/// Where a run's captured output lives. The streaming capture is preferred;
/// the older log is used only when the capture file is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSources {
    pub preferred: PathBuf,
    pub fallback: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTail {
    pub exists: bool,
    pub lines: Vec<String>,
    pub mtime: Option<i64>,
    pub changed_since: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryPoll {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl SummaryPoll {
    fn not_found() -> Self {
        Self {
            found: false,
            summary: None,
            mtime: None,
            reason: None,
        }
    }
}

pub fn epoch_ms(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(_) => 0,
    }
}

async fn modified_ms(path: &Path) -> std::io::Result<i64> {
    let meta = fs::metadata(path).await?;
    Ok(epoch_ms(meta.modified()?))
}

/// Last `max_lines` lines of the run log, preferring the streaming capture.
#[instrument(skip_all)]
pub async fn tail_log(
    sources: &LogSources,
    since_ms: i64,
    max_lines: usize,
) -> std::io::Result<LogTail> {
    let path = if fs::try_exists(&sources.preferred).await.unwrap_or(false) {
        &sources.preferred
    } else if fs::try_exists(&sources.fallback).await.unwrap_or(false) {
        &sources.fallback
    } else {
        return Ok(LogTail {
            exists: false,
            lines: Vec::new(),
            mtime: None,
            changed_since: false,
        });
    };
    debug!(path = %path.display(), "tailing pipeline log");

    let mtime = modified_ms(path).await?;
    let raw = fs::read(path).await?;
    let text = String::from_utf8_lossy(&raw);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(max_lines.min(MAX_TAIL_LINES));
    Ok(LogTail {
        exists: true,
        lines: all[start..].iter().map(|l| l.to_string()).collect(),
        mtime: Some(mtime),
        changed_since: mtime > since_ms,
    })
}

/// Newest `<prefix>*.json` in `dir` modified after `since_ms`.
///
/// A summary that fails to parse is most likely still being written, so it
/// is reported as "not found yet" with `reason: "parse-error"`.
#[instrument(skip_all)]
pub async fn latest_summary(dir: &Path, prefix: &str, since_ms: i64) -> std::io::Result<SummaryPoll> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SummaryPoll::not_found())
        }
        Err(err) => return Err(err),
    };

    let mut newest: Option<(i64, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(prefix) || !name.ends_with(".json") {
            continue;
        }
        // Follows links; a file removed since the listing is simply skipped.
        let meta = match fs::metadata(entry.path()).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        if !meta.is_file() {
            continue;
        }
        let mtime = epoch_ms(meta.modified()?);
        if mtime <= since_ms {
            continue;
        }
        if newest.as_ref().map_or(true, |(best, _)| mtime > *best) {
            newest = Some((mtime, entry.path()));
        }
    }

    let Some((mtime, path)) = newest else {
        return Ok(SummaryPoll::not_found());
    };
    let raw = match fs::read(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "summary vanished before it could be read");
            return Ok(SummaryPoll::not_found());
        }
        Err(err) => return Err(err),
    };
    match serde_json::from_slice::<Value>(&raw) {
        Ok(summary) => Ok(SummaryPoll {
            found: true,
            summary: Some(summary),
            mtime: Some(mtime),
            reason: None,
        }),
        Err(err) => {
            debug!(?err, path = %path.display(), "summary not parseable yet");
            Ok(SummaryPoll {
                reason: Some("parse-error"),
                ..SummaryPoll::not_found()
            })
        }
    }
}
