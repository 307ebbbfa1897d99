//! Append-only JSON-lines audit trail of agent tool calls

use crate::config::RouteKind;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub route: RouteKind,
    pub success: bool,
    pub duration_ms: u64,
    /// Arguments as logged; redacted unless redaction is disabled
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEntry {
    pub fn new(tool: &str, route: RouteKind, args: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            tool: tool.to_string(),
            route,
            success: true,
            duration_ms: 0,
            args,
            error: None,
        }
    }

    pub fn finish(mut self, duration_ms: u64, error: Option<String>) -> Self {
        self.duration_ms = duration_ms;
        self.success = error.is_none();
        self.error = error;
        self
    }
}

/// One JSON object per line; writers are serialized through a lock
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// The last `n` entries, oldest first. Unparseable lines are skipped.
    pub async fn recent(&self, n: usize) -> Result<Vec<AuditEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<AuditEntry> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, path = %self.path.display(), "Skipping malformed audit line");
                    None
                }
            })
            .collect();

        let skip = entries.len().saturating_sub(n);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_and_recent() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nested/audit.jsonl"));

        for i in 0..5 {
            let entry = AuditEntry::new("get_incident", RouteKind::Wrapper, json!({ "i": i }))
                .finish(i, None);
            log.record(&entry).await.unwrap();
        }
        let failed = AuditEntry::new("add_solution", RouteKind::Direct, json!({}))
            .finish(3, Some("Not found".to_string()));
        log.record(&failed).await.unwrap();

        let recent = log.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].args, json!({ "i": 4 }));
        assert_eq!(recent[1].tool, "add_solution");
        assert!(!recent[1].success);
        assert_eq!(recent[1].route, RouteKind::Direct);
    }

    #[tokio::test]
    async fn test_missing_file_and_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(&path);
        assert!(log.recent(10).await.unwrap().is_empty());

        let entry = AuditEntry::new("search_incidents", RouteKind::Wrapper, json!({}));
        log.record(&entry).await.unwrap();
        tokio::fs::write(
            &path,
            format!("{}\nnot json\n", serde_json::to_string(&entry).unwrap()),
        )
        .await
        .unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent, vec![entry]);
    }
}
