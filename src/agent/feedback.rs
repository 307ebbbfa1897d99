//! Per-tool scorekeeping persisted as a single JSON document

use crate::agent::redact::redact;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Notes kept per tool; older ones are dropped
const MAX_NOTES: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFeedback {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    /// Running totals; individual ratings are not kept
    #[serde(default)]
    pub rating_count: u64,
    #[serde(default)]
    pub rating_sum: u64,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ToolFeedback {
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }

    fn add_rating(&mut self, rating: u8) {
        self.rating_count += 1;
        self.rating_sum += u64::from(rating);
        self.average_rating = Some(self.rating_sum as f64 / self.rating_count as f64);
    }
}

pub type FeedbackBoard = BTreeMap<String, ToolFeedback>;

/// Read-modify-write store; each write lands via temp file and rename
pub struct FeedbackStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current board; empty when nothing has been written yet
    pub async fn load(&self) -> Result<FeedbackBoard> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(FeedbackBoard::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FeedbackBoard::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, tool: &str) -> Result<Option<ToolFeedback>> {
        Ok(self.load().await?.remove(tool))
    }

    pub async fn record_call(&self, tool: &str, success: bool) -> Result<ToolFeedback> {
        self.update(tool, |entry| {
            entry.calls += 1;
            if success {
                entry.successes += 1;
            } else {
                entry.failures += 1;
            }
            entry.last_used = Some(Utc::now());
        })
        .await
    }

    /// Rate a tool from 1 to 5, optionally with a note (stored redacted)
    pub async fn rate(&self, tool: &str, rating: u8, note: Option<&str>) -> Result<ToolFeedback> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(format!(
                "Rating must be between 1 and 5, got {}",
                rating
            )));
        }
        let note = note.map(str::trim).filter(|n| !n.is_empty()).map(redact);

        self.update(tool, move |entry| {
            entry.add_rating(rating);
            if let Some(note) = note {
                entry.notes.push(note);
                let excess = entry.notes.len().saturating_sub(MAX_NOTES);
                entry.notes.drain(..excess);
            }
        })
        .await
    }

    async fn update<F>(&self, tool: &str, apply: F) -> Result<ToolFeedback>
    where
        F: FnOnce(&mut ToolFeedback),
    {
        let _guard = self.lock.lock().await;
        let mut board = self.load().await?;
        let entry = board.entry(tool.to_string()).or_default();
        apply(entry);
        let updated = entry.clone();
        self.save(&board).await?;
        Ok(updated)
    }

    async fn save(&self, board: &FeedbackBoard) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(board)?;
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
