//! Answer persistence
//!
//! `JsonAnswerStore` keeps one JSON file per question:
//! - <root>/<interview id>/question-<index>.json
//!
//! Saving the same question again replaces the previous answer.

use super::schema::AnswerRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Directory used for answers saved without an interview id
pub const UNASSIGNED_DIR: &str = "unassigned";

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid interview id: {0:?}")]
    InvalidInterviewId(String),
}

/// Receives saved answers
#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn save(&self, record: &AnswerRecord) -> Result<(), PersistenceError>;
}

/// Stores answers as pretty-printed JSON files
#[derive(Debug, Clone)]
pub struct JsonAnswerStore {
    root: PathBuf,
}

impl JsonAnswerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn interview_dir(&self, interview_id: &str) -> Result<PathBuf, PersistenceError> {
        if interview_id.is_empty() {
            return Ok(self.root.join(UNASSIGNED_DIR));
        }

        let unsafe_id = interview_id == "."
            || interview_id == ".."
            || interview_id.contains(['/', '\\'])
            || interview_id.contains('\0');
        if unsafe_id {
            return Err(PersistenceError::InvalidInterviewId(interview_id.to_string()));
        }

        Ok(self.root.join(interview_id))
    }

    fn record_path(&self, interview_id: &str, question_index: usize) -> Result<PathBuf, PersistenceError> {
        Ok(self
            .interview_dir(interview_id)?
            .join(format!("question-{question_index}.json")))
    }

    /// Load the saved answer for one question, if there is one
    pub async fn load(
        &self,
        interview_id: &str,
        question_index: usize,
    ) -> Result<Option<AnswerRecord>, PersistenceError> {
        let path = self.record_path(interview_id, question_index)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All saved answers of an interview, ordered by question
    pub async fn list(&self, interview_id: &str) -> Result<Vec<AnswerRecord>, PersistenceError> {
        let dir = self.interview_dir(interview_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            records.push(serde_json::from_str::<AnswerRecord>(&content)?);
        }

        records.sort_by_key(|r| r.question_index);
        Ok(records)
    }
}

#[async_trait]
impl AnswerStore for JsonAnswerStore {
    async fn save(&self, record: &AnswerRecord) -> Result<(), PersistenceError> {
        let path = self.record_path(&record.interview_id, record.question_index)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, content).await?;

        tracing::debug!(
            "Saved answer {} for question {} to {:?}",
            record.id,
            record.question_index,
            path
        );
        Ok(())
    }
}
