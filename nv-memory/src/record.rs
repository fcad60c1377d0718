//! On-disk embedding records: one JSON file per saved transcript snapshot.

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// A persisted transcript snapshot and the embedding of its full text.
///
/// Only `text` is used at query time; the stored vector is kept for
/// compatibility with older record files and offline tooling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub text: String,
    #[serde(default)]
    pub embeddings: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl EmbeddingRecord {
    pub fn new(text: impl Into<String>, embeddings: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            embeddings,
            session_id: None,
            created_at: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Directory of record files. Records are never modified once written.
#[derive(Clone, Debug)]
pub struct EmbeddingStore {
    dir: PathBuf,
}

impl EmbeddingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record files sorted by name. Saved names start with a fixed-width UTC
    /// timestamp, so this is creation order across sessions.
    /// A missing directory is an empty store.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub async fn load(&self, path: &Path) -> Result<EmbeddingRecord> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes a new record file and returns its path. Existing files are never replaced.
    pub async fn save(&self, record: &EmbeddingRecord) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let session = record.session_id.as_deref().unwrap_or("session");
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let json = serde_json::to_vec_pretty(record)?;

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("conversation_{stamp}_{session}.json")
            } else {
                format!("conversation_{stamp}_{session}_{attempt}.json")
            };
            let path = self.dir.join(name);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(&json).await?;
                    file.flush().await?;
                    tracing::debug!(path = %path.display(), "saved embedding record");
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
