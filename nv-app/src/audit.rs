//! Append-only human-readable session history, separate from diagnostics.

use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditRole {
    User,
    Assistant,
    Action,
}

impl AuditRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
            Self::Action => "ACTION",
        }
    }
}

/// `[YYYY-mm-dd HH:MM:SS] ROLE: message` per event. Write failures are
/// reported through tracing and otherwise ignored.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, role: AuditRole, message: &str) {
        let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), role, message);
        if let Err(e) = self.append(&line).await {
            tracing::warn!(error = %e, path = %self.path.display(), "audit log write failed");
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

fn format_line(timestamp: &str, role: AuditRole, message: &str) -> String {
    format!("[{timestamp}] {}: {message}\n", role.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format() {
        assert_eq!(
            format_line("2025-05-02 12:00:00", AuditRole::Action, "READ: a.json"),
            "[2025-05-02 12:00:00] ACTION: READ: a.json\n"
        );
    }

    #[tokio::test]
    async fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("agent_history.log"));
        log.record(AuditRole::User, "hello").await;
        log.record(AuditRole::Assistant, "hi").await;

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] USER: hello"));
        assert!(lines[1].ends_with("] ASSISTANT: hi"));
    }

    #[tokio::test]
    async fn unwritable_log_does_not_fail() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("missing").join("x.log"));
        log.record(AuditRole::Action, "ignored").await;
        assert!(!log.path().exists());
    }
}
