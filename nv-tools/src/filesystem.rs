use crate::error::{Result, ToolError};
use std::path::Path;

const FILE_BYTES_MAX: usize = 1_000_000;

/// Read a policy-checked file as text. Absent files are `NotFound`, not `Io`.
#[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_text_file(path: &Path) -> Result<String> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ToolError::NotFound(path.display().to_string()));
    }
    let bytes = tokio::fs::read(path).await?;
    if bytes.len() > FILE_BYTES_MAX {
        return Err(ToolError::ExternalFailure(format!(
            "file too large: {} bytes (max {FILE_BYTES_MAX})",
            bytes.len()
        )));
    }
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Persist `data` as pretty JSON, creating parents and replacing any existing file.
#[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json_file(path: &Path, data: &serde_json::Value) -> Result<()> {
    let content = serde_json::to_string_pretty(data)?;
    if content.len() > FILE_BYTES_MAX {
        return Err(ToolError::InvalidArguments(format!(
            "content too large: {} bytes (max {FILE_BYTES_MAX})",
            content.len()
        )));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parents_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("configs/nested/x.json");
        write_json_file(&path, &serde_json::json!({"a": 1})).await.unwrap();
        write_json_file(&path, &serde_json::json!({"a": 2})).await.unwrap();
        let text = read_text_file(&path).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v, serde_json::json!({"a": 2}));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_text_file(&tmp.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
