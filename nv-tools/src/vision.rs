use crate::error::{Result, ToolError};
use std::path::Path;

const MISPLACED_DATA_PREFIXES: [&str; 2] = ["projects/data/", "data/"];

/// Map the path shapes models tend to produce for plots onto `<data_root>/<basename>`.
///
/// Bare filenames, `data/...`-style prefixes and paths into some run's data directory
/// are all rewritten. Absolute paths are left as they are for the containment check
/// to judge.
pub fn rewrite_vision_path(raw: &str, data_root: &Path) -> String {
    let trimmed = raw.trim();
    let unified = trimmed.replace('\\', "/");
    if Path::new(&unified).is_absolute() {
        return trimmed.to_string();
    }

    let basename = unified.rsplit('/').next().unwrap_or_default();
    if basename.is_empty() {
        return trimmed.to_string();
    }

    let rewrite = basename == unified
        || MISPLACED_DATA_PREFIXES.iter().any(|p| unified.starts_with(p))
        || unified.contains("NVExperiment/runs/")
        || unified.contains("data");
    if rewrite {
        return data_root.join(basename).to_string_lossy().to_string();
    }
    trimmed.to_string()
}

/// Read image bytes for the vision collaborator.
#[tracing::instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_image(path: &Path) -> Result<Vec<u8>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ToolError::NotFound(path.display().to_string()));
    }
    Ok(tokio::fs::read(path).await?)
}
