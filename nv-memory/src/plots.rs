//! Plot artifacts produced by the experiment scripts.
//!
//! Nothing here is persisted: the set of plots is whatever image files the
//! data directory holds, and "analyzed" means the session recorded a vision
//! invocation on a path with that file name. Callers pass the recorded
//! invocation paths, never free transcript text.

use crate::error::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// File stems the experiment scripts write their plots under.
pub const PLOT_STEMS: [&str; 4] = ["ESR_plot", "FindNV_plot", "GalvoScan_plot", "Optimization_plot"];

/// Prefix of the transcript line shown to the model for every executed vision analysis.
pub const VISION_MARKER: &str = "VISION: ";

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Lowercase query fragments that point at each plot stem.
const PLOT_KEYWORDS: [(&str, &[&str]); 4] = [
    ("ESR_plot", &["esr", "resonance", "odmr", "microwave", "frequency", "spin"]),
    ("FindNV_plot", &["find_nv", "findnv", "find nv", "nv center", "nv centre", "locate"]),
    ("GalvoScan_plot", &["galvo", "scan", "confocal", "coarse", "bright"]),
    ("Optimization_plot", &["optimiz", "optimis", "focus", "maximi", "counts"]),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlotArtifact {
    pub file_name: String,
    pub analyzed: bool,
}

/// Plot stems mentioned in `text`, in fixed order, deduplicated, as `<stem>.png`.
pub fn cited_plots(text: &str) -> Vec<String> {
    PLOT_STEMS
        .iter()
        .filter(|stem| text.contains(*stem))
        .map(|stem| format!("{stem}.png"))
        .collect()
}

/// Image files directly under `data_root`, sorted. A missing directory has none.
pub fn list_plots(data_root: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(data_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if let (true, Some(name)) = (is_image, path.file_name().and_then(|n| n.to_str())) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Existing plots the query is about. When the query names no experiment,
/// every existing plot is relevant.
pub fn relevant_plots(query: &str, data_root: &Path) -> Result<Vec<String>> {
    let available = list_plots(data_root)?;
    let lowered = query.to_lowercase();
    let requested: Vec<&str> = PLOT_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(stem, _)| *stem)
        .collect();

    if requested.is_empty() {
        return Ok(available);
    }
    Ok(available
        .into_iter()
        .filter(|name| requested.iter().any(|stem| name.contains(stem)))
        .collect())
}

/// File names of the recorded vision invocations.
pub fn analyzed_plot_names<'a>(invocations: impl IntoIterator<Item = &'a Path>) -> HashSet<String> {
    invocations
        .into_iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Existing plots with no vision invocation recorded for them.
pub fn unanalyzed_plots<'a>(
    data_root: &Path,
    invocations: impl IntoIterator<Item = &'a Path>,
) -> Result<Vec<String>> {
    Ok(plot_status(data_root, invocations)?
        .into_iter()
        .filter(|plot| !plot.analyzed)
        .map(|plot| plot.file_name)
        .collect())
}

/// Every existing plot and whether it has been analyzed.
pub fn plot_status<'a>(
    data_root: &Path,
    invocations: impl IntoIterator<Item = &'a Path>,
) -> Result<Vec<PlotArtifact>> {
    let analyzed = analyzed_plot_names(invocations);
    Ok(list_plots(data_root)?
        .into_iter()
        .map(|file_name| PlotArtifact {
            analyzed: analyzed.contains(&file_name),
            file_name,
        })
        .collect())
}
