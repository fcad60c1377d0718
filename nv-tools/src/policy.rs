use crate::error::{Result, ToolError};
use std::path::{Component, Path, PathBuf};

/// Which root set a path is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    /// Vision only ever looks inside the data root.
    Vision,
}

impl AccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Vision => "VISION",
        }
    }
}

/// The allowed roots and whitelisted scripts for one session.
///
/// Built once at session start and shared read-only afterwards. All stored paths are
/// absolute and canonical, so containment is a component-wise prefix test on
/// canonicalized candidates rather than a string prefix test.
#[derive(Debug, Clone)]
pub struct WorkspacePolicy {
    base_dir: PathBuf,
    read_roots: Vec<PathBuf>,
    write_roots: Vec<PathBuf>,
    data_root: PathBuf,
    run_scripts: Vec<PathBuf>,
    interpreters: Vec<String>,
}

impl WorkspacePolicy {
    /// `base_dir` anchors relative paths in action payloads. The data root starts out
    /// as the base directory until [`Self::with_data_root`] narrows it.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        if base_dir.as_os_str().is_empty() {
            return Err(ToolError::InvalidArguments(
                "base_dir is required".to_string(),
            ));
        }
        let base_dir = if base_dir.is_absolute() {
            base_dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(base_dir)
        };
        let base_dir = canonicalize_lenient(&normalize_lexically(&base_dir));
        Ok(Self {
            data_root: base_dir.clone(),
            base_dir,
            read_roots: Vec::new(),
            write_roots: Vec::new(),
            run_scripts: Vec::new(),
            interpreters: Vec::new(),
        })
    }

    pub fn with_read_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = self.absolute(root.as_ref());
        self.read_roots.push(root);
        self
    }

    pub fn with_write_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = self.absolute(root.as_ref());
        self.write_roots.push(root);
        self
    }

    pub fn with_data_root(mut self, root: impl AsRef<Path>) -> Self {
        self.data_root = self.absolute(root.as_ref());
        self
    }

    pub fn with_run_script(mut self, script: impl AsRef<Path>) -> Self {
        let script = self.absolute(script.as_ref());
        self.run_scripts.push(script);
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreters.push(interpreter.into());
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Normalize a payload path against the base directory and resolve symlinks in
    /// whatever prefix of it already exists.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        canonicalize_lenient(&normalize_path(raw, &self.base_dir))
    }

    /// Resolve `raw` and require it to sit under one of the roots for `kind`.
    pub fn check(&self, kind: AccessKind, raw: &str) -> Result<PathBuf> {
        if raw.trim().is_empty() {
            return Err(ToolError::InvalidArguments("path must not be empty".to_string()));
        }
        let resolved = self.resolve(raw.trim());
        let allowed = match kind {
            AccessKind::Read => self.read_roots.iter().any(|r| resolved.starts_with(r)),
            AccessKind::Write => self.write_roots.iter().any(|r| resolved.starts_with(r)),
            AccessKind::Vision => resolved.starts_with(&self.data_root),
        };
        if !allowed {
            tracing::warn!(
                access = kind.as_str(),
                requested = %raw,
                resolved = %resolved.display(),
                "path rejected by workspace policy"
            );
            return Err(ToolError::PolicyDenied(format!(
                "{raw} is not in allowed directories"
            )));
        }
        Ok(resolved)
    }

    /// Canonicalize a script path and require an exact match with a whitelisted script.
    pub fn check_script(&self, script: &str) -> Result<PathBuf> {
        let resolved = self.resolve(script);
        let normalized = resolved.to_string_lossy();
        if self
            .run_scripts
            .iter()
            .any(|allowed| allowed.to_string_lossy() == normalized)
        {
            return Ok(resolved);
        }
        Err(ToolError::PolicyDenied(format!(
            "Command not allowed: script {script} is not among allowed options"
        )))
    }

    pub fn check_interpreter(&self, interpreter: &str) -> Result<()> {
        if self.interpreters.iter().any(|i| i == interpreter) {
            return Ok(());
        }
        Err(ToolError::PolicyDenied(format!(
            "Command not allowed: interpreter {interpreter:?} is not one of {}",
            self.interpreters.join(", ")
        )))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        canonicalize_lenient(&normalize_path(&path.to_string_lossy(), &self.base_dir))
    }
}

/// Join `raw` onto `base` (unless absolute), unify separators, and fold `.`/`..`
/// lexically. `..` never climbs above the filesystem root.
pub fn normalize_path(raw: &str, base: &Path) -> PathBuf {
    let unified = raw.replace('\\', "/");
    let rel = Path::new(&unified);
    let joined = if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        base.join(rel)
    };
    normalize_lexically(&joined)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(&existing) {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}
