//! Per-session directory layout and the workspace policy derived from it.

use crate::config::WorkspaceConfig;
use anyhow::Result;
use chrono::{DateTime, Local};
use nv_tools::{EXPERIMENT_SCRIPTS, WorkspacePolicy, normalize_path};
use std::path::{Path, PathBuf};

/// `<root>/<project_root>/<project_name>/runs/run_<ts>/{configs,data,logs}`, plus the
/// project-wide embeddings directory shared by every run.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    pub root: PathBuf,
    pub run_name: String,
    pub run_dir: PathBuf,
    pub configs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub embeddings_dir: PathBuf,
    pub default_config_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub started_at: DateTime<Local>,
}

impl SessionLayout {
    pub fn plan(cfg: &WorkspaceConfig, started_at: DateTime<Local>) -> Result<Self> {
        let root = if cfg.root.is_absolute() {
            cfg.root.clone()
        } else {
            std::env::current_dir()?.join(&cfg.root)
        };
        let root = normalize_path(".", &root);
        let project_dir = normalize_path(
            &format!("{}/{}", cfg.project_root, cfg.project_name),
            &root,
        );
        let run_name = format!("run_{}", started_at.format("%Y%m%d_%H%M%S"));
        let run_dir = project_dir.join("runs").join(&run_name);

        Ok(Self {
            configs_dir: run_dir.join("configs"),
            data_dir: run_dir.join("data"),
            logs_dir: run_dir.join("logs"),
            embeddings_dir: project_dir.join("embeddings"),
            default_config_dir: normalize_path(&cfg.default_config_dir, &root),
            scripts_dir: normalize_path(&cfg.scripts_dir, &root),
            run_name,
            run_dir,
            root,
            started_at,
        })
    }

    /// Any failure here aborts the session.
    pub async fn create(&self) -> Result<()> {
        for dir in [
            &self.configs_dir,
            &self.data_dir,
            &self.logs_dir,
            &self.embeddings_dir,
        ] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| anyhow::anyhow!("create session dir {}: {e}", dir.display()))?;
        }
        tracing::info!(run_dir = %self.run_dir.display(), "session directories ready");
        Ok(())
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.logs_dir.join(format!(
            "agent_history_{}.log",
            self.started_at.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn script_paths(&self) -> Vec<PathBuf> {
        EXPERIMENT_SCRIPTS
            .iter()
            .map(|name| self.scripts_dir.join(name))
            .collect()
    }

    /// Reads: run configs, shared default configs, run data. Writes: run configs and
    /// run data. Vision: run data only.
    pub fn policy(&self, interpreters: &[String]) -> Result<WorkspacePolicy> {
        let mut policy = WorkspacePolicy::new(&self.root)?
            .with_read_root(&self.configs_dir)
            .with_read_root(&self.default_config_dir)
            .with_read_root(&self.data_dir)
            .with_write_root(&self.configs_dir)
            .with_write_root(&self.data_dir)
            .with_data_root(&self.data_dir);
        for script in self.script_paths() {
            policy = policy.with_run_script(script);
        }
        for interpreter in interpreters.iter().filter(|i| !i.trim().is_empty()) {
            policy = policy.with_interpreter(interpreter.trim());
        }
        Ok(policy)
    }

    /// `path` relative to the workspace root with `/` separators, for prompts.
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nv_tools::AccessKind;

    fn layout(root: &Path) -> SessionLayout {
        let cfg = WorkspaceConfig {
            root: root.to_path_buf(),
            ..WorkspaceConfig::default()
        };
        let started = Local.with_ymd_and_hms(2025, 5, 2, 12, 34, 56).unwrap();
        SessionLayout::plan(&cfg, started).unwrap()
    }

    #[test]
    fn run_directories_are_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        assert_eq!(l.run_name, "run_20250502_123456");
        assert_eq!(
            l.display(&l.data_dir),
            "projects/NVExperiment/runs/run_20250502_123456/data"
        );
        assert_eq!(l.display(&l.embeddings_dir), "projects/NVExperiment/embeddings");
        assert!(
            l.audit_log_path()
                .ends_with("logs/agent_history_20250502_123456.log")
        );
    }

    #[tokio::test]
    async fn create_makes_every_directory() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        l.create().await.unwrap();
        assert!(l.configs_dir.is_dir());
        assert!(l.data_dir.is_dir());
        assert!(l.logs_dir.is_dir());
        assert!(l.embeddings_dir.is_dir());
    }

    #[tokio::test]
    async fn policy_follows_layout() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        l.create().await.unwrap();
        let policy = l.policy(&["python3".to_string()]).unwrap();

        let run_config = format!("{}/x.json", l.display(&l.configs_dir));
        assert!(policy.check(AccessKind::Write, &run_config).is_ok());
        assert!(
            policy
                .check(AccessKind::Read, "projects/configs/default_esr_config.json")
                .is_ok()
        );
        assert!(
            policy
                .check(AccessKind::Write, "projects/configs/default_esr_config.json")
                .is_err()
        );
        assert!(policy.check_script("experiment_scripts/ESR.py").is_ok());
        assert!(policy.check_interpreter("python3").is_ok());
        assert!(policy.check_interpreter("bash").is_err());
    }
}
