//! nvagent configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "nvagent.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NvAgentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Defaults to `model`.
    #[serde(default)]
    pub vision_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// OpenAI-compatible endpoint (DeepSeek, Together, a local server).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Appended to the built-in agent instructions.
    #[serde(default)]
    pub extra_instructions: Option<String>,
}

fn default_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            vision_model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            extra_instructions: None,
        }
    }
}

impl GeneralConfig {
    pub fn vision_model(&self) -> &str {
        self.vision_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.model)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_project_root")]
    pub project_root: String,
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_config_dir")]
    pub default_config_dir: String,
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    #[serde(default = "default_interpreters")]
    pub interpreters: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_project_root() -> String {
    "projects".to_string()
}

fn default_project_name() -> String {
    "NVExperiment".to_string()
}

fn default_config_dir() -> String {
    "projects/configs".to_string()
}

fn default_scripts_dir() -> String {
    "experiment_scripts".to_string()
}

fn default_interpreters() -> Vec<String> {
    vec!["py".to_string(), "python".to_string(), "python3".to_string()]
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            project_root: default_project_root(),
            project_name: default_project_name(),
            default_config_dir: default_config_dir(),
            scripts_dir: default_scripts_dir(),
            interpreters: default_interpreters(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    #[default]
    Human,
    /// Skips the question but still records a granted answer.
    Auto,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub write_approval: ApprovalMode,
    #[serde(default)]
    pub run_approval: ApprovalMode,
    #[serde(default)]
    pub vision_approval: ApprovalMode,
    /// Experiment scripts run to completion when unset.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Hashing,
    Openai,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub embedder: EmbedderKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    #[serde(default)]
    pub cache_embeddings: bool,
    #[serde(default = "default_vision_context_turns")]
    pub vision_context_turns: usize,
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    3
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dims() -> usize {
    384
}

fn default_vision_context_turns() -> usize {
    4
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            top_k: default_top_k(),
            embedder: EmbedderKind::default(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            cache_embeddings: false,
            vision_context_turns: default_vision_context_turns(),
        }
    }
}

impl NvAgentConfig {
    /// An explicit path must exist; the default `./nvagent.toml` may be absent.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file; using built-in defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = var("NVAGENT_MODEL") {
            self.general.model = v;
        }
        if let Some(v) = var("NVAGENT_VISION_MODEL") {
            self.general.vision_model = Some(v);
        }
        if let Some(v) = var("NVAGENT_LLM_BASE_URL") {
            self.general.base_url = Some(v);
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.keys.openai_api_key = Some(v);
        }
        if let Some(v) = var("ANTHROPIC_API_KEY") {
            self.keys.anthropic_api_key = Some(v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        if self.general.max_tokens == 0 {
            return Err(anyhow::anyhow!("general.max_tokens must be > 0"));
        }
        if self.memory.top_k == 0 {
            return Err(anyhow::anyhow!("memory.top_k must be > 0"));
        }
        if self.memory.embedding_dims == 0 {
            return Err(anyhow::anyhow!("memory.embedding_dims must be > 0"));
        }
        if self.workspace.interpreters.iter().all(|i| i.trim().is_empty()) {
            return Err(anyhow::anyhow!(
                "workspace.interpreters must name at least one interpreter"
            ));
        }
        if self.workspace.project_name.trim().is_empty() {
            return Err(anyhow::anyhow!("workspace.project_name is required"));
        }
        Ok(())
    }

    pub fn api_key_for(&self, model: &str) -> Option<String> {
        let key = match nv_llm::detect_provider(model) {
            nv_llm::Provider::Anthropic => &self.keys.anthropic_api_key,
            nv_llm::Provider::OpenAiCompatible => &self.keys.openai_api_key,
        };
        key.clone().filter(|s| !s.trim().is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    Path::new(".").join(DEFAULT_CONFIG_FILE)
}
