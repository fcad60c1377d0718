//! Startup wiring: configuration to clients, workspace policy and the agent.

use crate::agent::{Agent, Generation, SessionMemory};
use crate::audit::AuditLog;
use crate::config::{EmbedderKind, NvAgentConfig};
use crate::dispatch::{Approvals, Dispatcher};
use crate::layout::SessionLayout;
use crate::prompt;
use anyhow::Result;
use chrono::{DateTime, Local};
use nv_llm::{Embedder, LanguageModel, LlmClient, OpenAiEmbeddingClient, Provider};
use nv_memory::{CachingEmbedder, ContextAssembler, EmbeddingStore, HashingEmbedder};
use nv_operator::Operator;
use nv_tools::TokioProcessRunner;
use std::sync::Arc;
use std::time::Duration;

fn key_env_var(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::OpenAiCompatible => "OPENAI_API_KEY",
    }
}

fn required_key(cfg: &NvAgentConfig, model: &str) -> Result<String> {
    cfg.api_key_for(model).ok_or_else(|| {
        let provider = nv_llm::detect_provider(model);
        anyhow::anyhow!(
            "no API key for model {model:?} ({}); set {} or the [keys] section",
            provider.as_str(),
            key_env_var(provider)
        )
    })
}

pub fn build_model(cfg: &NvAgentConfig) -> Result<LlmClient> {
    let general = &cfg.general;
    let api_key = required_key(cfg, &general.model)?;
    let client = LlmClient::new(
        &api_key,
        &general.model,
        general.vision_model(),
        general.base_url.as_deref(),
        Duration::from_secs(general.request_timeout_secs),
    )?;

    if nv_llm::detect_provider(general.vision_model()) == client.provider() {
        return Ok(client);
    }
    let vision_key = required_key(cfg, general.vision_model())?;
    Ok(client.with_vision_api_key(&vision_key))
}

pub fn build_embedder(cfg: &NvAgentConfig) -> Result<Arc<dyn Embedder>> {
    let memory = &cfg.memory;
    let embedder: Arc<dyn Embedder> = match memory.embedder {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(memory.embedding_dims)?),
        EmbedderKind::Openai => {
            let api_key = cfg
                .keys
                .openai_api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("memory.embedder = \"openai\" requires OPENAI_API_KEY")
                })?;
            Arc::new(OpenAiEmbeddingClient::new(
                &api_key,
                &memory.embedding_model,
                None,
            ))
        }
    };

    if memory.cache_embeddings {
        return Ok(Arc::new(CachingEmbedder::new(embedder)));
    }
    Ok(embedder)
}

pub fn build_assembler(cfg: &NvAgentConfig, layout: &SessionLayout) -> Result<ContextAssembler> {
    Ok(ContextAssembler::new(
        EmbeddingStore::new(&layout.embeddings_dir),
        build_embedder(cfg)?,
    ))
}

/// Creates the run directories and assembles a ready-to-run agent.
pub async fn build_agent(
    cfg: &NvAgentConfig,
    operator: Arc<dyn Operator>,
    started_at: DateTime<Local>,
) -> Result<Agent> {
    let layout = SessionLayout::plan(&cfg.workspace, started_at)?;
    layout.create().await?;

    let model: Arc<dyn LanguageModel> = Arc::new(build_model(cfg)?);
    let policy = Arc::new(layout.policy(&cfg.workspace.interpreters)?);
    let audit = AuditLog::new(layout.audit_log_path());
    let runner = Arc::new(TokioProcessRunner::new(
        &layout.root,
        cfg.security.run_timeout_secs.map(Duration::from_secs),
    ));
    let dispatcher = Dispatcher::new(policy, operator.clone(), model.clone(), runner, audit.clone())
        .with_approvals(Approvals::from(&cfg.security))
        .with_vision_context_turns(cfg.memory.vision_context_turns);

    let interpreter = cfg
        .workspace
        .interpreters
        .iter()
        .map(|i| i.trim())
        .find(|i| !i.is_empty())
        .unwrap_or("python");
    let instructions = prompt::instructions(
        &layout,
        interpreter,
        cfg.general.extra_instructions.as_deref(),
    );

    let memory = if cfg.memory.enabled {
        Some(SessionMemory {
            assembler: build_assembler(cfg, &layout)?,
            top_k: cfg.memory.top_k,
        })
    } else {
        None
    };

    let generation = Generation {
        model: cfg.general.model.clone(),
        max_tokens: cfg.general.max_tokens,
        temperature: cfg.general.temperature,
    };
    let mut agent = Agent::new(
        layout.clone(),
        instructions,
        generation,
        model,
        operator,
        dispatcher,
        audit,
    );
    if let Some(memory) = memory {
        agent = agent.with_memory(memory);
    }

    tracing::info!(
        session_id = %agent.session_id(),
        run_dir = %layout.run_dir.display(),
        model = %cfg.general.model,
        vision_model = %cfg.general.vision_model(),
        memory = cfg.memory.enabled,
        "agent ready"
    );
    Ok(agent)
}
