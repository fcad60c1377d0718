//! Conversation loop controller.

use crate::actions::{ParsedAction, parse_response};
use crate::audit::{AuditLog, AuditRole};
use crate::commands::{Command, HELP, parse_command};
use crate::dispatch::{Dispatcher, Outcome};
use crate::layout::SessionLayout;
use crate::prompt;
use crate::transcript::{Role, Transcript};
use nv_llm::{CompletionRequest, Embedder, LanguageModel};
use nv_memory::{
    ContextAssembler, EmbeddingRecord, plot_status, relevant_plots, unanalyzed_plots,
};
use nv_operator::{Operator, SessionId};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Exit,
    EndOfInput,
    Interrupted,
    Failed,
}

impl SessionEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::EndOfInput => "end_of_input",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Retrieval over past sessions plus the store this session is saved into.
pub struct SessionMemory {
    pub assembler: ContextAssembler,
    pub top_k: usize,
}

pub struct Agent {
    session_id: SessionId,
    layout: SessionLayout,
    instructions: String,
    generation: Generation,
    model: Arc<dyn LanguageModel>,
    operator: Arc<dyn Operator>,
    dispatcher: Dispatcher,
    memory: Option<SessionMemory>,
    audit: AuditLog,
    transcript: Transcript,
    state: LoopState,
}

impl Agent {
    pub fn new(
        layout: SessionLayout,
        instructions: String,
        generation: Generation,
        model: Arc<dyn LanguageModel>,
        operator: Arc<dyn Operator>,
        dispatcher: Dispatcher,
        audit: AuditLog,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            layout,
            instructions,
            generation,
            model,
            operator,
            dispatcher,
            memory: None,
            audit,
            transcript: Transcript::new(),
            state: LoopState::Idle,
        }
    }

    pub fn with_memory(mut self, memory: SessionMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Reads turns until exit, end of input, an operator failure, or `shutdown`
    /// resolves. Whatever the reason, the session is saved before returning.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> SessionEnd {
        tokio::pin!(shutdown);

        let end = loop {
            let next = tokio::select! {
                turn = self.operator.next_turn() => Some(turn),
                () = &mut shutdown => None,
            };
            let input = match next {
                None => break SessionEnd::Interrupted,
                Some(Ok(None)) => break SessionEnd::EndOfInput,
                Some(Ok(Some(input))) => input,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "reading the next turn failed");
                    break SessionEnd::Failed;
                }
            };
            if input.trim().is_empty() {
                continue;
            }

            if let Some(command) = parse_command(&input) {
                if command == Command::Exit {
                    break SessionEnd::Exit;
                }
                self.execute(command).await;
                continue;
            }

            let interrupted = tokio::select! {
                _ = self.handle_turn(&input) => false,
                () = &mut shutdown => true,
            };
            if interrupted {
                self.state = LoopState::Idle;
                break SessionEnd::Interrupted;
            }
        };

        tracing::info!(
            session_id = %self.session_id,
            end = end.as_str(),
            turns = self.transcript.len(),
            "session ending"
        );
        self.persist(end.as_str()).await;
        self.show("Goodbye!").await;
        end
    }

    /// One human turn: prompt, model call, parse, then every action in order.
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %self.session_id))]
    pub async fn handle_turn(&mut self, input: &str) -> Vec<Outcome> {
        self.state = LoopState::Processing;
        let outcomes = self.process(input).await;
        self.state = LoopState::Idle;
        outcomes
    }

    async fn process(&mut self, input: &str) -> Vec<Outcome> {
        self.audit.record(AuditRole::User, input).await;
        self.transcript.push(Role::User, input);

        let addenda = self.addenda(input).await;
        let request = CompletionRequest {
            prompt: prompt::compose(&self.instructions, &addenda, &self.transcript),
            system: self.instructions.clone(),
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
        };
        tracing::debug!(
            prompt_len = request.prompt.len(),
            addenda = addenda.len(),
            history_turns = self.transcript.len(),
            "prompt assembled"
        );

        let started = Instant::now();
        let reply = match self.model.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(model = %self.generation.model, error = %e, "model call failed");
                let msg = format!("[System] Model call failed: {e}");
                self.audit.record(AuditRole::Action, &msg).await;
                self.show(&msg).await;
                self.transcript.push(Role::System, msg);
                return Vec::new();
            }
        };
        tracing::info!(
            model = %self.generation.model,
            latency_ms = started.elapsed().as_millis() as u64,
            reply_len = reply.len(),
            "model call completed"
        );

        self.audit.record(AuditRole::Assistant, &reply).await;
        self.transcript.push(Role::Assistant, reply.as_str());

        let parsed = parse_response(&reply);
        if let Some(reasoning) = &parsed.reasoning {
            let entry = format!("(THINK) {reasoning}");
            self.audit.record(AuditRole::Assistant, &entry).await;
            self.transcript.push_internal(Role::Assistant, entry);
        }
        if parsed.dropped > 0 {
            tracing::warn!(dropped = parsed.dropped, "some action blocks were not decodable");
        }
        if parsed.actions.is_empty() && parsed.reasoning.is_none() {
            self.show(&reply).await;
        }

        let mut outcomes = Vec::with_capacity(parsed.actions.len());
        for action in parsed.actions {
            let outcome = match action {
                ParsedAction::Request(request) => {
                    self.dispatcher.dispatch(&mut self.transcript, request).await
                }
                ParsedAction::Unknown { action_type } => {
                    self.dispatcher
                        .reject_unknown(&mut self.transcript, &action_type)
                        .await
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Retrieved history and plot hints placed between the instructions and the transcript.
    async fn addenda(&self, query: &str) -> Vec<String> {
        let mut addenda = Vec::new();
        if let Some(memory) = &self.memory {
            let context = memory.assembler.build_context(query, memory.top_k).await;
            if !context.is_empty() {
                addenda.push(context.text);
            }
        }

        let data_dir = &self.layout.data_dir;
        match relevant_plots(query, data_dir) {
            Ok(plots) if !plots.is_empty() => addenda.push(format!(
                "Plots in the current run related to this request: {}",
                plots.join(", ")
            )),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "listing relevant plots failed"),
        }
        match unanalyzed_plots(data_dir, self.transcript.vision_invocations()) {
            Ok(plots) if !plots.is_empty() => addenda.push(format!(
                "Plots not analyzed yet (use a vision action to inspect them): {}",
                plots.join(", ")
            )),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "listing unanalyzed plots failed"),
        }
        addenda
    }

    /// Saves the transcript and plot status as one new record. Failures are
    /// reported, never raised.
    pub async fn persist(&self, reason: &str) -> Option<PathBuf> {
        let memory = self.memory.as_ref()?;
        if self.transcript.is_empty() {
            tracing::debug!(reason, "empty transcript; nothing to save");
            return None;
        }

        let text = self.snapshot_text();
        let embeddings = match memory
            .assembler
            .embedder()
            .embed(std::slice::from_ref(&text))
            .await
        {
            Ok(mut vectors) => vectors.pop().unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "embedding the transcript failed; saving text only");
                Vec::new()
            }
        };

        let record = EmbeddingRecord::new(text, embeddings).with_session(self.session_id.as_str());
        match memory.assembler.store().save(&record).await {
            Ok(path) => {
                tracing::info!(reason, path = %path.display(), "conversation saved");
                Some(path)
            }
            Err(e) => {
                tracing::error!(reason, error = %e, "saving conversation failed");
                self.show(&format!("[System] Could not save conversation embeddings: {e}"))
                    .await;
                None
            }
        }
    }

    fn snapshot_text(&self) -> String {
        let mut text = self.transcript.render();
        text.push_str("\n\nPlot status:");
        match plot_status(&self.layout.data_dir, self.transcript.vision_invocations()) {
            Ok(plots) if plots.is_empty() => text.push_str(" no plots in this run"),
            Ok(plots) => {
                for plot in plots {
                    let status = if plot.analyzed { "analyzed" } else { "not analyzed" };
                    text.push_str(&format!("\n{}: {status}", plot.file_name));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "plot status unavailable");
                text.push_str(" unavailable");
            }
        }
        text
    }

    async fn execute(&mut self, command: Command) {
        let reply = match command {
            Command::Exit => return,
            Command::Checkpoint => match self.persist("checkpoint").await {
                Some(path) => format!("Checkpoint saved to {}", self.layout.display(&path)),
                None => "Nothing to checkpoint (memory disabled or empty conversation).".to_string(),
            },
            Command::Plots => self.plots_report(),
            Command::Status => self.status_report(),
            Command::Search(query) => match &self.memory {
                Some(memory) => {
                    let context = memory.assembler.build_context(&query, memory.top_k).await;
                    if context.is_empty() {
                        "No matching history.".to_string()
                    } else {
                        context.text
                    }
                }
                None => "Memory is disabled.".to_string(),
            },
            Command::Help => HELP.to_string(),
            Command::Unknown(msg) => msg,
        };
        self.show(&reply).await;
    }

    fn plots_report(&self) -> String {
        match plot_status(&self.layout.data_dir, self.transcript.vision_invocations()) {
            Ok(plots) if plots.is_empty() => "No plots in this run yet.".to_string(),
            Ok(plots) => plots
                .iter()
                .map(|p| {
                    let mark = if p.analyzed { "analyzed" } else { "not analyzed" };
                    format!("{}  {mark}", p.file_name)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("Could not list plots: {e}"),
        }
    }

    fn status_report(&self) -> String {
        format!(
            "session={}\nmodel={}\nturns={}\nrun_dir={}\naudit_log={}\nmemory={}",
            self.session_id,
            self.generation.model,
            self.transcript.len(),
            self.layout.display(&self.layout.run_dir),
            self.layout.display(self.audit.path()),
            if self.memory.is_some() { "on" } else { "off" },
        )
    }

    async fn show(&self, text: &str) {
        if let Err(e) = self.operator.show(text).await {
            tracing::warn!(error = %e, "display failed");
        }
    }
}
