//! Capability sandbox: permission gate, containment checks, and the five effectors.

use crate::actions::{ActionKind, ActionRequest, WritePayload};
use crate::audit::{AuditLog, AuditRole};
use crate::config::{ApprovalMode, SecurityConfig};
use crate::transcript::{Role, Transcript};
use nv_llm::{ImageInput, LanguageModel, media_type_for_extension};
use nv_operator::{Operator, PermissionAnswer};
use nv_tools::{
    AccessKind, ProcessOutput, ProcessRunner, RunCommand, ToolError, WorkspacePolicy, load_image,
    parse_run_command, read_text_file, rewrite_vision_path, write_json_file,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// How each side-effecting action kind is approved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Approvals {
    pub write: ApprovalMode,
    pub run: ApprovalMode,
    pub vision: ApprovalMode,
}

impl Approvals {
    fn mode(&self, kind: ActionKind) -> ApprovalMode {
        match kind {
            ActionKind::Write => self.write,
            ActionKind::Run => self.run,
            ActionKind::Vision => self.vision,
            ActionKind::Message | ActionKind::Read => ApprovalMode::Auto,
        }
    }
}

impl From<&SecurityConfig> for Approvals {
    fn from(cfg: &SecurityConfig) -> Self {
        Self {
            write: cfg.write_approval,
            run: cfg.run_approval,
            vision: cfg.vision_approval,
        }
    }
}

/// What happened to one action. The transcript entry has already been appended.
#[derive(Debug)]
pub enum Outcome {
    Displayed,
    ReadFile { path: PathBuf },
    WroteFile { path: PathBuf },
    Ran { exit_code: i32 },
    Analyzed { path: PathBuf },
    /// The human said no. Kept apart from `Failed(PolicyDenied)` so "not approved"
    /// and "not allowed" stay distinguishable.
    PermissionDenied { kind: ActionKind, error: ToolError },
    Failed(ToolError),
    Unknown { action_type: String },
}

pub struct Dispatcher {
    policy: Arc<WorkspacePolicy>,
    operator: Arc<dyn Operator>,
    model: Arc<dyn LanguageModel>,
    runner: Arc<dyn ProcessRunner>,
    audit: AuditLog,
    approvals: Approvals,
    vision_context_turns: usize,
}

impl Dispatcher {
    pub fn new(
        policy: Arc<WorkspacePolicy>,
        operator: Arc<dyn Operator>,
        model: Arc<dyn LanguageModel>,
        runner: Arc<dyn ProcessRunner>,
        audit: AuditLog,
    ) -> Self {
        Self {
            policy,
            operator,
            model,
            runner,
            audit,
            approvals: Approvals::default(),
            vision_context_turns: 4,
        }
    }

    pub fn with_approvals(mut self, approvals: Approvals) -> Self {
        self.approvals = approvals;
        self
    }

    pub fn with_vision_context_turns(mut self, turns: usize) -> Self {
        self.vision_context_turns = turns;
        self
    }

    #[tracing::instrument(level = "info", skip_all, fields(action = action.kind().as_str()))]
    pub async fn dispatch(&self, transcript: &mut Transcript, action: ActionRequest) -> Outcome {
        let started = Instant::now();
        let outcome = match action {
            ActionRequest::Message(text) => self.message(transcript, text).await,
            ActionRequest::Read(path) => self.read(transcript, &path).await,
            ActionRequest::Write(payload) => self.write(transcript, payload).await,
            ActionRequest::Run(command) => self.run(transcript, &command).await,
            ActionRequest::Vision(path) => self.vision(transcript, &path).await,
        };
        tracing::info!(
            latency_ms = started.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "action dispatched"
        );
        outcome
    }

    pub async fn reject_unknown(&self, transcript: &mut Transcript, action_type: &str) -> Outcome {
        tracing::warn!(action_type = %action_type, "model requested unknown action type");
        self.notice(transcript, format!("[Agent] Unknown action {action_type}"))
            .await;
        Outcome::Unknown {
            action_type: action_type.to_string(),
        }
    }

    async fn message(&self, transcript: &mut Transcript, text: String) -> Outcome {
        self.audit
            .record(AuditRole::Action, &format!("MESSAGE: {text}"))
            .await;
        self.show(&text).await;
        transcript.push(Role::Assistant, text);
        Outcome::Displayed
    }

    async fn read(&self, transcript: &mut Transcript, raw: &str) -> Outcome {
        self.audit.record(AuditRole::Action, &format!("READ: {raw}")).await;

        let path = match self.policy.check(AccessKind::Read, raw) {
            Ok(path) => path,
            Err(e @ ToolError::PolicyDenied(_)) => {
                self.notice(
                    transcript,
                    format!("[System] READ denied: {raw} is not in allowed directories."),
                )
                .await;
                return Outcome::Failed(e);
            }
            Err(e) => return self.failed(transcript, format!("[System] Read error: {e}"), e).await,
        };

        match read_text_file(&path).await {
            Ok(content) => {
                self.audit
                    .record(
                        AuditRole::Action,
                        &format!("READ OK: {raw} ({} bytes)", content.len()),
                    )
                    .await;
                transcript.push_internal(
                    Role::System,
                    format!("(Read file) {raw} with content:\n{content}"),
                );
                Outcome::ReadFile { path }
            }
            Err(e @ ToolError::NotFound(_)) => {
                self.failed(transcript, format!("[System] File not found: {raw}"), e)
                    .await
            }
            Err(e) => self.failed(transcript, format!("[System] Read error: {e}"), e).await,
        }
    }

    async fn write(&self, transcript: &mut Transcript, payload: WritePayload) -> Outcome {
        let (raw_path, data) = match payload {
            WritePayload::File { path, data } => (path, data),
            WritePayload::Malformed { content, reason } => {
                tracing::warn!(content = %content, reason, "malformed write payload");
                return self
                    .failed(
                        transcript,
                        format!("[System] Write error: {reason}."),
                        ToolError::InvalidArguments(reason.to_string()),
                    )
                    .await;
            }
        };
        let content = json!({ "path": raw_path, "data": data }).to_string();

        if !self
            .request_permission(transcript, ActionKind::Write, &format!("Write file: {content}"))
            .await
        {
            return self.denied(transcript, ActionKind::Write, &content).await;
        }

        self.audit
            .record(AuditRole::Action, &format!("WRITE file with content: {content}"))
            .await;
        let path = match self.policy.check(AccessKind::Write, &raw_path) {
            Ok(path) => path,
            Err(e) => {
                return self
                    .failed(
                        transcript,
                        format!("[System] WRITE denied: {raw_path} is not in allowed directories."),
                        e,
                    )
                    .await;
            }
        };

        match write_json_file(&path, &data).await {
            Ok(()) => {
                self.notice(transcript, format!("[System] Wrote file: {raw_path}"))
                    .await;
                Outcome::WroteFile { path }
            }
            Err(e) => self.failed(transcript, format!("[System] Write error: {e}"), e).await,
        }
    }

    async fn run(&self, transcript: &mut Transcript, command: &str) -> Outcome {
        if !self
            .request_permission(transcript, ActionKind::Run, &format!("Run command: {command}"))
            .await
        {
            return self.denied(transcript, ActionKind::Run, command).await;
        }

        self.audit.record(AuditRole::Action, &format!("RUN: {command}")).await;
        let output = match self.execute(command).await {
            Ok(output) => output,
            Err(e) => {
                return self
                    .failed(transcript, format!("[System] Error running command: {e}"), e)
                    .await;
            }
        };

        let mut report = format!("[System] Command output:\n{}", output.stdout);
        if !output.stderr.is_empty() {
            report.push_str(&format!("\n[System] Command errors:\n{}", output.stderr));
        }
        if output.success() {
            self.notice(transcript, report).await;
            Outcome::Ran {
                exit_code: output.exit_code,
            }
        } else {
            let reason = format!("exit status {}", output.exit_code);
            self.failed(
                transcript,
                format!("[System] Error running command: {reason}\n{report}"),
                ToolError::ExternalFailure(reason),
            )
            .await
        }
    }

    /// Grammar, then interpreter and script whitelist. Nothing is spawned unless all pass.
    async fn execute(&self, command: &str) -> nv_tools::Result<ProcessOutput> {
        let parsed = parse_run_command(command)?;
        self.policy.check_interpreter(&parsed.interpreter)?;
        // Spawn the whitelisted path, not the raw token.
        let script = self.policy.check_script(&parsed.script)?;
        let parsed = RunCommand {
            script: script.to_string_lossy().into_owned(),
            ..parsed
        };

        tokio::fs::create_dir_all(self.policy.data_root()).await?;
        tracing::info!(
            interpreter = %parsed.interpreter,
            script = %parsed.script,
            config = %parsed.config,
            output_dir = ?parsed.output_dir,
            "spawning experiment script"
        );
        self.runner.run(&parsed.interpreter, &parsed.args()).await
    }

    async fn vision(&self, transcript: &mut Transcript, raw: &str) -> Outcome {
        let rewritten = rewrite_vision_path(raw, self.policy.data_root());

        if !self
            .request_permission(transcript, ActionKind::Vision, &format!("Analyze plot: {raw}"))
            .await
        {
            return self.denied(transcript, ActionKind::Vision, raw).await;
        }

        self.audit
            .record(AuditRole::Action, &format!("VISION: {rewritten}"))
            .await;
        let path = match self.policy.check(AccessKind::Vision, &rewritten) {
            Ok(path) => path,
            Err(e) => {
                let msg = format!(
                    "[System] VISION denied: {rewritten} is not in the allowed data directory ({}).",
                    self.policy.data_root().display()
                );
                return self.failed(transcript, msg, e).await;
            }
        };

        let bytes = match load_image(&path).await {
            Ok(bytes) => bytes,
            Err(e @ ToolError::NotFound(_)) => {
                return self
                    .failed(transcript, format!("[System] File not found: {rewritten}"), e)
                    .await;
            }
            Err(e) => {
                return self
                    .failed(transcript, format!("[System] Vision error: {e}"), e)
                    .await;
            }
        };

        let context = transcript.recent_context(self.vision_context_turns);
        let image = ImageInput::new(bytes, media_type_for_extension(extension(&path)));

        let started = Instant::now();
        match self.model.describe_image(&image, &context).await {
            Ok(description) => {
                tracing::info!(
                    latency_ms = started.elapsed().as_millis() as u64,
                    path = %path.display(),
                    "vision analysis completed"
                );
                transcript.push_vision(path.clone());
                self.notice(
                    transcript,
                    format!("[System] Vision analysis result:\n{description}"),
                )
                .await;
                Outcome::Analyzed { path }
            }
            Err(e) => {
                let err = ToolError::ExternalFailure(e.to_string());
                self.failed(transcript, format!("[System] Vision analysis failed: {e}"), err)
                    .await
            }
        }
    }

    /// Records the question and the answer in both the transcript and the
    /// audit log. Auto mode answers for the human and says so.
    async fn request_permission(
        &self,
        transcript: &mut Transcript,
        kind: ActionKind,
        description: &str,
    ) -> bool {
        self.audit
            .record(AuditRole::Action, &format!("(ASK PERMISSION) {description}"))
            .await;
        transcript.push(
            Role::Assistant,
            format!("Agent requests permission to: {description}"),
        );

        let answer = match self.approvals.mode(kind) {
            ApprovalMode::Auto => {
                tracing::warn!(
                    action = kind.as_str(),
                    description = %description,
                    "auto-approving side-effecting action"
                );
                self.show(&format!(
                    "[System] Auto-approved ({}): {description}",
                    kind.as_str()
                ))
                .await;
                PermissionAnswer::automatic()
            }
            ApprovalMode::Human => match self.operator.ask_permission(description).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::warn!(error = %e, "permission prompt failed; treating as denied");
                    PermissionAnswer::no_answer()
                }
            },
        };

        self.audit
            .record(AuditRole::User, &format!("(permission) {}", answer.raw()))
            .await;
        transcript.push(Role::User, format!("(permission) {}", answer.raw()));
        tracing::info!(
            action = kind.as_str(),
            approved = answer.approved(),
            automatic = answer.is_automatic(),
            "permission decided"
        );
        answer.approved()
    }

    async fn denied(&self, transcript: &mut Transcript, kind: ActionKind, what: &str) -> Outcome {
        let label = kind.as_str().to_ascii_uppercase();
        let error = ToolError::PermissionDenied(format!("{} {what}", kind.as_str()));
        tracing::info!(error = %error, "action not approved");
        self.notice(transcript, format!("[Agent] {label} DENIED for {what}"))
            .await;
        Outcome::PermissionDenied { kind, error }
    }

    async fn failed(&self, transcript: &mut Transcript, msg: String, err: ToolError) -> Outcome {
        tracing::warn!(error = %err, "action failed");
        self.notice(transcript, msg).await;
        Outcome::Failed(err)
    }

    async fn notice(&self, transcript: &mut Transcript, msg: String) {
        self.audit.record(AuditRole::Action, &msg).await;
        self.show(&msg).await;
        transcript.push(Role::System, msg);
    }

    async fn show(&self, text: &str) {
        if let Err(e) = self.operator.show(text).await {
            tracing::warn!(error = %e, operator = self.operator.operator_id(), "display failed");
        }
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use nv_llm::CompletionRequest;
    use nv_operator::ScriptedOperator;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Returns canned text and records every image context it is given.
    #[derive(Default)]
    pub(crate) struct FakeModel {
        pub replies: Mutex<Vec<String>>,
        pub prompts: Mutex<Vec<CompletionRequest>>,
        pub vision_contexts: Mutex<Vec<String>>,
        pub vision_error: Option<String>,
    }

    impl FakeModel {
        pub fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn complete(&self, request: &CompletionRequest) -> nv_llm::Result<String> {
            self.prompts.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| nv_llm::LlmError::Http("no scripted reply".to_string()))
        }

        async fn describe_image(&self, image: &ImageInput, context: &str) -> nv_llm::Result<String> {
            assert!(!image.bytes.is_empty());
            self.vision_contexts.lock().unwrap().push(context.to_string());
            if let Some(e) = &self.vision_error {
                return Err(nv_llm::LlmError::Http(e.clone()));
            }
            Ok("A clear dip near 2.87 GHz.".to_string())
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
        pub exit_code: i32,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, program: &str, args: &[String]) -> nv_tools::Result<ProcessOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            Ok(ProcessOutput {
                stdout: "saved ESR_plot.png".to_string(),
                stderr: String::new(),
                exit_code: self.exit_code,
            })
        }
    }

    pub(crate) struct Fixture {
        pub dir: tempfile::TempDir,
        pub operator: Arc<ScriptedOperator>,
        pub model: Arc<FakeModel>,
        pub runner: Arc<RecordingRunner>,
        pub dispatcher: Dispatcher,
    }

    pub(crate) fn policy_for(root: &Path) -> WorkspacePolicy {
        WorkspacePolicy::new(root)
            .unwrap()
            .with_read_root(root.join("configs"))
            .with_read_root(root.join("defaults"))
            .with_read_root(root.join("data"))
            .with_write_root(root.join("configs"))
            .with_write_root(root.join("data"))
            .with_data_root(root.join("data"))
            .with_run_script(root.join("experiment_scripts/ESR.py"))
            .with_run_script(root.join("experiment_scripts/galvo_scan.py"))
            .with_interpreter("py")
    }

    fn fixture_with(answers: &[&str], approvals: Approvals, exit_code: i32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let operator = Arc::new(ScriptedOperator::new(
            Vec::<String>::new(),
            answers.iter().map(|a| a.to_string()),
        ));
        let model = Arc::new(FakeModel::default());
        let runner = Arc::new(RecordingRunner {
            exit_code,
            ..RecordingRunner::default()
        });
        let dispatcher = Dispatcher::new(
            Arc::new(policy_for(dir.path())),
            operator.clone(),
            model.clone(),
            runner.clone(),
            AuditLog::new(dir.path().join("audit.log")),
        )
        .with_approvals(approvals);
        Fixture {
            dir,
            operator,
            model,
            runner,
            dispatcher,
        }
    }

    fn fixture(answers: &[&str]) -> Fixture {
        fixture_with(answers, Approvals::default(), 0)
    }

    fn write_x(data: Value) -> ActionRequest {
        ActionRequest::Write(WritePayload::File {
            path: "configs/x.json".to_string(),
            data,
        })
    }

    fn last(t: &Transcript) -> &str {
        &t.last().unwrap().content
    }

    #[tokio::test]
    async fn approved_write_persists_json() {
        let f = fixture(&["yes"]);
        let mut t = Transcript::new();
        let outcome = f.dispatcher.dispatch(&mut t, write_x(json!({"a": 1}))).await;

        assert!(matches!(outcome, Outcome::WroteFile { .. }));
        let written = std::fs::read_to_string(f.dir.path().join("configs/x.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&written).unwrap(), json!({"a": 1}));
        assert_eq!(last(&t), "[System] Wrote file: configs/x.json");
        assert_eq!(
            f.operator.asked().await,
            vec![r#"Write file: {"data":{"a":1},"path":"configs/x.json"}"#]
        );
    }

    #[tokio::test]
    async fn denied_write_touches_nothing() {
        let f = fixture(&["no"]);
        let mut t = Transcript::new();
        let outcome = f.dispatcher.dispatch(&mut t, write_x(json!({"a": 1}))).await;

        assert!(matches!(
            outcome,
            Outcome::PermissionDenied {
                kind: ActionKind::Write,
                error: ToolError::PermissionDenied(_)
            }
        ));
        assert!(!f.dir.path().join("configs").exists());

        let contents: Vec<_> = t.contents().collect();
        assert_eq!(contents.len(), 3);
        assert!(contents[0].starts_with("Agent requests permission to: Write file:"));
        assert_eq!(contents[1], "(permission) no");
        assert!(contents[2].starts_with("[Agent] WRITE DENIED for "));
        assert_eq!(contents.iter().filter(|c| c.contains("DENIED")).count(), 1);
        assert!(!contents.iter().any(|c| c.contains("Wrote file")));
    }

    #[tokio::test]
    async fn granted_write_outside_roots_is_policy_denied() {
        let f = fixture(&["yes"]);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(
                &mut t,
                ActionRequest::Write(WritePayload::File {
                    path: "configs/../../escape.json".to_string(),
                    data: json!({}),
                }),
            )
            .await;

        assert!(matches!(outcome, Outcome::Failed(ToolError::PolicyDenied(_))));
        assert!(last(&t).starts_with("[System] WRITE denied: configs/../../escape.json"));
        assert!(!f.dir.path().parent().unwrap().join("escape.json").exists());
    }

    #[tokio::test]
    async fn malformed_write_never_asks() {
        let f = fixture(&["yes"]);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(
                &mut t,
                ActionRequest::Write(WritePayload::Malformed {
                    content: json!("configs/x.json"),
                    reason: "content is not an object",
                }),
            )
            .await;

        assert!(matches!(outcome, Outcome::Failed(ToolError::InvalidArguments(_))));
        assert!(f.operator.asked().await.is_empty());
        assert_eq!(t.len(), 1);
        assert_eq!(last(&t), "[System] Write error: content is not an object.");
    }

    #[tokio::test]
    async fn read_is_internal_and_contained() {
        let f = fixture(&[]);
        std::fs::create_dir_all(f.dir.path().join("defaults")).unwrap();
        std::fs::write(f.dir.path().join("defaults/esr.json"), r#"{"power": -10}"#).unwrap();
        std::fs::write(f.dir.path().join("secret.txt"), "x").unwrap();

        let mut t = Transcript::new();
        let ok = f
            .dispatcher
            .dispatch(&mut t, ActionRequest::Read("defaults/esr.json".into()))
            .await;
        assert!(matches!(ok, Outcome::ReadFile { .. }));
        let turn = t.last().unwrap();
        assert!(turn.internal);
        assert_eq!(turn.content, "(Read file) defaults/esr.json with content:\n{\"power\": -10}");
        assert!(f.operator.shown().await.is_empty());

        let denied = f
            .dispatcher
            .dispatch(&mut t, ActionRequest::Read("defaults/../secret.txt".into()))
            .await;
        assert!(matches!(denied, Outcome::Failed(ToolError::PolicyDenied(_))));
        assert_eq!(
            last(&t),
            "[System] READ denied: defaults/../secret.txt is not in allowed directories."
        );

        let missing = f
            .dispatcher
            .dispatch(&mut t, ActionRequest::Read("configs/none.json".into()))
            .await;
        assert!(matches!(missing, Outcome::Failed(ToolError::NotFound(_))));
        assert_eq!(last(&t), "[System] File not found: configs/none.json");
        assert!(f.operator.asked().await.is_empty());
    }

    #[tokio::test]
    async fn denied_run_spawns_nothing() {
        let f = fixture(&["no"]);
        let mut t = Transcript::new();
        let cmd = "py experiment_scripts/ESR.py --config configs/x.json";
        let outcome = f.dispatcher.dispatch(&mut t, ActionRequest::Run(cmd.into())).await;

        assert!(matches!(
            outcome,
            Outcome::PermissionDenied {
                kind: ActionKind::Run,
                error: ToolError::PermissionDenied(_)
            }
        ));
        assert!(f.runner.calls.lock().unwrap().is_empty());
        assert_eq!(last(&t), format!("[Agent] RUN DENIED for {cmd}"));
        assert_eq!(f.operator.asked().await, vec![format!("Run command: {cmd}")]);
    }

    #[tokio::test]
    async fn approved_run_spawns_validated_tokens() {
        let f = fixture(&["yes"]);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(
                &mut t,
                ActionRequest::Run(
                    "py  experiment_scripts/ESR.py --config configs/x.json   --output-dir data/".into(),
                ),
            )
            .await;

        assert!(matches!(outcome, Outcome::Ran { exit_code: 0 }));
        let script = policy_for(f.dir.path())
            .check_script("experiment_scripts/ESR.py")
            .unwrap();
        let calls = f.runner.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(
                "py".to_string(),
                vec![
                    script.to_string_lossy().into_owned(),
                    "--config".to_string(),
                    "configs/x.json".to_string(),
                    "--output-dir".to_string(),
                    "data/".to_string(),
                ]
            )]
        );
        assert_eq!(last(&t), "[System] Command output:\nsaved ESR_plot.png");
    }

    #[tokio::test]
    async fn backslash_script_paths_spawn_the_whitelisted_path() {
        let f = fixture(&["yes"]);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(
                &mut t,
                ActionRequest::Run(
                    r"py experiment_scripts\galvo_scan.py --config configs/x.json".into(),
                ),
            )
            .await;

        assert!(matches!(outcome, Outcome::Ran { exit_code: 0 }));
        let expected = f.dir.path().join("experiment_scripts").join("galvo_scan.py");
        let calls = f.runner.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let spawned = &calls[0].1[0];
        assert!(!spawned.contains('\\'), "{spawned}");
        assert_eq!(
            policy_for(f.dir.path()).check_script(spawned).unwrap(),
            policy_for(f.dir.path())
                .check_script(&expected.to_string_lossy())
                .unwrap()
        );
        assert!(spawned.ends_with("experiment_scripts/galvo_scan.py"));
    }

    #[tokio::test]
    async fn malformed_or_unlisted_commands_spawn_nothing() {
        let f = fixture(&["yes", "yes", "yes"]);
        let mut t = Transcript::new();
        for cmd in [
            "py experiment_scripts/ESR.py",
            "py other/experiment_scripts/ESR.py --config c.json",
            "bash experiment_scripts/ESR.py --config c.json",
        ] {
            let outcome = f.dispatcher.dispatch(&mut t, ActionRequest::Run(cmd.into())).await;
            assert!(matches!(outcome, Outcome::Failed(_)), "{cmd}");
            assert!(last(&t).starts_with("[System] Error running command: "));
        }
        assert!(f.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let f = fixture_with(&["yes"], Approvals::default(), 2);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(
                &mut t,
                ActionRequest::Run("py experiment_scripts/galvo_scan.py --config c.json".into()),
            )
            .await;
        assert!(matches!(outcome, Outcome::Failed(ToolError::ExternalFailure(_))));
        assert!(last(&t).starts_with("[System] Error running command: exit status 2"));
    }

    #[tokio::test]
    async fn vision_rewrites_bare_names_and_records_the_invocation() {
        let f = fixture(&["yes"]);
        std::fs::create_dir_all(f.dir.path().join("data")).unwrap();
        std::fs::write(f.dir.path().join("data/ESR_plot.png"), b"\x89PNG").unwrap();

        let mut t = Transcript::new();
        t.push(Role::User, "look at the ESR plot");
        let outcome = f
            .dispatcher
            .dispatch(&mut t, ActionRequest::Vision("ESR_plot.png".into()))
            .await;

        assert!(matches!(outcome, Outcome::Analyzed { .. }));
        assert_eq!(f.operator.asked().await, vec!["Analyze plot: ESR_plot.png"]);
        assert_eq!(
            last(&t),
            "[System] Vision analysis result:\nA clear dip near 2.87 GHz."
        );
        let invoked: Vec<_> = t.vision_invocations().collect();
        assert_eq!(invoked.len(), 1);
        assert!(invoked[0].ends_with("data/ESR_plot.png"));
        assert!(t.contents().any(|c| c.starts_with("VISION: ") && c.ends_with("ESR_plot.png")));

        let contexts = f.model.vision_contexts.lock().unwrap().clone();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].starts_with("user: look at the ESR plot"));
    }

    #[tokio::test]
    async fn failed_vision_call_does_not_mark_the_plot_analyzed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/ESR_plot.png"), b"\x89PNG").unwrap();
        let model = Arc::new(FakeModel {
            vision_error: Some("vision endpoint unavailable".to_string()),
            ..FakeModel::default()
        });
        let dispatcher = Dispatcher::new(
            Arc::new(policy_for(dir.path())),
            Arc::new(ScriptedOperator::new(Vec::<String>::new(), ["yes".to_string()])),
            model.clone(),
            Arc::new(RecordingRunner::default()),
            AuditLog::new(dir.path().join("audit.log")),
        );

        let mut t = Transcript::new();
        let outcome = dispatcher
            .dispatch(&mut t, ActionRequest::Vision("ESR_plot.png".into()))
            .await;

        assert!(matches!(outcome, Outcome::Failed(ToolError::ExternalFailure(_))));
        assert_eq!(model.vision_contexts.lock().unwrap().len(), 1);
        assert_eq!(t.vision_invocations().count(), 0);
        assert!(last(&t).starts_with("[System] Vision analysis failed: "));
    }

    #[tokio::test]
    async fn vision_missing_plot_is_not_found() {
        let f = fixture(&["yes"]);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(&mut t, ActionRequest::Vision("projects/data/GalvoScan_plot.png".into()))
            .await;
        assert!(matches!(outcome, Outcome::Failed(ToolError::NotFound(_))));
        assert!(last(&t).starts_with("[System] File not found: "));
        assert!(f.model.vision_contexts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_vision_names_the_original_path() {
        let f = fixture(&["no"]);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(&mut t, ActionRequest::Vision("ESR_plot.png".into()))
            .await;
        match outcome {
            Outcome::PermissionDenied {
                kind: ActionKind::Vision,
                error: ToolError::PermissionDenied(what),
            } => assert_eq!(what, "vision ESR_plot.png"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(last(&t), "[Agent] VISION DENIED for ESR_plot.png");
    }

    #[tokio::test]
    async fn auto_approval_is_recorded_not_asked() {
        let approvals = Approvals {
            run: ApprovalMode::Auto,
            ..Approvals::default()
        };
        let f = fixture_with(&[], approvals, 0);
        let mut t = Transcript::new();
        let outcome = f
            .dispatcher
            .dispatch(
                &mut t,
                ActionRequest::Run("py experiment_scripts/ESR.py --config c.json".into()),
            )
            .await;

        assert!(matches!(outcome, Outcome::Ran { .. }));
        assert!(f.operator.asked().await.is_empty());
        assert!(t.contents().any(|c| c == "(permission) (auto-approved) yes"));
        let audit = std::fs::read_to_string(f.dir.path().join("audit.log")).unwrap();
        assert!(audit.contains("USER: (permission) (auto-approved) yes"));
    }

    #[tokio::test]
    async fn unknown_actions_are_reported() {
        let f = fixture(&[]);
        let mut t = Transcript::new();
        let outcome = f.dispatcher.reject_unknown(&mut t, "delete").await;
        assert!(matches!(outcome, Outcome::Unknown { .. }));
        assert_eq!(last(&t), "[Agent] Unknown action delete");
    }

    #[tokio::test]
    async fn messages_are_shown_and_kept() {
        let f = fixture(&[]);
        let mut t = Transcript::new();
        f.dispatcher
            .dispatch(&mut t, ActionRequest::Message("Config written.".into()))
            .await;
        assert_eq!(f.operator.shown().await, vec!["Config written."]);
        assert_eq!(t.last().unwrap().role, Role::Assistant);
    }
}
