//! Agent instructions and prompt composition.

use crate::layout::SessionLayout;
use crate::transcript::Transcript;

const INSTRUCTIONS_TEMPLATE: &str = r#"You are the NV experiment agent. You operate a nitrogen-vacancy (NV) center setup by reading and writing experiment configs, running experiment scripts, and analyzing the plots they produce. Every user message, every reply you give, every action you take and every action result is kept in the conversation history below.

1) Response format
   - Exactly one <think>...</think> block with your private reasoning. It is never shown to the user.
   - Then zero or more <action> blocks, each holding one JSON object:
       <action>
       {"type": "<message|read|write|run|vision>", "content": ...}
       </action>
   - Actions run in the order you write them.

2) Action types
   - message: "content" is text shown to the user.
   - read: "content" is a file path. The content comes back to you only; use a message action to share it.
   - write: "content" is {"path": "<file path>", "data": <JSON value>}. The file is replaced with pretty-printed JSON.
   - run: "content" is a command string (see 4).
   - vision: "content" is a plot file name such as "ESR_plot.png". It is looked up in the current run's data directory.
   write, run and vision wait for the user's permission. If the user says no, the action does not happen; do not retry it unasked.

3) Directories
   - read from: {configs_dir}/, {default_config_dir}/ and {data_dir}/
   - write to: {configs_dir}/ and {data_dir}/
   - default configs: {default_config_dir}/default_esr_config.json, default_find_nv_config.json, default_galvo_scan_config.json, default_optimize_config.json

4) Running experiments
   - Scripts: {scripts_dir}/ESR.py, find_nv.py, galvo_scan.py, optimize.py. No other program can be run.
   - Command format, always with the output directory of the current run:
       {interpreter} {scripts_dir}/<script>.py --config <config file> --output-dir {data_dir}/
   - galvo_scan is a coarse search for NV centers across the field; find_nv is the fine search. NV centers show up as large bright dots in GalvoScan_plot.png; estimate their center coordinates for the next step.

5) Typical flow (ESR shown; the others work the same way)
   - If experiments already ran, read their outputs in {data_dir}/ and decide what to change.
   - Read {default_config_dir}/default_esr_config.json.
   - Write an adjusted copy, e.g. {configs_dir}/esr_run1.json.
   - Run {interpreter} {scripts_dir}/ESR.py --config {configs_dir}/esr_run1.json --output-dir {data_dir}/
   - Analyze the result with a vision action on ESR_plot.png.
"#;

pub const CLOSING: &str = "Respond with one <think> block and any <action> blocks you need for the next step. Wait for user and experiment feedback instead of chaining many actions at once.";

/// Instructions with this session's directories filled in.
pub fn instructions(layout: &SessionLayout, interpreter: &str, extra: Option<&str>) -> String {
    let mut text = INSTRUCTIONS_TEMPLATE
        .replace("{configs_dir}", &layout.display(&layout.configs_dir))
        .replace("{data_dir}", &layout.display(&layout.data_dir))
        .replace("{default_config_dir}", &layout.display(&layout.default_config_dir))
        .replace("{scripts_dir}", &layout.display(&layout.scripts_dir))
        .replace("{interpreter}", interpreter);
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        text.push_str("\n6) Additional instructions\n");
        text.push_str(extra);
        text.push('\n');
    }
    text
}

/// Instructions, then retrieved context, then the whole transcript, then the closing request.
pub fn compose(instructions: &str, addenda: &[String], transcript: &Transcript) -> String {
    let mut prompt = instructions.trim().to_string();
    for addendum in addenda.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(addendum);
    }
    if !transcript.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&transcript.render());
    }
    prompt.push_str("\n\n");
    prompt.push_str(CLOSING);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::transcript::Role;
    use chrono::TimeZone;

    fn layout() -> SessionLayout {
        let cfg = WorkspaceConfig {
            root: "/ws".into(),
            ..WorkspaceConfig::default()
        };
        let started = chrono::Local.with_ymd_and_hms(2025, 5, 2, 12, 34, 56).unwrap();
        SessionLayout::plan(&cfg, started).unwrap()
    }

    #[test]
    fn instructions_name_the_run_directories() {
        let text = instructions(&layout(), "py", None);
        assert!(text.contains("projects/NVExperiment/runs/run_20250502_123456/data/"));
        assert!(text.contains("py experiment_scripts/<script>.py --config"));
        for placeholder in ["{configs_dir}", "{data_dir}", "{scripts_dir}", "{interpreter}"] {
            assert!(!text.contains(placeholder), "{placeholder} left in instructions");
        }
        assert!(!text.contains("Additional instructions"));
    }

    #[test]
    fn extra_instructions_are_appended() {
        let text = instructions(&layout(), "python3", Some("Prefer 100 points per sweep."));
        assert!(text.ends_with("6) Additional instructions\nPrefer 100 points per sweep.\n"));
    }

    #[test]
    fn prompt_order() {
        let mut t = Transcript::new();
        t.push(Role::User, "run ESR");
        let prompt = compose("RULES", &["CONTEXT".to_string(), "  ".to_string()], &t);
        assert_eq!(prompt, format!("RULES\n\nCONTEXT\n\nUser: run ESR\n\n{CLOSING}"));
    }
}
