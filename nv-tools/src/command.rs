use crate::error::{Result, ToolError};
use regex::Regex;
use std::sync::LazyLock;

/// The only script basenames a run command may name.
pub const EXPERIMENT_SCRIPTS: [&str; 4] = ["ESR.py", "find_nv.py", "galvo_scan.py", "optimize.py"];

static RUN_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?P<invoke>[\w.\-/\\]+)\s+(?P<script>(?:[A-Za-z]:)?[\\/]?(?:[\w.\-]+[\\/])*(?:experiment_scripts|scripts)[\\/](?:ESR|find_nv|galvo_scan|optimize)\.py)\s+--config\s+(?P<config>[\w\\./:\-]+)(?:\s+--output-dir\s+(?P<output_dir>[\w\\./:\-]+))?\s*$",
    )
    .expect("run command regex must compile")
});

/// A run string that matched the grammar. Nothing here has touched the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    pub interpreter: String,
    pub script: String,
    pub config: String,
    pub output_dir: Option<String>,
}

impl RunCommand {
    /// Arguments after the interpreter, in grammar order.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.script.clone(),
            "--config".to_string(),
            self.config.clone(),
        ];
        if let Some(dir) = &self.output_dir {
            args.push("--output-dir".to_string());
            args.push(dir.clone());
        }
        args
    }
}

/// Parse `<invoke> <script-path> --config <path> [--output-dir <path>]`.
///
/// The whole string must match; trailing text is a grammar error. Whether the script
/// is actually whitelisted is the policy's call, not this function's.
pub fn parse_run_command(command: &str) -> Result<RunCommand> {
    let Some(caps) = RUN_COMMAND.captures(command) else {
        return Err(ToolError::MalformedCommand(format!(
            "Run command parsing error for command: '{command}'. Command must be in the format: \
             <interpreter> experiment_scripts/<script_name>.py --config <config_file> \
             [--output-dir <output_directory>] where <script_name> is one of {}",
            EXPERIMENT_SCRIPTS.join(", ")
        )));
    };
    Ok(RunCommand {
        interpreter: caps["invoke"].to_string(),
        script: caps["script"].to_string(),
        config: caps["config"].to_string(),
        output_dir: caps.name("output_dir").map(|m| m.as_str().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command() {
        let cmd = parse_run_command("run scripts/ESR.py --config c.json --output-dir out/").unwrap();
        assert!(cmd.script.ends_with("ESR.py"));
        assert_eq!(cmd.interpreter, "run");
        assert_eq!(cmd.config, "c.json");
        assert_eq!(cmd.output_dir.as_deref(), Some("out/"));
    }

    #[test]
    fn missing_config_is_malformed() {
        let err = parse_run_command("run scripts/ESR.py").unwrap_err();
        assert!(matches!(err, ToolError::MalformedCommand(_)));
        assert!(err.to_string().contains("--config <config_file>"));
    }

    #[test]
    fn output_dir_is_optional_and_whitespace_is_flexible() {
        let cmd = parse_run_command(
            "py   projects/experiment_scripts/galvo_scan.py\t--config  projects/configs/g.json",
        )
        .unwrap();
        assert_eq!(cmd.script, "projects/experiment_scripts/galvo_scan.py");
        assert_eq!(cmd.config, "projects/configs/g.json");
        assert_eq!(cmd.output_dir, None);
        assert_eq!(
            cmd.args(),
            vec!["projects/experiment_scripts/galvo_scan.py", "--config", "projects/configs/g.json"]
        );
    }

    #[test]
    fn windows_separators_are_accepted() {
        let cmd = parse_run_command(
            r"py projects\experiment_scripts\find_nv.py --config projects\configs\f.json",
        )
        .unwrap();
        assert_eq!(cmd.script, r"projects\experiment_scripts\find_nv.py");
    }

    #[test]
    fn unknown_script_or_directory_is_malformed() {
        assert!(parse_run_command("py experiment_scripts/evil.py --config c.json").is_err());
        assert!(parse_run_command("py tools/ESR.py --config c.json").is_err());
    }

    #[test]
    fn trailing_shell_text_is_malformed() {
        assert!(parse_run_command("py scripts/ESR.py --config c.json; rm -rf /").is_err());
        assert!(parse_run_command("py scripts/ESR.py --config c.json && ls").is_err());
        assert!(parse_run_command("py scripts/ESR.py --output-dir o --config c.json").is_err());
    }
}
