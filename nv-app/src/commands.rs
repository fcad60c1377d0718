//! Console commands handled without calling the model.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Checkpoint,
    Plots,
    Status,
    Search(String),
    Help,
    Unknown(String),
}

pub const HELP: &str = "Commands: /status /plots /search <query> /checkpoint /help /exit";

/// `None` when `input` is an ordinary conversation turn.
pub fn parse_command(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
        return Some(Command::Exit);
    }
    let rest = trimmed.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    Some(match name.to_ascii_lowercase().as_str() {
        "exit" | "quit" => Command::Exit,
        "checkpoint" => Command::Checkpoint,
        "plots" => Command::Plots,
        "status" => Command::Status,
        "help" => Command::Help,
        "search" if !arg.is_empty() => Command::Search(arg.to_string()),
        "search" => Command::Unknown("Usage: /search <query>".to_string()),
        other => Command::Unknown(format!("Unknown command /{other}. {HELP}")),
    })
}
