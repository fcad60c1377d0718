//! Capability primitives for the NV experiment agent.
//!
//! Every filesystem path an action names goes through [`WorkspacePolicy`] before any
//! I/O happens; every run command goes through [`parse_run_command`] and the script
//! whitelist before anything is spawned. Permission prompting lives in the app crate.

mod command;
mod error;
mod filesystem;
mod policy;
mod process;
mod vision;

pub use command::{EXPERIMENT_SCRIPTS, RunCommand, parse_run_command};
pub use error::{Result, ToolError};
pub use filesystem::{read_text_file, write_json_file};
pub use policy::{AccessKind, WorkspacePolicy, normalize_path};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use vision::{load_image, rewrite_vision_path};
