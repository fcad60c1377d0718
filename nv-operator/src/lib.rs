//! The human side of the agent loop.
//!
//! Operators are pure I/O: they supply conversation turns and permission
//! answers, and display what the agent reports. They never decide anything.

mod console;
mod scripted;
mod traits;
mod types;

pub use console::ConsoleOperator;
pub use scripted::ScriptedOperator;
pub use traits::Operator;
pub use types::{PermissionAnswer, SessionId};
