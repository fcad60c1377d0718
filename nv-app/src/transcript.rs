//! The session transcript: append-only, replayed verbatim into every prompt.

use nv_memory::VISION_MARKER;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Effector notices and other entries produced by the agent itself.
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Seen by the model but never shown to the human.
    pub internal: bool,
    /// Set only for the entry recording a completed vision analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
            internal: false,
            vision: None,
        });
    }

    pub fn push_internal(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
            internal: true,
            vision: None,
        });
    }

    /// Internal entry for a vision analysis that ran on `path`. This is the only
    /// way a plot becomes "analyzed".
    pub fn push_vision(&mut self, path: PathBuf) {
        self.turns.push(Turn {
            role: Role::System,
            content: format!("{VISION_MARKER}{}", path.display()),
            internal: true,
            vision: Some(path),
        });
    }

    /// Paths of every recorded vision analysis, oldest first.
    pub fn vision_invocations(&self) -> impl Iterator<Item = &Path> {
        self.turns.iter().filter_map(|t| t.vision.as_deref())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn contents(&self) -> impl Iterator<Item = &str> {
        self.turns.iter().map(|t| t.content.as_str())
    }

    /// `Role: content` lines in insertion order.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The last `n` turns on one line, as context for an image description.
    pub fn recent_context(&self, n: usize) -> String {
        let start = self.turns.len().saturating_sub(n);
        self.turns[start..]
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.content))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_insertion_order() {
        let mut t = Transcript::new();
        t.push(Role::User, "run ESR");
        t.push(Role::Assistant, "ok");
        t.push_internal(Role::System, "(Read file) a.json with content:\n{}");
        assert_eq!(
            t.render(),
            "User: run ESR\nAssistant: ok\nSystem: (Read file) a.json with content:\n{}"
        );
        assert!(t.turns()[2].internal);
        assert!(!t.turns()[0].internal);
    }

    #[test]
    fn recent_context_takes_the_tail() {
        let mut t = Transcript::new();
        for i in 0..6 {
            t.push(Role::User, format!("m{i}"));
        }
        assert_eq!(t.recent_context(2), "user: m4 user: m5");
        assert_eq!(Transcript::new().recent_context(4), "");
        assert_eq!(t.recent_context(100).matches("user:").count(), 6);
    }

    #[test]
    fn only_recorded_analyses_count_as_vision_invocations() {
        let mut t = Transcript::new();
        t.push(Role::User, "VISION: GalvoScan_plot.png");
        t.push(Role::Assistant, "VISION: ESR_plot.png");
        t.push_vision(PathBuf::from("/run/data/FindNV_plot.png"));

        let invoked: Vec<_> = t.vision_invocations().collect();
        assert_eq!(invoked, vec![Path::new("/run/data/FindNV_plot.png")]);
        let last = t.last().unwrap();
        assert_eq!(last.content, "VISION: /run/data/FindNV_plot.png");
        assert!(last.internal);
        assert_eq!(last.role, Role::System);
    }
}
