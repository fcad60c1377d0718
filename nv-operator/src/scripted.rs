use crate::traits::Operator;
use crate::types::PermissionAnswer;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Replays a fixed list of turns and permission answers, recording
/// everything it is shown and asked. Running out of answers denies.
#[derive(Default)]
pub struct ScriptedOperator {
    turns: Mutex<VecDeque<String>>,
    answers: Mutex<VecDeque<String>>,
    shown: Mutex<Vec<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<T, A>(turns: T, answers: A) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            turns: Mutex::new(turns.into_iter().map(Into::into).collect()),
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            shown: Mutex::new(Vec::new()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub async fn shown(&self) -> Vec<String> {
        self.shown.lock().await.clone()
    }

    /// Permission descriptions in the order they were asked.
    pub async fn asked(&self) -> Vec<String> {
        self.asked.lock().await.clone()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    fn operator_id(&self) -> &str {
        "scripted"
    }

    async fn next_turn(&self) -> Result<Option<String>> {
        Ok(self.turns.lock().await.pop_front())
    }

    async fn ask_permission(&self, description: &str) -> Result<PermissionAnswer> {
        self.asked.lock().await.push(description.to_string());
        Ok(match self.answers.lock().await.pop_front() {
            Some(answer) => PermissionAnswer::new(answer),
            None => PermissionAnswer::no_answer(),
        })
    }

    async fn show(&self, text: &str) -> Result<()> {
        self.shown.lock().await.push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_turns_then_ends() {
        let op = ScriptedOperator::new(["hello", "exit"], Vec::<String>::new());
        assert_eq!(op.next_turn().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(op.next_turn().await.unwrap().as_deref(), Some("exit"));
        assert_eq!(op.next_turn().await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_questions_and_denies_when_out_of_answers() {
        let op = ScriptedOperator::new(Vec::<String>::new(), ["yes"]);
        assert!(op.ask_permission("Write file: a.json").await.unwrap().approved());
        assert!(!op.ask_permission("Run command: x").await.unwrap().approved());
        assert_eq!(op.asked().await, vec!["Write file: a.json", "Run command: x"]);
    }

    #[tokio::test]
    async fn records_output() {
        let op = ScriptedOperator::default();
        op.show("[System] Wrote file: a.json").await.unwrap();
        assert_eq!(op.shown().await, vec!["[System] Wrote file: a.json"]);
    }
}
