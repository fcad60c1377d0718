use crate::traits::Operator;
use crate::types::PermissionAnswer;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;

/// Terminal operator reading lines from stdin.
pub struct ConsoleOperator {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    stdout: Mutex<Stdout>,
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleOperator {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn prompt(&self, text: &str) -> Result<Option<String>> {
        {
            let mut out = self.stdout.lock().await;
            out.write_all(text.as_bytes()).await?;
            out.flush().await?;
        }
        Ok(self.lines.lock().await.next_line().await?)
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    fn operator_id(&self) -> &str {
        "console"
    }

    async fn next_turn(&self) -> Result<Option<String>> {
        self.prompt("You: ").await
    }

    async fn ask_permission(&self, description: &str) -> Result<PermissionAnswer> {
        self.show(&format!("[System] Agent requests permission to: {description}"))
            .await?;
        match self.prompt("Grant permission? (yes/no): ").await? {
            Some(line) => Ok(PermissionAnswer::new(line)),
            None => {
                tracing::warn!("stdin closed while waiting for permission; denying");
                Ok(PermissionAnswer::no_answer())
            }
        }
    }

    async fn show(&self, text: &str) -> Result<()> {
        let mut out = self.stdout.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}
