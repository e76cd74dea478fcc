//! Stdio link for plugins spawned as host child processes.
//!
//! Messages are newline-delimited JSON. Stdout belongs to the protocol;
//! anything a plugin wants to say to a human goes to stderr.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

use super::HostLink;
use crate::error::PluginResult;

/// Host link over the process's own stdin and stdout.
pub struct StdioLink {
    reader: BufReader<Stdin>,
    writer: Stdout,
}

impl StdioLink {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostLink for StdioLink {
    async fn send(&mut self, text: &str) -> PluginResult<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> PluginResult<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}
