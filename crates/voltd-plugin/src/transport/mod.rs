//! Link abstraction between the plugin and its host.
//!
//! The framework moves whole messages as text lines and leaves byte-level
//! framing to the link. [`StdioLink`] serves plugins spawned as child
//! processes; [`pair`] wires a plugin to an in-process host for tests and
//! embedding.

pub mod stdio;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{PluginError, PluginResult};

pub use stdio::StdioLink;

/// One end of the host connection.
#[async_trait]
pub trait HostLink: Send {
    /// Send one message to the peer.
    async fn send(&mut self, text: &str) -> PluginResult<()>;

    /// Receive the next message. `None` means the peer closed the link.
    async fn recv(&mut self) -> PluginResult<Option<String>>;
}

/// In-process link backed by channels.
pub struct MemoryLink {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Create a connected link pair: one end for the plugin, one for the host.
pub fn pair() -> (MemoryLink, MemoryLink) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryLink { tx: a_tx, rx: b_rx },
        MemoryLink { tx: b_tx, rx: a_rx },
    )
}

#[async_trait]
impl HostLink for MemoryLink {
    async fn send(&mut self, text: &str) -> PluginResult<()> {
        self.tx
            .send(text.to_string())
            .map_err(|_| PluginError::Transport("link peer dropped".to_string()))
    }

    async fn recv(&mut self) -> PluginResult<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_cross_wired() {
        let (mut plugin_end, mut host_end) = pair();
        plugin_end.send("from plugin").await.unwrap();
        host_end.send("from host").await.unwrap();

        assert_eq!(host_end.recv().await.unwrap().as_deref(), Some("from plugin"));
        assert_eq!(plugin_end.recv().await.unwrap().as_deref(), Some("from host"));
    }

    #[tokio::test]
    async fn test_dropping_one_end_closes_the_other() {
        let (plugin_end, mut host_end) = pair();
        drop(plugin_end);
        assert_eq!(host_end.recv().await.unwrap(), None);
    }
}
