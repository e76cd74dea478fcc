//! Handshake adapter: obtains host capabilities in a single exchange.
//!
//! The adapter owns the only moment capabilities enter the plugin. It
//! sends one `plugin/handshake` request carrying the manifest and waits
//! for the capability reply under a deadline. Every failure here is fatal:
//! a plugin that cannot learn its capabilities must not serve anything.

use std::time::Duration;

use voltd_wire::{
    parse_envelope, CapabilitySet, Envelope, HandshakeReply, HandshakeRequest, Manifest,
    PluginInfo, Request, RequestId, HANDSHAKE_METHOD, PROTOCOL_VERSION,
};

use crate::error::{PluginError, PluginResult};
use crate::transport::HostLink;

/// Performs the capability handshake. Consumed by [`exchange`], so each
/// adapter runs at most one exchange.
///
/// [`exchange`]: HandshakeAdapter::exchange
#[derive(Debug)]
pub struct HandshakeAdapter {
    timeout: Duration,
}

impl HandshakeAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send the handshake request and wait for the capability reply.
    pub async fn exchange(
        self,
        link: &mut dyn HostLink,
        plugin: PluginInfo,
        manifest: Manifest,
    ) -> PluginResult<CapabilitySet> {
        let request_id = RequestId::Number(0);
        let payload = HandshakeRequest::new(plugin, manifest);
        let request = Request::new(
            request_id.clone(),
            HANDSHAKE_METHOD,
            Some(serde_json::to_value(&payload)?),
        );
        link.send(&serde_json::to_string(&request)?).await?;
        tracing::debug!("Handshake request sent, awaiting capabilities");

        let timeout_ms = self.timeout.as_millis() as u64;
        let reply = tokio::time::timeout(self.timeout, Self::await_reply(link, &request_id))
            .await
            .map_err(|_| PluginError::HandshakeTimeout { timeout_ms })??;

        tracing::info!(
            "Handshake complete: {} capabilities granted",
            reply.capabilities.len()
        );
        Ok(reply.capabilities)
    }

    /// Wait for the host's reply to the handshake request.
    ///
    /// Fail-closed: anything other than a well-formed reply to our request
    /// id, the host sending early requests included, aborts the handshake.
    async fn await_reply(
        link: &mut dyn HostLink,
        request_id: &RequestId,
    ) -> PluginResult<HandshakeReply> {
        let Some(line) = link.recv().await? else {
            return Err(PluginError::Handshake(
                "host closed the link before replying".to_string(),
            ));
        };

        match parse_envelope(&line) {
            Ok(Envelope::Response(response)) if response.id == *request_id => {
                let reply: HandshakeReply =
                    serde_json::from_value(response.result).map_err(|e| {
                        PluginError::Handshake(format!("malformed capability reply: {e}"))
                    })?;
                if reply.protocol != PROTOCOL_VERSION {
                    tracing::warn!(
                        "Host speaks protocol {}, this plugin speaks {}. Proceeding with the granted capabilities",
                        reply.protocol,
                        PROTOCOL_VERSION
                    );
                }
                Ok(reply)
            }
            Ok(Envelope::ErrorReply(reply)) if reply.id == *request_id => {
                Err(PluginError::Handshake(format!(
                    "host rejected the handshake: {}",
                    reply.error.message
                )))
            }
            Ok(_) => Err(PluginError::Handshake(
                "unexpected traffic before the handshake completed".to_string(),
            )),
            Err(e) => Err(PluginError::Handshake(format!("unreadable reply: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::pair;
    use serde_json::json;
    use voltd_wire::ManifestEntry;

    fn manifest() -> Manifest {
        Manifest {
            methods: vec![ManifestEntry::new("getinfo")],
            hooks: vec![],
        }
    }

    fn info() -> PluginInfo {
        PluginInfo::new("test-plugin", "0.0.1")
    }

    #[tokio::test]
    async fn test_exchange_returns_granted_capabilities() {
        let (mut plugin_end, mut host_end) = pair();

        let host = tokio::spawn(async move {
            let line = host_end.recv().await.unwrap().unwrap();
            let request: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["method"], HANDSHAKE_METHOD);
            assert_eq!(request["params"]["manifest"]["methods"][0]["name"], "getinfo");

            let reply = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": { "protocol": "1", "capabilities": { "developer": true } }
            });
            host_end.send(&reply.to_string()).await.unwrap();
        });

        let adapter = HandshakeAdapter::new(Duration::from_secs(1));
        let caps = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap();
        assert!(caps.is_enabled("developer"));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_protocol_skew_is_tolerated() {
        let (mut plugin_end, mut host_end) = pair();

        let host = tokio::spawn(async move {
            let line = host_end.recv().await.unwrap().unwrap();
            let request: serde_json::Value = serde_json::from_str(&line).unwrap();
            let reply = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": { "protocol": "2", "capabilities": { "developer": false } }
            });
            host_end.send(&reply.to_string()).await.unwrap();
        });

        let adapter = HandshakeAdapter::new(Duration::from_secs(1));
        let caps = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap();
        assert!(caps.contains("developer"));
        assert!(!caps.is_enabled("developer"));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_host_times_out_fatally() {
        let (mut plugin_end, _host_end) = pair();

        let adapter = HandshakeAdapter::new(Duration::from_millis(30));
        let err = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::HandshakeTimeout { timeout_ms: 30 }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_host_rejection_is_fatal() {
        let (mut plugin_end, mut host_end) = pair();

        let host = tokio::spawn(async move {
            let line = host_end.recv().await.unwrap().unwrap();
            let request: serde_json::Value = serde_json::from_str(&line).unwrap();
            let reply = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32812, "message": "plugin not allowed" }
            });
            host_end.send(&reply.to_string()).await.unwrap();
        });

        let adapter = HandshakeAdapter::new(Duration::from_secs(1));
        let err = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Handshake(ref msg) if msg.contains("not allowed")));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_link_aborts_the_handshake() {
        let (mut plugin_end, host_end) = pair();
        drop(host_end);

        let adapter = HandshakeAdapter::new(Duration::from_secs(1));
        let err = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_early_request_from_host_fails_closed() {
        let (mut plugin_end, mut host_end) = pair();

        let host = tokio::spawn(async move {
            let _ = host_end.recv().await.unwrap();
            let early = json!({ "jsonrpc": "2.0", "id": 9, "method": "getinfo" });
            host_end.send(&early.to_string()).await.unwrap();
        });

        let adapter = HandshakeAdapter::new(Duration::from_secs(1));
        let err = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Handshake(_)));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_reply_fails_closed() {
        let (mut plugin_end, mut host_end) = pair();

        let host = tokio::spawn(async move {
            let _ = host_end.recv().await.unwrap();
            host_end.send("not json at all").await.unwrap();
        });

        let adapter = HandshakeAdapter::new(Duration::from_secs(1));
        let err = adapter
            .exchange(&mut plugin_end, info(), manifest())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Handshake(_)));
        host.await.unwrap();
    }
}
