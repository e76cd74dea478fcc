//! Plugin facade: declaration builder plus the serve loop.
//!
//! A plugin is built open, declares its methods and hooks, then `run`
//! walks the whole lifecycle: seal the registry, announce the manifest in
//! the handshake, negotiate capabilities, and serve dispatches until the
//! host closes the link.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use voltd_wire::{parse_envelope, PluginInfo, RequestId};

use crate::config::PluginConfig;
use crate::dispatch::Dispatcher;
use crate::error::PluginResult;
use crate::gate::Gate;
use crate::handler::{from_fn, CallContext, Handler};
use crate::handshake::HandshakeAdapter;
use crate::negotiation::negotiate;
use crate::registry::Registry;
use crate::transport::{HostLink, StdioLink};

/// A voltd plugin under construction, and its runtime once `run` is
/// called.
pub struct Plugin {
    info: PluginInfo,
    config: PluginConfig,
    registry: Registry,
}

impl Plugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: PluginInfo::new(name, version),
            config: PluginConfig::from_env(),
            registry: Registry::new(),
        }
    }

    pub fn with_config(mut self, config: PluginConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare an always-active method.
    pub fn rpcmethod<F, Fut>(self, name: &str, description: &str, func: F) -> PluginResult<Self>
    where
        F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.rpcmethod_gated(name, description, Gate::Always, func)
    }

    /// Declare a method that only activates when `gate` passes
    /// negotiation.
    pub fn rpcmethod_gated<F, Fut>(
        mut self,
        name: &str,
        description: &str,
        gate: Gate,
        func: F,
    ) -> PluginResult<Self>
    where
        F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.registry
            .declare_method(name, Some(description.to_string()), gate, from_fn(func))?;
        Ok(self)
    }

    /// Declare an always-active hook.
    pub fn hook<F, Fut>(self, name: &str, func: F) -> PluginResult<Self>
    where
        F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.hook_gated(name, Gate::Always, func)
    }

    /// Declare a hook that only activates when `gate` passes negotiation.
    pub fn hook_gated<F, Fut>(mut self, name: &str, gate: Gate, func: F) -> PluginResult<Self>
    where
        F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.registry.declare_hook(name, None, gate, from_fn(func))?;
        Ok(self)
    }

    /// Declare a method backed by an existing handler.
    pub fn register_method(
        mut self,
        name: &str,
        description: Option<String>,
        gate: Gate,
        handler: Arc<dyn Handler>,
    ) -> PluginResult<Self> {
        self.registry.declare_method(name, description, gate, handler)?;
        Ok(self)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the plugin over its own stdin and stdout.
    pub async fn run_stdio(self) -> PluginResult<()> {
        let mut link = StdioLink::new();
        self.run(&mut link).await
    }

    /// Run the full lifecycle over `link`.
    ///
    /// Returns `Ok(())` when the host closes the link. Handshake and
    /// transport failures surface as errors; dispatch failures are
    /// answered on the wire and never end the loop.
    pub async fn run(mut self, link: &mut dyn HostLink) -> PluginResult<()> {
        self.registry.seal();
        let manifest = self.registry.manifest();
        tracing::info!(
            "Starting plugin '{}' v{} with {} declarations",
            self.info.name,
            self.info.version,
            manifest.len()
        );

        let adapter = HandshakeAdapter::new(self.config.handshake_timeout);
        let capabilities = adapter.exchange(link, self.info.clone(), manifest).await?;

        let (active, _report) = negotiate(&mut self.registry, &capabilities);
        let dispatcher =
            Dispatcher::new(active, capabilities).with_deadline(self.config.dispatch_timeout);

        Self::serve(&dispatcher, link).await
    }

    /// Answer host traffic in arrival order until EOF.
    async fn serve(dispatcher: &Dispatcher, link: &mut dyn HostLink) -> PluginResult<()> {
        while let Some(line) = link.recv().await? {
            match parse_envelope(&line) {
                Ok(envelope) => {
                    if let Some(reply) = dispatcher.handle_envelope(envelope).await {
                        link.send(&reply.to_string()).await?;
                    }
                }
                Err(e) => {
                    tracing::warn!("Parse error: {e}");
                    let reply = e.to_error_object().into_reply(RequestId::Null);
                    link.send(&serde_json::to_string(&reply)?).await?;
                }
            }
        }
        tracing::info!("Host closed the link, shutting down");
        Ok(())
    }
}
