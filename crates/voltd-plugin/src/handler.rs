//! Handler trait and adapters for declared methods and hooks.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use voltd_wire::CapabilitySet;

/// Per-call context handed to every handler.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Capabilities the host granted during the handshake.
    pub capabilities: Arc<CapabilitySet>,
}

impl CallContext {
    pub fn new(capabilities: Arc<CapabilitySet>) -> Self {
        Self { capabilities }
    }
}

/// A unit of plugin behavior invoked by dispatch.
///
/// Handlers return `anyhow::Result` so implementations can bubble any
/// failure; the dispatcher wraps whatever comes back into a wire error
/// without tearing the process down.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: CallContext, params: Value) -> anyhow::Result<Value>;
}

struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: CallContext, params: Value) -> anyhow::Result<Value> {
        (self.func)(ctx, params).await
    }
}

/// Wrap an async closure as a shared [`Handler`].
pub fn from_fn<F, Fut>(func: F) -> Arc<dyn Handler>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}
