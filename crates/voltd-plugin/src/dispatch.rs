//! Request dispatch: routes envelopes to active handlers and shapes the
//! reply for every failure mode.
//!
//! Dispatch never takes the process down. Handler faults, panics included,
//! are caught and answered with a tagged wire error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use voltd_wire::{
    CapabilitySet, DispatchErrorKind, Envelope, InvokeTarget, Notification, Request, Response,
    PING_METHOD,
};

use crate::error::{PluginError, PluginResult};
use crate::handler::CallContext;
use crate::negotiation::{ActiveRegistration, ActiveSet, Resolution};

/// Routes requests to the negotiated active set.
pub struct Dispatcher {
    active: ActiveSet,
    capabilities: Arc<CapabilitySet>,
    deadline: Option<Duration>,
}

impl Dispatcher {
    pub fn new(active: ActiveSet, capabilities: CapabilitySet) -> Self {
        Self {
            active,
            capabilities: Arc::new(capabilities),
            deadline: None,
        }
    }

    /// Bound each handler invocation to `deadline`. `None` lets handlers
    /// run unbounded.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Handle one parsed envelope. Requests produce a reply value,
    /// notifications and unexpected host replies produce nothing.
    pub async fn handle_envelope(&self, envelope: Envelope) -> Option<Value> {
        match envelope {
            Envelope::Request(request) => Some(self.handle_request(request).await),
            Envelope::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            Envelope::Response(_) | Envelope::ErrorReply(_) => {
                tracing::warn!("Received unexpected reply from host after handshake");
                None
            }
        }
    }

    /// Handle one request, always producing the serialized wire reply.
    pub async fn handle_request(&self, request: Request) -> Value {
        if let Err(e) = request.validate() {
            return serde_json::to_value(e.to_error_object().into_reply(request.id))
                .unwrap_or_default();
        }

        let id = request.id.clone();
        if request.method == PING_METHOD {
            let pong = Response::new(id, Value::Object(serde_json::Map::new()));
            return serde_json::to_value(pong).unwrap_or_default();
        }

        let target = InvokeTarget::parse(&request.method);
        let params = request.params.unwrap_or(Value::Null);
        match self.invoke(&target, params).await {
            Ok(value) => serde_json::to_value(Response::new(id, value)).unwrap_or_default(),
            Err(e) => {
                match e.dispatch_kind() {
                    Some(DispatchErrorKind::ExecutionError) => tracing::warn!("{e}"),
                    _ => tracing::debug!("{e}"),
                }
                serde_json::to_value(e.to_error_reply(id)).unwrap_or_default()
            }
        }
    }

    /// Invoke a target directly, bypassing wire framing.
    pub async fn invoke(&self, target: &InvokeTarget, params: Value) -> PluginResult<Value> {
        match self.active.resolve(target) {
            Resolution::Active(registration) => {
                tracing::debug!("Dispatching {target}");
                self.run_isolated(registration, params).await
            }
            Resolution::Disabled => Err(PluginError::HandlerDisabled {
                name: target.name.clone(),
                kind: target.kind,
            }),
            Resolution::Unknown => Err(PluginError::UnknownHandler {
                name: target.name.clone(),
                kind: target.kind,
            }),
        }
    }

    /// Run a notification handler, discarding any result.
    pub async fn handle_notification(&self, notification: Notification) {
        let target = InvokeTarget::parse(&notification.method);
        let params = notification.params.unwrap_or(Value::Null);
        match self.active.resolve(&target) {
            Resolution::Active(registration) => {
                if let Err(e) = self.run_isolated(registration, params).await {
                    tracing::warn!("Notification handler failed: {e}");
                }
            }
            Resolution::Disabled => {
                tracing::debug!("Dropping notification for disabled {target}");
            }
            Resolution::Unknown => {
                tracing::debug!("Unknown notification: {target}");
            }
        }
    }

    /// Run one handler on its own task so a panic cannot reach the serve
    /// loop, enforcing the dispatch deadline if one is set.
    async fn run_isolated(
        &self,
        registration: &ActiveRegistration,
        params: Value,
    ) -> PluginResult<Value> {
        let handler = Arc::clone(&registration.handler);
        let ctx = CallContext::new(Arc::clone(&self.capabilities));
        let mut task = tokio::spawn(async move { handler.handle(ctx, params).await });

        let joined = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    return Err(PluginError::HandlerCancelled {
                        name: registration.name.clone(),
                        kind: registration.kind,
                    });
                }
            },
            None => (&mut task).await,
        };

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => Err(PluginError::HandlerFailed {
                name: registration.name.clone(),
                kind: registration.kind,
                cause,
            }),
            Err(join_error) if join_error.is_panic() => Err(PluginError::HandlerPanicked {
                name: registration.name.clone(),
                kind: registration.kind,
            }),
            Err(_) => Err(PluginError::HandlerCancelled {
                name: registration.name.clone(),
                kind: registration.kind,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use crate::handler::from_fn;
    use crate::negotiation::negotiate;
    use crate::registry::Registry;
    use serde_json::json;
    use voltd_wire::RequestId;

    fn fixture_dispatcher(caps: CapabilitySet) -> Dispatcher {
        let mut registry = Registry::new();
        registry
            .declare_method(
                "echo",
                None,
                Gate::Always,
                from_fn(|_ctx, params| async move { Ok(params) }),
            )
            .unwrap();
        registry
            .declare_method(
                "fail",
                None,
                Gate::Always,
                from_fn(|_ctx, _params| async move { Err(anyhow::anyhow!("intentional fault")) }),
            )
            .unwrap();
        registry
            .declare_method(
                "explode",
                None,
                Gate::Always,
                from_fn(|_ctx, _params| async move { panic!("handler bug") }),
            )
            .unwrap();
        registry
            .declare_method(
                "slow",
                None,
                Gate::Always,
                from_fn(|_ctx, _params| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!("done"))
                }),
            )
            .unwrap();
        registry
            .declare_hook(
                "custommsg",
                None,
                Gate::flag("developer"),
                from_fn(|_ctx, _params| async move { Ok(json!({ "result": "continue" })) }),
            )
            .unwrap();

        let (active, _) = negotiate(&mut registry, &caps);
        Dispatcher::new(active, caps)
    }

    fn request(id: i64, method: &str, params: Value) -> Request {
        Request::new(RequestId::Number(id), method, Some(params))
    }

    #[test]
    fn test_dispatcher_exposes_negotiated_state() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new().with("developer", true));
        assert!(dispatcher.capabilities().is_enabled("developer"));
        assert_eq!(dispatcher.active().active_count(), 5);
        assert!(dispatcher
            .active()
            .active_targets()
            .any(|target| target == &InvokeTarget::hook("custommsg")));
    }

    #[tokio::test]
    async fn test_active_method_round_trip() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new());
        let reply = dispatcher
            .handle_request(request(1, "echo", json!({ "x": 1 })))
            .await;
        assert_eq!(reply["result"], json!({ "x": 1 }));
        assert_eq!(reply["id"], 1);
    }

    #[tokio::test]
    async fn test_unknown_target_is_tagged_unknown() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new());
        let reply = dispatcher
            .handle_request(request(2, "no_such_method", json!(null)))
            .await;
        assert_eq!(reply["error"]["data"]["kind"], "unknown");
        assert_eq!(
            reply["error"]["code"],
            voltd_wire::error::codes::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_disabled_target_is_tagged_disabled() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new().with("developer", false));
        let reply = dispatcher
            .handle_request(request(3, "hook/custommsg", json!({})))
            .await;
        assert_eq!(reply["error"]["data"]["kind"], "disabled");
        assert_eq!(
            reply["error"]["code"],
            voltd_wire::error::codes::HANDLER_DISABLED
        );
    }

    #[tokio::test]
    async fn test_handler_fault_is_wrapped_not_propagated() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new());
        let reply = dispatcher.handle_request(request(4, "fail", json!(null))).await;
        assert_eq!(reply["error"]["data"]["kind"], "execution_error");
        assert_eq!(reply["error"]["data"]["cause"], "intentional fault");

        // The dispatcher keeps serving after a handler fault.
        let reply = dispatcher.handle_request(request(5, "echo", json!(7))).await;
        assert_eq!(reply["result"], 7);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new());
        let reply = dispatcher
            .handle_request(request(6, "explode", json!(null)))
            .await;
        assert_eq!(reply["error"]["data"]["kind"], "execution_error");
        assert_eq!(reply["error"]["data"]["cause"], "handler panicked");

        let reply = dispatcher.handle_request(request(7, "echo", json!(1))).await;
        assert_eq!(reply["result"], 1);
    }

    #[tokio::test]
    async fn test_deadline_cancels_slow_handlers() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new())
            .with_deadline(Some(Duration::from_millis(25)));
        let reply = dispatcher.handle_request(request(8, "slow", json!(null))).await;
        assert_eq!(reply["error"]["data"]["kind"], "execution_error");
        assert_eq!(reply["error"]["data"]["cause"], "dispatch deadline exceeded");
    }

    #[tokio::test]
    async fn test_ping_builtin_answers_empty_object() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new());
        let reply = dispatcher
            .handle_request(request(9, "plugin/ping", json!(null)))
            .await;
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn test_invalid_request_is_answered_not_dropped() {
        let dispatcher = fixture_dispatcher(CapabilitySet::new());
        let bad = Request {
            jsonrpc: "1.0".to_string(),
            id: RequestId::Number(10),
            method: "echo".to_string(),
            params: None,
        };
        let reply = dispatcher.handle_request(bad).await;
        assert_eq!(
            reply["error"]["code"],
            voltd_wire::error::codes::INVALID_REQUEST
        );
    }

    #[tokio::test]
    async fn test_handler_sees_negotiated_capabilities() {
        let caps = CapabilitySet::new().with("developer", true);
        let mut registry = Registry::new();
        registry
            .declare_method(
                "getdeveloperflag",
                None,
                Gate::Always,
                from_fn(|ctx: CallContext, _params| async move {
                    Ok(json!({ "developer": ctx.capabilities.is_enabled("developer") }))
                }),
            )
            .unwrap();
        let (active, _) = negotiate(&mut registry, &caps);
        let dispatcher = Dispatcher::new(active, caps);

        let reply = dispatcher
            .handle_request(request(11, "getdeveloperflag", json!({})))
            .await;
        assert_eq!(reply["result"]["developer"], true);
    }
}
