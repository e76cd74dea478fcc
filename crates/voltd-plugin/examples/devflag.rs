//! The smallest gated plugin: one always-on method reporting the host's
//! developer mode, one hook that only activates when that mode is on.
//!
//! Try it against the workbench:
//!
//!   cargo build --example devflag
//!   cargo run --bin voltd-plugin-dev -- drive --cap developer=true \
//!       ./target/debug/examples/devflag

use serde_json::json;
use voltd_plugin::{Gate, Plugin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let plugin = Plugin::new("devflag", env!("CARGO_PKG_VERSION"))
        .rpcmethod(
            "getdeveloperflag",
            "Report whether the host runs in developer mode",
            |ctx, _params| async move {
                Ok(json!({ "developer": ctx.capabilities.is_enabled("developer") }))
            },
        )?
        .hook_gated("custommsg", Gate::flag("developer"), |_ctx, params| async move {
            tracing::info!("custommsg: {params}");
            Ok(json!({ "result": "continue" }))
        })?;

    plugin.run_stdio().await?;
    Ok(())
}
