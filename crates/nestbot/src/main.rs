use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nestbot_core::config::Config;

mod handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nestbot_core::logging::init("nestbot")?;

    let cfg = Config::load().context("loading configuration")?;
    let builder = nestbot_telegram::router::dispatcher_builder(&cfg)?;
    let dispatcher = handlers::register(builder)
        .build()
        .context("registering handlers")?;
    let dispatcher = Arc::new(dispatcher);
    info!(
        handlers = dispatcher.registry().records().len(),
        "dispatcher ready"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "can't listen for ctrl-c"),
        }
    });

    nestbot_telegram::router::run(&cfg, dispatcher, shutdown)
        .await
        .context("receiving telegram updates failed")
}
