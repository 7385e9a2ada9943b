//! Webhook transport: Telegram pushes each update to an HTTP endpoint we
//! serve, instead of us polling for it.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use teloxide::prelude::*;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use nestbot_core::{
    config::WebhookConfig, dispatcher::Dispatcher, errors::Error, update::Update, Result,
};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct Receiver {
    dispatcher: Arc<Dispatcher>,
    secret: Option<String>,
    tracker: TaskTracker,
}

/// Routes for the webhook endpoint at `path`. Updates are dispatched on
/// tasks spawned onto `tracker`.
pub fn router(
    path: &str,
    dispatcher: Arc<Dispatcher>,
    secret: Option<String>,
    tracker: TaskTracker,
) -> Router {
    Router::new().route(path, post(receive)).with_state(Receiver {
        dispatcher,
        secret,
        tracker,
    })
}

async fn receive(State(rx): State<Receiver>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(secret) = &rx.secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_str()) {
            warn!("webhook request with a wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // Anything but 200 makes Telegram redeliver, so bad bodies are dropped here.
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            debug!(update_id = update.update_id, "webhook update");
            let dispatcher = rx.dispatcher.clone();
            rx.tracker
                .spawn(async move { dispatcher.handle_update(update).await });
        }
        Err(e) => warn!(error = %e, "skipping unreadable webhook body"),
    }
    StatusCode::OK
}

/// Register the webhook with Telegram and serve it until `shutdown` fires.
/// Updates still being handled are awaited before returning.
pub async fn run_webhook(
    bot: Bot,
    cfg: &WebhookConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<()> {
    let url = reqwest::Url::parse(&cfg.url)
        .map_err(|e| Error::Config(format!("WEBHOOK_URL: {e}")))?;
    let mut register = bot.set_webhook(url.clone());
    if let Some(secret) = &cfg.secret_token {
        register = register.secret_token(secret.clone());
    }
    register
        .await
        .map_err(|e| Error::External(format!("setWebhook: {e}")))?;

    let listener = TcpListener::bind(cfg.listen).await?;
    info!(url = %cfg.url, listen = %cfg.listen, "receiving updates by webhook");

    let tracker = TaskTracker::new();
    let app = router(url.path(), dispatcher, cfg.secret_token.clone(), tracker.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracker.close();
    info!(in_flight = tracker.len(), "webhook stopped");
    tracker.wait().await;
    Ok(())
}
