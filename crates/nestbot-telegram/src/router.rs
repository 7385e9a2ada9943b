//! Wiring from configuration to a running bot, and the long-polling loop.

use std::{sync::Arc, time::Duration};

use teloxide::{prelude::*, requests::Request, types::AllowedUpdate};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use nestbot_core::{
    config::Config,
    dispatcher::{Dispatcher, DispatcherBuilder},
    errors::Error,
    messaging::{port::Outbound, throttled::ThrottledOutbound},
    update::Update,
    update_log::UpdateLog,
    Result,
};

use crate::{webhook, TelegramOutbound};

const RETRY_PAUSE: Duration = Duration::from_secs(3);

/// Bot client for the configured API endpoint. The HTTP timeout leaves
/// headroom over the server-side long-poll timeout.
pub fn bot_from_config(cfg: &Config) -> Result<Bot> {
    let url = reqwest::Url::parse(&cfg.api_url)
        .map_err(|e| Error::Config(format!("TELEGRAM_API_URL: {e}")))?;
    let client = teloxide::net::default_reqwest_settings()
        .timeout(cfg.poll_timeout + Duration::from_secs(10))
        .build()
        .map_err(|e| Error::External(format!("http client: {e}")))?;
    Ok(Bot::with_client(cfg.bot_token.clone(), client).set_api_url(url))
}

/// Build the outbound stack for a bot: Bot API binding behind the throttle.
pub fn outbound_from_config(cfg: &Config) -> Result<Arc<dyn Outbound>> {
    let raw: Arc<dyn Outbound> = Arc::new(TelegramOutbound::new(bot_from_config(cfg)?));
    Ok(Arc::new(ThrottledOutbound::new(raw, cfg.throttle)))
}

/// Dispatcher builder wired to Telegram, with the update log attached when
/// enabled.
pub fn dispatcher_builder(cfg: &Config) -> Result<DispatcherBuilder> {
    let mut builder = Dispatcher::builder(outbound_from_config(cfg)?);
    if cfg.update_log_enabled {
        let log = UpdateLog::new(cfg.update_log_path.clone()).with_limit(cfg.update_log_limit);
        builder = builder.update_log(log);
    }
    Ok(builder)
}

/// Receive updates until `shutdown` fires: through the webhook when one is
/// configured, by long polling otherwise.
pub async fn run(
    cfg: &Config,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<()> {
    let bot = bot_from_config(cfg)?;
    match &cfg.webhook {
        Some(hook) => webhook::run_webhook(bot, hook, dispatcher, shutdown).await,
        None => run_polling(bot, cfg, dispatcher, shutdown).await,
    }
}

/// Map a Bot API update onto the core model through its JSON form.
pub(crate) fn to_core_update(update: &teloxide::types::Update) -> Result<Update> {
    Ok(serde_json::from_value(serde_json::to_value(update)?)?)
}

fn allowed_updates(names: &[String]) -> Vec<AllowedUpdate> {
    names
        .iter()
        .filter_map(|name| {
            match serde_json::from_value(serde_json::Value::String(name.clone())) {
                Ok(kind) => Some(kind),
                Err(_) => {
                    warn!(update = %name, "ignoring unknown allowed update kind");
                    None
                }
            }
        })
        .collect()
}

/// Long-poll until `shutdown` fires, handing each update to its own task.
///
/// Any webhook left registered is removed first, since Telegram refuses
/// `getUpdates` while one is set. Updates already handed off are awaited
/// before returning.
pub async fn run_polling(
    bot: Bot,
    cfg: &Config,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<()> {
    bot.delete_webhook()
        .await
        .map_err(|e| Error::External(format!("deleteWebhook: {e}")))?;

    let allowed = allowed_updates(&cfg.allowed_updates);
    let timeout = u32::try_from(cfg.poll_timeout.as_secs()).unwrap_or(u32::MAX);
    let mut offset: Option<i32> = None;
    let tracker = TaskTracker::new();
    info!(
        timeout_secs = timeout,
        limit = cfg.poll_limit,
        "polling for updates"
    );

    loop {
        let mut request = bot.get_updates().timeout(timeout).limit(cfg.poll_limit);
        if let Some(offset) = offset {
            request = request.offset(offset);
        }
        if !allowed.is_empty() {
            request = request.allowed_updates(allowed.clone());
        }

        let batch = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            batch = request.send() => batch,
        };

        match batch {
            Ok(updates) => {
                if !updates.is_empty() {
                    debug!(count = updates.len(), "received updates");
                }
                for raw in updates {
                    // Unreadable updates are acknowledged too.
                    offset = Some(raw.id + 1);
                    let update = match to_core_update(&raw) {
                        Ok(update) => update,
                        Err(e) => {
                            warn!(update_id = raw.id, error = %e, "skipping unreadable update");
                            continue;
                        }
                    };
                    let dispatcher = dispatcher.clone();
                    tracker.spawn(async move { dispatcher.handle_update(update).await });
                }
            }
            Err(e) => {
                warn!(error = %e, "fetching updates failed");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_PAUSE) => {}
                }
            }
        }
    }

    tracker.close();
    info!(in_flight = tracker.len(), "polling stopped");
    tracker.wait().await;
    Ok(())
}
