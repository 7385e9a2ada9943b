use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, messaging::throttled::ThrottleConfig, Result};

/// Typed runtime configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub api_url: String,

    // Polling
    pub poll_timeout: Duration,
    pub poll_limit: u8,
    pub allowed_updates: Vec<String>,

    // Webhook mode; polling when unset
    pub webhook: Option<WebhookConfig>,

    // Update journal
    pub update_log_enabled: bool,
    pub update_log_path: PathBuf,
    /// Newest entries kept in the journal; `0` keeps everything.
    pub update_log_limit: usize,

    // Outbound flood control
    pub throttle: ThrottleConfig,
}

/// Where Telegram pushes updates and where we listen for them.
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookConfig {
    /// Public HTTPS URL registered with `setWebhook`.
    pub url: String,
    pub listen: SocketAddr,
    /// Echoed by Telegram in `X-Telegram-Bot-Api-Secret-Token`.
    pub secret_token: Option<String>,
}

impl Config {
    /// Load from the process environment, after merging `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = get("BOT_TOKEN").and_then(non_empty).ok_or_else(|| {
            Error::Config("BOT_TOKEN environment variable is required".to_string())
        })?;

        let api_url = get("TELEGRAM_API_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://api.telegram.org".to_string())
            .trim_end_matches('/')
            .to_string();

        let poll_timeout = Duration::from_secs(parse_or(get("POLL_TIMEOUT_SECS"), 30u64));
        let poll_limit = parse_or(get("POLL_LIMIT"), 100u8).clamp(1, 100);
        let allowed_updates = parse_csv(get("ALLOWED_UPDATES"));

        let update_log_enabled = get("UPDATE_LOG_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);
        let update_log_path = PathBuf::from(
            get("UPDATE_LOG_PATH")
                .and_then(non_empty)
                .unwrap_or_else(|| "nestbot/logs.md".to_string()),
        );

        let update_log_limit = parse_or(get("UPDATE_LOG_LIMIT"), 100usize);

        let webhook = match get("WEBHOOK_URL").and_then(non_empty) {
            Some(url) => {
                let port = parse_or(get("WEBHOOK_PORT"), 80u16);
                let listen = match get("WEBHOOK_LISTEN").and_then(non_empty) {
                    Some(addr) => addr.trim().parse::<SocketAddr>().map_err(|e| {
                        Error::Config(format!("WEBHOOK_LISTEN '{addr}': {e}"))
                    })?,
                    None => SocketAddr::from(([0, 0, 0, 0], port)),
                };
                Some(WebhookConfig {
                    url: url.trim().to_string(),
                    listen,
                    secret_token: get("WEBHOOK_SECRET").and_then(non_empty),
                })
            }
            None => None,
        };

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            global_min_interval: get("THROTTLE_GLOBAL_MS")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_min_interval),
            per_chat_min_interval: get("THROTTLE_PER_CHAT_MS")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_chat_min_interval),
        };

        Ok(Self {
            bot_token,
            api_url,
            poll_timeout,
            poll_limit,
            allowed_updates,
            webhook,
            update_log_enabled,
            update_log_path,
            update_log_limit,
            throttle,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_or<T: std::str::FromStr>(v: Option<String>, default: T) -> T {
    v.and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
