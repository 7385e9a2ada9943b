use std::{collections::HashMap, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    messaging::{
        port::Outbound,
        types::{OutboundCall, Recipient},
    },
    update::Update,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

/// Next free slot for a stream of calls spaced `interval` apart.
fn reserve(next: &mut Instant, interval: Duration, now: Instant) -> Duration {
    let start = (*next).max(now);
    *next = start + interval;
    start.saturating_duration_since(now)
}

/// Outbound decorator that rate-limits calls.
///
/// Calls are keyed by the chat they go to: the target named in the call, or
/// else the chat of the update that produced it. Calls with neither only pay
/// the global spacing. A chat's slot is forgotten once it lies in the past.
pub struct ThrottledOutbound {
    inner: Arc<dyn Outbound>,
    cfg: ThrottleConfig,
    global: Mutex<Instant>,
    per_chat: Mutex<HashMap<Recipient, Instant>>,
}

impl ThrottledOutbound {
    pub fn new(inner: Arc<dyn Outbound>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(Instant::now()),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn throttle(&self, chat: Option<Recipient>) {
        let now = Instant::now();
        let global_wait = reserve(
            &mut *self.global.lock().await,
            self.cfg.global_min_interval,
            now,
        );
        let chat_wait = match chat {
            Some(chat) => {
                let mut slots = self.per_chat.lock().await;
                slots.retain(|_, next| *next > now);
                let next = slots.entry(chat).or_insert(now);
                reserve(next, self.cfg.per_chat_min_interval, now)
            }
            None => Duration::ZERO,
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn tracked_chats(&self) -> usize {
        self.per_chat.lock().await.len()
    }
}

#[async_trait::async_trait]
impl Outbound for ThrottledOutbound {
    async fn perform(&self, update: &Update, call: OutboundCall) -> Result<Value> {
        let chat = call
            .explicit_chat()
            .or_else(|| update.chat_id().map(Recipient::Id));
        self.throttle(chat).await;
        self.inner.perform(update, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::types::Method;
    use crate::update::fixtures::text_update;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Outbound for Counting {
        async fn perform(&self, _update: &Update, _call: OutboundCall) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    #[test]
    fn reservations_are_spaced() {
        let now = Instant::now();
        let mut next = now;
        let interval = Duration::from_millis(100);
        assert_eq!(reserve(&mut next, interval, now), Duration::ZERO);
        assert_eq!(reserve(&mut next, interval, now), interval);
        assert_eq!(reserve(&mut next, interval, now + interval * 5), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn same_chat_calls_are_spaced() {
        let inner = Arc::new(Counting::default());
        let throttled = ThrottledOutbound::new(
            inner.clone(),
            ThrottleConfig {
                global_min_interval: Duration::ZERO,
                per_chat_min_interval: Duration::from_secs(1),
            },
        );
        let update = text_update(1, 7, "hi");
        let started = Instant::now();
        for _ in 0..3 {
            throttled
                .perform(&update, OutboundCall::new(Method::Send, vec![]))
                .await
                .unwrap();
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    fn per_chat_only() -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: Duration::ZERO,
            per_chat_min_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_target_is_the_throttle_key() {
        let inner = Arc::new(Counting::default());
        let throttled = ThrottledOutbound::new(inner.clone(), per_chat_only());
        let update = text_update(1, 7, "hi");
        let started = Instant::now();
        // Two forwards from chat 7 to two different chats don't wait on each other.
        for target in [100, 200] {
            let call = OutboundCall::new(Method::Forward, vec![json!(target), Value::Null]);
            throttled.perform(&update, call).await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(10));

        let call = OutboundCall::new(Method::Forward, vec![json!(100), Value::Null]);
        throttled.perform(&update, call).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_chats_are_forgotten() {
        let throttled = ThrottledOutbound::new(Arc::new(Counting::default()), per_chat_only());
        for user in 1..=3 {
            throttled
                .perform(&text_update(1, user, "hi"), OutboundCall::new(Method::Send, vec![]))
                .await
                .unwrap();
        }
        assert_eq!(throttled.tracked_chats().await, 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        throttled
            .perform(&text_update(2, 9, "hi"), OutboundCall::new(Method::Send, vec![]))
            .await
            .unwrap();
        assert_eq!(throttled.tracked_chats().await, 1);
    }
}
