use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    messaging::types::{to_arg, Content, Method, OutboundCall},
    update::Update,
    Result,
};

/// Port to the remote platform's send/administration operations.
///
/// The update is passed along so adapters can resolve implicit targets (the
/// current chat, the clicked callback query, the replied-to message).
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn perform(&self, update: &Update, call: OutboundCall) -> Result<Value>;
}

/// Outbound context bound to one inbound update.
///
/// Cheap to clone; every middleware and handler working on the same update
/// receives the same answer.
#[derive(Clone)]
pub struct Answer {
    outbound: Arc<dyn Outbound>,
    update: Arc<Update>,
}

impl Answer {
    pub fn new(outbound: Arc<dyn Outbound>, update: Arc<Update>) -> Self {
        Self { outbound, update }
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    pub async fn perform(&self, call: OutboundCall) -> Result<Value> {
        self.outbound.perform(&self.update, call).await
    }

    /// Send content to the chat the update came from.
    pub async fn send(&self, content: impl Into<Content>) -> Result<Value> {
        let content: Content = content.into();
        self.perform(OutboundCall::new(
            Method::Send,
            vec![to_arg(&content), Value::Null, Value::Null],
        ))
        .await
    }

    /// Answer the current callback query with a modal alert.
    pub async fn alert(&self, text: &str) -> Result<Value> {
        self.perform(OutboundCall::new(Method::Alert, vec![to_arg(&text), Value::Null]))
            .await
    }

    /// Answer the current callback query with a transient notification.
    pub async fn toast(&self, text: &str) -> Result<Value> {
        self.perform(OutboundCall::new(Method::Toast, vec![to_arg(&text), Value::Null]))
            .await
    }
}
