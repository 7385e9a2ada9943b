//! Per-user mutable state.
//!
//! By default records live in an in-memory map keyed by user id and are
//! created lazily from the configured default value. A [`StateBackend`]
//! replaces that map entirely; a [`StateHook`] observes every write made
//! through a [`StateHandle`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{domain::UserId, params::ParamsBag, Result};

/// A user's state object. Identity is the `Arc`.
pub type SharedRecord = Arc<Mutex<Map<String, Value>>>;

/// Custom getter: owns storage and identity of state records.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn load(
        &self,
        user_id: UserId,
        params: &ParamsBag,
        default: &Map<String, Value>,
    ) -> Result<SharedRecord>;
}

/// Custom setter: called after every property write.
#[async_trait]
pub trait StateHook: Send + Sync {
    async fn on_set(
        &self,
        user_id: UserId,
        key: &str,
        value: &Value,
        params: &ParamsBag,
    ) -> Result<()>;
}

#[derive(Default)]
pub struct StateStore {
    records: Mutex<HashMap<UserId, SharedRecord>>,
    default_value: Map<String, Value>,
    backend: Option<Arc<dyn StateBackend>>,
    hook: Option<Arc<dyn StateHook>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template copied into every lazily created record.
    pub fn set_default_value(&mut self, default_value: Map<String, Value>) {
        self.default_value = default_value;
    }

    /// Install a custom getter; the in-memory map is bypassed from now on.
    pub fn set_backend(&mut self, backend: Arc<dyn StateBackend>) {
        self.backend = Some(backend);
    }

    pub fn set_hook(&mut self, hook: Arc<dyn StateHook>) {
        self.hook = Some(hook);
    }

    pub async fn get_store(&self, user_id: UserId, params: &ParamsBag) -> Result<StateHandle> {
        let record = match &self.backend {
            Some(backend) => backend.load(user_id, params, &self.default_value).await?,
            None => {
                let mut records = self.records.lock().await;
                records
                    .entry(user_id)
                    .or_insert_with(|| Arc::new(Mutex::new(self.default_value.clone())))
                    .clone()
            }
        };

        Ok(StateHandle {
            user_id,
            record,
            hook: self.hook.clone(),
            params: params.clone(),
        })
    }
}

/// Access to one user's state record.
///
/// Writes go through [`StateHandle::set`] so the configured hook sees them.
#[derive(Clone)]
pub struct StateHandle {
    user_id: UserId,
    record: SharedRecord,
    hook: Option<Arc<dyn StateHook>>,
    params: ParamsBag,
}

impl StateHandle {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.record.lock().await.get(key).cloned()
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .await
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        {
            let mut record = self.record.lock().await;
            record.insert(key.to_string(), value.clone());
        }
        if let Some(hook) = &self.hook {
            hook.on_set(self.user_id, key, &value, &self.params).await?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Map<String, Value> {
        self.record.lock().await.clone()
    }

    /// Whether both handles point at the same record.
    pub fn same_record(&self, other: &StateHandle) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}
