use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;

use crate::{domain::UserId, errors::Error, Result};

/// Per-user conversation stage.
///
/// A user is either in no scope or in exactly one registered scope; entering
/// a scope replaces the previous one. Cheap to clone, all clones share state.
#[derive(Clone, Default)]
pub struct ScopeController {
    registered: Arc<HashSet<String>>,
    current: Arc<Mutex<HashMap<UserId, String>>>,
}

impl ScopeController {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registered: Arc::new(names.into_iter().map(Into::into).collect()),
            current: Arc::default(),
        }
    }

    /// Boot-time registration. Clones taken earlier keep their own name set.
    pub fn register(&mut self, name: impl Into<String>) {
        Arc::make_mut(&mut self.registered).insert(name.into());
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registered.iter().map(String::as_str)
    }

    pub async fn enter(&self, user_id: UserId, scope: &str) -> Result<()> {
        if !self.is_registered(scope) {
            return Err(Error::UnknownScope(scope.to_string()));
        }
        self.current
            .lock()
            .await
            .insert(user_id, scope.to_string());
        Ok(())
    }

    pub async fn leave(&self, user_id: UserId) {
        self.current.lock().await.remove(&user_id);
    }

    pub async fn current(&self, user_id: UserId) -> Option<String> {
        self.current.lock().await.get(&user_id).cloned()
    }
}
