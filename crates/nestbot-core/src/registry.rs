use std::sync::Arc;

use crate::{
    chain::{Handler, Middleware},
    update::Update,
};

/// A handler body plus its routing metadata. Immutable once registered.
pub struct HandlerRecord {
    name: String,
    handler: Arc<dyn Handler>,
    middlewares: Vec<Arc<dyn Middleware>>,
    scope: Option<String>,
    on_enter: bool,
    continue_after_match: bool,
    with_state: bool,
}

impl HandlerRecord {
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            middlewares: Vec::new(),
            scope: None,
            on_enter: false,
            continue_after_match: false,
            with_state: false,
        }
    }

    /// Append a routing stage; stages run in the order they were added.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Only eligible while the acting user is in this scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Only eligible for the event dispatched right after the user enters
    /// the record's scope.
    pub fn on_enter(mut self) -> Self {
        self.on_enter = true;
        self
    }

    /// Keep trying later candidates after this one has handled the update.
    pub fn continue_after_match(mut self) -> Self {
        self.continue_after_match = true;
        self
    }

    /// Bind the acting user's state handle into the handler context.
    pub fn with_state(mut self) -> Self {
        self.with_state = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn scope_tag(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn is_scope_entry_only(&self) -> bool {
        self.on_enter
    }

    pub fn continues_after_match(&self) -> bool {
        self.continue_after_match
    }

    pub fn wants_state(&self) -> bool {
        self.with_state
    }

    /// Put `stages` in front of the record's own middlewares.
    pub(crate) fn prepend_middlewares(&mut self, stages: &[Arc<dyn Middleware>]) {
        if stages.is_empty() {
            return;
        }
        let own = std::mem::take(&mut self.middlewares);
        self.middlewares = stages.iter().cloned().chain(own).collect();
    }

    fn is_eligible(&self, update: &Update, current_scope: Option<&str>) -> bool {
        match (current_scope, self.scope.as_deref()) {
            (None, None) => true,
            (Some(active), Some(tag)) => active == tag && self.on_enter == update.scope_entered,
            _ => false,
        }
    }
}

impl std::fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("name", &self.name)
            .field("middlewares", &self.middlewares.len())
            .field("scope", &self.scope)
            .field("on_enter", &self.on_enter)
            .field("continue_after_match", &self.continue_after_match)
            .field("with_state", &self.with_state)
            .finish()
    }
}

/// Handler records in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    records: Vec<HandlerRecord>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: HandlerRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[HandlerRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [HandlerRecord] {
        &mut self.records
    }

    /// Candidates for `update` given the user's active scope.
    ///
    /// Without a scope only scope-less records qualify. Inside a scope only
    /// records tagged with it qualify, entry-only records for the transition
    /// event and ordinary ones otherwise.
    pub fn eligible(&self, update: &Update, current_scope: Option<&str>) -> Vec<&HandlerRecord> {
        self.records
            .iter()
            .filter(|r| r.is_eligible(update, current_scope))
            .collect()
    }
}
