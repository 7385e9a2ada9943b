//! Top-level update dispatch.
//!
//! One [`Dispatcher`] owns the handler registry, the scope table and the state
//! store. For every update it walks the eligible handlers in order, failing
//! over on middleware rejection, performs the winning handler's reply, and
//! optionally keeps going for records flagged `continue_after_match`.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    action::{classify, Reply, Step},
    chain::{run_attempt, Attempt, Middleware},
    errors::Error,
    messaging::port::{Answer, Outbound},
    params::ParamsBag,
    registry::{HandlerRecord, HandlerRegistry},
    scope::ScopeController,
    state::{StateBackend, StateHook, StateStore},
    update::Update,
    update_log::UpdateLog,
    Result,
};

/// What a single `dispatch` did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers whose bodies ran, in order.
    pub handled: Vec<String>,
    /// Outbound calls performed.
    pub calls: usize,
}

impl DispatchReport {
    pub fn is_unhandled(&self) -> bool {
        self.handled.is_empty()
    }
}

pub struct DispatcherBuilder {
    outbound: Arc<dyn Outbound>,
    middlewares: Vec<Arc<dyn Middleware>>,
    registry: HandlerRegistry,
    scopes: ScopeController,
    state: StateStore,
    update_log: Option<UpdateLog>,
}

impl DispatcherBuilder {
    pub fn handler(mut self, record: HandlerRecord) -> Self {
        self.registry.register(record);
        self
    }

    /// Stage run in front of every handler's own middlewares, in the order
    /// added. Applies to handlers registered before or after this call.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn scope(mut self, name: impl Into<String>) -> Self {
        self.scopes.register(name);
        self
    }

    pub fn default_state(mut self, value: Map<String, Value>) -> Self {
        self.state.set_default_value(value);
        self
    }

    pub fn state_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        self.state.set_backend(backend);
        self
    }

    pub fn state_hook(mut self, hook: Arc<dyn StateHook>) -> Self {
        self.state.set_hook(hook);
        self
    }

    pub fn update_log(mut self, log: UpdateLog) -> Self {
        self.update_log = Some(log);
        self
    }

    /// Fails when a record names an unregistered scope, or asks for scope
    /// entry without naming a scope.
    pub fn build(mut self) -> Result<Dispatcher> {
        for record in self.registry.records() {
            match record.scope_tag() {
                Some(tag) if !self.scopes.is_registered(tag) => {
                    return Err(Error::UnknownScope(tag.to_string()));
                }
                None if record.is_scope_entry_only() => {
                    return Err(Error::Config(format!(
                        "handler '{}' runs on scope entry but has no scope",
                        record.name()
                    )));
                }
                _ => {}
            }
        }

        for record in self.registry.records_mut() {
            record.prepend_middlewares(&self.middlewares);
        }

        Ok(Dispatcher {
            outbound: self.outbound,
            registry: self.registry,
            scopes: self.scopes,
            state: self.state,
            update_log: self.update_log,
        })
    }
}

pub struct Dispatcher {
    outbound: Arc<dyn Outbound>,
    registry: HandlerRegistry,
    scopes: ScopeController,
    state: StateStore,
    update_log: Option<UpdateLog>,
}

impl Dispatcher {
    pub fn builder(outbound: Arc<dyn Outbound>) -> DispatcherBuilder {
        DispatcherBuilder {
            outbound,
            middlewares: Vec::new(),
            registry: HandlerRegistry::new(),
            scopes: ScopeController::default(),
            state: StateStore::new(),
            update_log: None,
        }
    }

    pub fn scopes(&self) -> &ScopeController {
        &self.scopes
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Transport entry point. Never fails; faults are logged and the update
    /// is dropped.
    pub async fn handle_update(&self, update: Update) {
        let update_id = update.update_id;
        if let Some(log) = &self.update_log {
            if let Err(e) = log.record(&update).await {
                warn!(
                    update_id,
                    error = %e,
                    path = %log.path().display(),
                    "update log write failed"
                );
            }
        }

        match self.dispatch(update).await {
            Ok(report) if report.is_unhandled() => debug!(update_id, "no handler for update"),
            Ok(report) => debug!(
                update_id,
                handled = ?report.handled,
                calls = report.calls,
                "update handled"
            ),
            Err(e) => warn!(update_id, error = %e, "dispatch failed"),
        }
    }

    /// Dispatch one update and report what ran.
    ///
    /// When the pass moves the acting user into a different scope, the update
    /// is dispatched again as that scope's entry event.
    pub async fn dispatch(&self, update: Update) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let update = Arc::new(update);
        debug!(update_id = update.update_id, user = ?update.user_id(), "dispatching update");

        let before = self.current_scope(&update).await;
        self.run_pass(update.clone(), &mut report).await?;
        if update.scope_entered {
            return Ok(report);
        }

        let after = self.current_scope(&update).await;
        if let Some(scope) = after.filter(|s| before.as_deref() != Some(s.as_str())) {
            debug!(update_id = update.update_id, scope = %scope, "scope entered");
            self.run_pass(Arc::new(update.as_scope_entry()), &mut report)
                .await?;
        }
        Ok(report)
    }

    async fn current_scope(&self, update: &Update) -> Option<String> {
        match update.user_id() {
            Some(user_id) => self.scopes.current(user_id).await,
            None => None,
        }
    }

    async fn run_pass(&self, update: Arc<Update>, report: &mut DispatchReport) -> Result<()> {
        let answer = Answer::new(self.outbound.clone(), update.clone());
        let mut params = ParamsBag::new();
        let mut index = 0;

        loop {
            let scope = self.current_scope(&update).await;
            let eligible = self.registry.eligible(&update, scope.as_deref());
            let Some(record) = eligible.get(index).copied() else {
                break;
            };
            index += 1;

            let attempt = run_attempt(
                record,
                &update,
                &answer,
                &mut params,
                &self.state,
                &self.scopes,
            )
            .await?;

            match attempt {
                Attempt::Rejected => continue,
                Attempt::Handled(reply) => {
                    debug!(update_id = update.update_id, handler = record.name(), "handler ran");
                    report.handled.push(record.name().to_string());
                    if let Some(reply) = reply {
                        report.calls += perform_reply(&answer, reply).await?;
                    }
                    if !record.continues_after_match() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Perform every step in order; returns the number of outbound calls made.
async fn perform_reply(answer: &Answer, reply: Reply) -> Result<usize> {
    let mut calls = 0;
    for step in reply.into_steps() {
        if let Step::Deferred(deferred) = step {
            deferred.run().await?;
            continue;
        }
        if let Some(call) = classify(&step) {
            answer.perform(call).await?;
            calls += 1;
        }
    }
    Ok(calls)
}
