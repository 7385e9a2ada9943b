//! Middleware chain executor.
//!
//! A handler attempt walks the record's middlewares with a cursor. Each stage
//! answers [`Flow::Proceed`] or [`Flow::Reject`]; the first rejection ends the
//! attempt and the dispatcher moves on to the next candidate. When every stage
//! proceeds the handler body runs exactly once and its result is final, even
//! when it returns nothing.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;

use crate::{
    action::Reply,
    domain::UserId,
    errors::Error,
    messaging::port::Answer,
    params::ParamsBag,
    registry::HandlerRecord,
    scope::ScopeController,
    state::{StateHandle, StateStore},
    update::Update,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Proceed,
    Reject,
}

/// One routing stage. May inspect the update, talk to the chat through the
/// answer, and leave values in the params bag for later stages.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        update: &Update,
        answer: &Answer,
        params: &mut ParamsBag,
    ) -> Result<Flow>;
}

/// Synchronous predicate middleware.
pub struct FnMiddleware<F>(F);

impl<F> FnMiddleware<F>
where
    F: Fn(&Update, &mut ParamsBag) -> Flow + Send + Sync,
{
    pub fn check(&self, update: &Update, params: &mut ParamsBag) -> Flow {
        (self.0)(update, params)
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Update, &mut ParamsBag) -> Flow + Send + Sync,
{
    async fn handle(
        &self,
        update: &Update,
        _answer: &Answer,
        params: &mut ParamsBag,
    ) -> Result<Flow> {
        Ok(self.check(update, params))
    }
}

pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Update, &mut ParamsBag) -> Flow + Send + Sync,
{
    FnMiddleware(f)
}

/// Everything one handler invocation gets to see.
///
/// Built fresh for every call; handlers never share mutable context.
#[derive(Clone)]
pub struct HandlerContext {
    update: Arc<Update>,
    answer: Answer,
    params: ParamsBag,
    state: Option<StateHandle>,
    scopes: ScopeController,
}

impl HandlerContext {
    pub fn new(
        update: Arc<Update>,
        answer: Answer,
        params: ParamsBag,
        state: Option<StateHandle>,
        scopes: ScopeController,
    ) -> Self {
        Self {
            update,
            answer,
            params,
            state,
            scopes,
        }
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    /// Params as left by the middlewares that let this handler through.
    pub fn params(&self) -> &ParamsBag {
        &self.params
    }

    pub fn scopes(&self) -> &ScopeController {
        &self.scopes
    }

    pub fn user_id(&self) -> Result<UserId> {
        self.update.user_id().ok_or(Error::MissingContext("user id"))
    }

    /// Only bound for records registered with `with_state()`.
    pub fn state(&self) -> Result<&StateHandle> {
        self.state.as_ref().ok_or(Error::MissingContext("state"))
    }

    pub async fn enter_scope(&self, scope: &str) -> Result<()> {
        self.scopes.enter(self.user_id()?, scope).await
    }

    pub async fn leave_scope(&self) -> Result<()> {
        self.scopes.leave(self.user_id()?).await;
        Ok(())
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, cx: HandlerContext) -> Result<Option<Reply>>;
}

pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Reply>>> + Send + 'static,
{
    async fn handle(&self, cx: HandlerContext) -> Result<Option<Reply>> {
        (self.0)(cx).await
    }
}

/// Adapt an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Reply>>> + Send + 'static,
{
    FnHandler(f)
}

#[derive(Debug)]
pub enum Attempt {
    /// A middleware rejected; try the next candidate.
    Rejected,
    /// The body ran. `None` still counts as handled.
    Handled(Option<Reply>),
}

/// Run one candidate record against the update.
///
/// Middleware errors and handler faults are returned as-is; the dispatcher
/// treats them as the end of the update.
pub async fn run_attempt(
    record: &HandlerRecord,
    update: &Arc<Update>,
    answer: &Answer,
    params: &mut ParamsBag,
    store: &StateStore,
    scopes: &ScopeController,
) -> Result<Attempt> {
    let middlewares = record.middlewares();
    let mut cursor = 0;
    while let Some(middleware) = middlewares.get(cursor) {
        match middleware.handle(update, answer, params).await? {
            Flow::Proceed => cursor += 1,
            Flow::Reject => return Ok(Attempt::Rejected),
        }
    }

    let state = match (record.wants_state(), update.user_id()) {
        (true, Some(user_id)) => Some(store.get_store(user_id, params).await?),
        _ => None,
    };

    let cx = HandlerContext::new(
        update.clone(),
        answer.clone(),
        params.clone(),
        state,
        scopes.clone(),
    );
    let reply = record.handler().handle(cx).await?;
    Ok(Attempt::Handled(reply))
}
