//! Update dispatch engine for chat bots.
//!
//! This crate is framework-agnostic: the remote platform lives behind the
//! [`messaging::port::Outbound`] port, implemented in adapter crates.
//!
//! Handlers are registered once on a [`Dispatcher`] together with their
//! middleware chain and scope tag; every inbound [`Update`] is then routed to
//! the first handler whose middlewares all proceed.

pub mod action;
pub mod chain;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod listen;
pub mod logging;
pub mod messaging;
pub mod params;
pub mod registry;
pub mod scope;
pub mod state;
pub mod update;
pub mod update_log;

pub use action::{Action, Deferred, Reply, Step};
pub use chain::{handler_fn, middleware_fn, Flow, Handler, HandlerContext, Middleware};
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherBuilder};
pub use errors::{Error, Result};
pub use params::ParamsBag;
pub use registry::{HandlerRecord, HandlerRegistry};
pub use scope::ScopeController;
pub use state::{StateBackend, StateHandle, StateHook, StateStore};
pub use update::Update;
