//! Outbound side of the dispatcher: the port adapters implement, the
//! per-update answer context handed to business logic, and shared types.

pub mod port;
pub mod throttled;
pub mod types;
