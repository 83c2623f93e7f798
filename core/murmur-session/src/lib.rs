//! Session wiring for the Murmur client core.
//!
//! A [`SessionContext`] binds one entity store, one media cache, one
//! handle tracker and one sync engine to a user's storage namespace.
//! [`SessionManager`] keeps exactly one context open and replaces it when
//! the signed-in user changes, either on request or by following a
//! `watch` channel of the current user.

mod config;
mod context;
mod error;
mod manager;

pub use config::SessionConfig;
pub use context::{SessionContext, SessionOptions};
pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
