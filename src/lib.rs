//! Polls status pages, classifies each into a severity level and keeps the
//! current state of every monitored service.
//!
//! - [`fetch`]: the fetch-and-classify chain (feed, JSON API, HTML).
//! - [`store`]: the concurrent service list and its persistence.
//! - [`scheduler`]: the tick loop that dispatches due fetches.
//! - [`api`]: the JSON surface a dashboard reads from.

#[macro_use]
extern crate rocket;

pub mod api;
pub mod error;
pub mod fetch;
pub mod models;
pub mod scheduler;
pub mod settings;
pub mod storage;
pub mod store;

#[cfg(test)]
mod test_support;
