//! Shortener - URL shortener storage core
//!
//! This library provides the persistence core of a URL shortener service:
//! a uniform storage contract with three substitutable backends and the
//! asynchronous deletion pipeline behind it.
//!
//! # Architecture
//! - `storage`: storage contract, backends (memory / file journal / database)
//! - `worker`: bounded background pool for user-scoped batch deletes
//! - `service`: identifier derivation, caller identity, transaction flow
//! - `config`: configuration management
//! - `errors`: crate-wide error taxonomy
//! - `logging`: tracing subscriber setup
//! - `utils`: URL validation helpers

pub mod config;
pub mod errors;
pub mod logging;
pub mod service;
pub mod storage;
pub mod utils;
pub mod worker;
