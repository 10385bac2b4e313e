//! # Granite Database Crate
//!
//! This crate is the authenticated, fault-tolerant query execution layer:
//! it decides when an outbound connection needs a dynamically acquired
//! identity token injected as its password, and wraps every query in a
//! bounded retry loop that tells transient infrastructure failures apart
//! from permanent ones.
//!
//! ## Architectural Principles
//!
//! - **Each attempt is complete:** every attempt parses the connection
//!   string, derives the presence descriptor, authenticates, opens a fresh
//!   connection, and executes. An attempt either fully succeeds or is
//!   discarded in its entirety; no partial results cross the boundary.
//! - **Classification over exceptions:** failures are structured `DbError`
//!   values; the `ExceptionClassifier` consults the vendor error code, and
//!   only codes in its configured transient set are retried.
//! - **One terminal outcome:** callers see either the materialized result or
//!   a single `ServiceError` carrying an HTTP-style status code and the last
//!   underlying cause.
//!
//! ## Public API
//!
//! - `QueryExecutor`: the retrying, authenticating execution engine.
//! - `ConnectionSpec` / `ConnectionDescriptor`: the connection string
//!   inspector.
//! - `authenticate`: the in-place connection authenticator.
//! - `ExceptionClassifier` / `Severity`: transient-vs-fatal classification.
//! - `RetryPolicy`, `SqlParam`, `DbError`, `ServiceError`.

// Declare the modules that constitute this crate.
pub mod authenticator;
pub mod classify;
pub mod connection_string;
pub mod error;
pub mod executor;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the key components to create a clean, public-facing API.
pub use authenticator::authenticate;
pub use classify::{ExceptionClassifier, PG_TRANSIENT_CODES, Severity};
pub use connection_string::{ConnectionDescriptor, ConnectionSpec};
pub use error::{DbError, ServiceError};
pub use executor::{QueryExecutor, RetryPolicy, SqlParam};
