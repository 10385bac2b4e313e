//! # Granite Credentials Crate
//!
//! This crate resolves the short-lived access tokens the execution layer
//! injects into database connections in place of a static password.
//!
//! ## Architectural Principles
//!
//! - **One seam, many sources:** every acquisition mechanism (operator
//!   override, environment variable, managed identity) implements the same
//!   `TokenSource` trait, so callers never branch on which mode is active.
//! - **Precedence, not subclassing:** the `CredentialProvider` applies a
//!   straight precedence rule — a configured override token wins, otherwise
//!   the chain is consulted front to back.
//! - **No caching:** every call resolves a fresh token. Callers who want
//!   caching layer it on the outside.
//!
//! ## Public API
//!
//! - `CredentialProvider`: the entry point, built from `IdentitySettings`.
//! - `TokenSource`: the strategy trait for custom sources.
//! - `AccessToken`: the resolved token plus its expiry, if known.
//! - `CredentialError`: the specific error types that can be returned.

// Declare the modules that constitute this crate.
pub mod chain;
pub mod error;
pub mod managed_identity;
pub mod provider;
pub mod sources;
pub mod token;

// Re-export the key components to create a clean, public-facing API.
pub use chain::CredentialChain;
pub use error::CredentialError;
pub use managed_identity::ManagedIdentitySource;
pub use provider::{CredentialProvider, DEFAULT_TOKEN_ENV_VAR};
pub use sources::{EnvTokenSource, StaticTokenSource, TokenSource};
pub use token::AccessToken;
