//! Common utilities and types shared across the call client crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (users, sessions, calls, connections)
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for the credential provider abstraction and token caching
pub mod credentials;

/// Module for fetching user tokens from an HTTP token endpoint
pub mod token_endpoint;
