//! Call Client Library
//!
//! Signaling and state core of a group-call client:
//!
//! - A pure reducer that applies typed actions and server patches to an
//!   immutable call-state snapshot
//! - A coordinator session client that owns the persistent connection for one
//!   user, reconnects with backoff and refreshes credentials after rejection
//! - A call store that applies local actions and translated server pushes in
//!   one ordered queue
//!
//! # Architecture
//!
//! ```text
//! CallClient
//! ├── SessionClient actor (one per client)
//! │   ├── connect task (retry loop, one per connection cycle)
//! │   └── event forwarder (one per live link)
//! │         │ bounded mpsc, SessionEvent
//! │         ▼
//! └── CallStore actor ── reduce / apply_patch ──▶ watch<Arc<CallState>>
//! ```
//!
//! # Modules
//!
//! - [`action`] - Local state-change intents
//! - [`state`] - Immutable call-state snapshot
//! - [`reducer`] - `reduce` and `apply_patch`
//! - [`events`] - Coordinator push events and their translation
//! - [`retry`] - Reconnect policy
//! - [`session`] - Session client actor and backend calls
//! - [`store`] - Call store actor
//! - [`backend`], [`transport`], [`location`] - External collaborator traits
//! - [`config`] - Client configuration from environment
//! - [`errors`] - Error types with error codes
//! - [`observability`] - Tracing setup and metrics

pub mod action;
pub mod backend;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod location;
pub mod models;
pub mod observability;
pub mod reducer;
pub mod retry;
pub mod session;
pub mod signing;
pub mod state;
pub mod store;
pub mod transport;

pub use client::CallClient;
pub use errors::{CallError, ValidationError};
