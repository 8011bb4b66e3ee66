//! # Call Client Test Utilities
//!
//! Mocks and fixtures for exercising the call client without a coordinator.
//!
//! ## Modules
//!
//! - `mock_transport` - Scripted transport; push events into or drop live links
//! - `mock_api` - Recording coordinator API with scripted failures
//! - `credentials` - Credential provider that rotates tokens on invalidate
//! - `fixtures` - Users, cids, join responses and ready-made dependencies
//!
//! ## Usage
//!
//! ```rust,ignore
//! use call_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let transport = MockTransport::new();
//!     let api = MockCoordinatorApi::builder().build();
//!     let credentials = Arc::new(RotatingCredentialProvider::new());
//!
//!     let (session, mut events, _task) = SessionClient::spawn(
//!         test_dependencies(&transport, &api, &credentials),
//!         test_settings(),
//!     );
//!     session.connect_user(test_user("alice")).await.unwrap();
//!
//!     transport.latest_link().push(participant_joined_event("bob", "s-bob")).await;
//! }
//! ```

pub mod credentials;
pub mod fixtures;
pub mod mock_api;
pub mod mock_transport;

pub use credentials::*;
pub use fixtures::*;
pub use mock_api::*;
pub use mock_transport::*;
