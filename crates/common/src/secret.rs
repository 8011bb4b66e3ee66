//! Secret values: user tokens, the API key, edge credentials.
//!
//! Re-exports [`secrecy`]. `SecretString`'s `Debug` prints a redaction marker,
//! so request and credential structs can derive or hand-write `Debug` without
//! leaking tokens into tracing output. Reading the value takes an explicit
//! `expose_secret()` call, which keeps every place a token hits the wire easy
//! to find.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let api_key = SecretString::from("sk-live-123");
//! assert!(!format!("{api_key:?}").contains("sk-live-123"));
//! assert_eq!(api_key.expose_secret(), "sk-live-123");
//! ```
//!
//! Token endpoint responses deserialize straight into `SecretString` (the
//! `serde` feature of `secrecy` is enabled).

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = SecretString::from("sk-live-123");
        let rendered = format!("{key:?}");

        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("sk-live-123"));
    }

    #[test]
    fn test_issued_token_deserializes_without_leaking() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct IssuedToken {
            user_id: String,
            token: SecretString,
        }

        let issued: IssuedToken =
            serde_json::from_str(r#"{"user_id": "alice", "token": "user-token-abc"}"#).unwrap();

        assert_eq!(issued.token.expose_secret(), "user-token-abc");
        let rendered = format!("{issued:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("user-token-abc"));
    }
}
