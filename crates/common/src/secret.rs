//! Secret types for protecting key material from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Stream decryption
//! keys travel through the player inside these wrappers so that any struct
//! deriving `Debug` over them, and any `tracing` field formatted with `?`,
//! shows a redaction marker instead of key bytes.
//!
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretBox};
//!
//! #[derive(Debug)]
//! struct KeyUpdate {
//!     stream_id: String,
//!     key: SecretBox<Vec<u8>>,
//! }
//!
//! let update = KeyUpdate {
//!     stream_id: "cam1".to_string(),
//!     key: SecretBox::new(Box::new(vec![0x2a; 16])),
//! };
//!
//! // Debug output hides the key
//! assert!(!format!("{update:?}").contains("42"));
//!
//! // Reading the bytes is explicit
//! assert_eq!(update.key.expose_secret().len(), 16);
//! ```
//!
//! Use `SecretBox<Vec<u8>>` for binary keys and `SecretString` for
//! textual credentials (for example a key supplied as hex in configuration).

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_binary_key_debug_is_redacted() {
        let key: SecretBox<Vec<u8>> = SecretBox::new(Box::new(b"0123456789abcdef".to_vec()));
        let debug_str = format!("{key:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("48")); // b'0'
    }

    #[test]
    fn test_expose_secret_returns_inner_bytes() {
        let key: SecretBox<Vec<u8>> = SecretBox::new(Box::new(vec![7u8; 24]));
        assert_eq!(key.expose_secret().as_slice(), &[7u8; 24]);
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct KeyRecord {
            stream_id: String,
            key: SecretString,
        }

        let record = KeyRecord {
            stream_id: "cam1".to_string(),
            key: SecretString::from("00112233445566778899aabbccddeeff"),
        };

        let debug_str = format!("{record:?}");

        assert!(debug_str.contains("cam1"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("00112233"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct KeyConfig {
            stream_id: String,
            key_hex: SecretString,
        }

        let json = r#"{"stream_id": "cam1", "key_hex": "deadbeefdeadbeef"}"#;
        let config: KeyConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.key_hex.expose_secret(), "deadbeefdeadbeef");

        let debug = format!("{config:?}");
        assert!(!debug.contains("deadbeef"));
        assert!(debug.contains("REDACTED"));
    }
}
