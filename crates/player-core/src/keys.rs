//! Decryption key store.
//!
//! Keys are process-wide, keyed by stream, and may be set before the stream
//! is started. Readers take a shared lock and clone an `Arc` to the key, so a
//! concurrent writer can never expose a half-written key.
//!
//! Key bytes live in a [`SecretBox`] and never appear in `Debug` output or
//! log fields.

use crate::errors::PlayerError;
use common::secret::{ExposeSecret, SecretBox};
use common::types::StreamId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Key lengths accepted for stream decryption (AES-128/192/256).
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// A validated stream decryption key.
#[derive(Debug)]
pub struct DecryptionKey(SecretBox<Vec<u8>>);

impl DecryptionKey {
    /// Validate and wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::InvalidKeyLength`] unless the key is 16, 24 or
    /// 32 bytes long.
    pub fn new(bytes: Vec<u8>) -> Result<Self, PlayerError> {
        let len = bytes.len();
        if !VALID_KEY_LENGTHS.contains(&len) {
            return Err(PlayerError::InvalidKeyLength { len });
        }
        Ok(Self(SecretBox::new(Box::new(bytes))))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the raw key bytes. Only the pipeline boundary should call this.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl Clone for DecryptionKey {
    fn clone(&self) -> Self {
        Self(SecretBox::new(Box::new(self.0.expose_secret().clone())))
    }
}

/// A stored key together with its per-stream version.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub key: Arc<DecryptionKey>,
    /// Incremented on every successful set for the stream, starting at 1.
    pub version: u64,
}

/// Shared stream → key map.
#[derive(Debug, Clone, Default)]
pub struct DecryptionKeyStore {
    inner: Arc<RwLock<HashMap<StreamId, KeyRecord>>>,
}

impl DecryptionKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the key for a stream and return the new version.
    pub async fn insert(&self, stream_id: &StreamId, key: DecryptionKey) -> u64 {
        let mut keys = self.inner.write().await;
        let version = keys.get(stream_id).map_or(1, |r| r.version + 1);
        keys.insert(
            stream_id.clone(),
            KeyRecord {
                key: Arc::new(key),
                version,
            },
        );
        debug!(
            target: "player.keys",
            stream_id = %stream_id,
            version = version,
            "Decryption key stored"
        );
        version
    }

    /// Current key record for a stream, if any.
    pub async fn get(&self, stream_id: &StreamId) -> Option<KeyRecord> {
        self.inner.read().await.get(stream_id).cloned()
    }

    /// Current key version for a stream (0 when no key is stored).
    pub async fn version(&self, stream_id: &StreamId) -> u64 {
        self.inner
            .read()
            .await
            .get(stream_id)
            .map_or(0, |r| r.version)
    }

    /// Drop the key for a stream. Returns whether one was stored.
    pub async fn remove(&self, stream_id: &StreamId) -> bool {
        let removed = self.inner.write().await.remove(stream_id).is_some();
        if removed {
            debug!(
                target: "player.keys",
                stream_id = %stream_id,
                "Decryption key cleared"
            );
        }
        removed
    }

    /// Drop every stored key.
    pub async fn clear(&self) {
        let mut keys = self.inner.write().await;
        let count = keys.len();
        keys.clear();
        debug!(target: "player.keys", cleared = count, "All decryption keys cleared");
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
