//! The object store holding raw resource bodies too large for the database.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`RawResourceStore`].
#[derive(Debug, Clone, Error)]
pub enum ObjectStoreError {
    #[error("object store throttled the request: {0}")]
    /// The store asked the caller to back off.
    Throttled(String),

    #[error("object store unavailable: {0}")]
    /// The store could not be reached.
    Unavailable(String),

    #[error("object store error: {0}")]
    /// Any other failure.
    Internal(String),
}

/// Read access to raw resource bodies kept in an object store.
#[async_trait]
pub trait RawResourceStore: Send + Sync {
    /// Fetches the object at `key`, or `None` if it does not exist.
    async fn get_object(&self, bucket: &str, key: &str)
    -> Result<Option<Vec<u8>>, ObjectStoreError>;
}
