//! Contract between the history engine and the backing secret store.

use std::future::Future;
use thiserror::Error;

/// Raw value held under a user's key, plus the store's version of it when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub value: String,
    pub version: Option<u64>,
}

/// Failure kinds a store adapter reports. The engine branches on the kind,
/// so adapters must not collapse transport errors into `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("secret not found")]
    NotFound {
        /// Version the store still tracks for a deleted secret.
        version: Option<u64>,
    },
    #[error("secret has an unexpected shape: {detail}")]
    Malformed {
        detail: String,
        /// Version of the secret that could not be read, if the store reported one.
        version: Option<u64>,
    },
    #[error("secret was modified by a concurrent writer")]
    Conflict,
    #[error("secret store unavailable: {0}")]
    Transport(String),
    #[error("key can't be stored: {0}")]
    InvalidKey(String),
}

/// Keyed secret storage the password history lives in.
pub trait SecretStore: Send + Sync {
    /// Fetch the current value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Secret, StoreError>> + Send;

    /// Replace the value under `key`.
    ///
    /// With `expected_version` set the write only succeeds if the stored version
    /// still matches (`Some(0)` means "must not exist yet"); otherwise
    /// `StoreError::Conflict` is returned.
    fn set(
        &self,
        key: &str,
        value: &str,
        expected_version: Option<u64>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Maximum length of a digest this store can keep, if it imposes one.
    fn digest_ceiling(&self) -> Option<usize> {
        None
    }
}
