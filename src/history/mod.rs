//! Password reuse policy.
//!
//! The engine hashes a candidate password, loads the user's previous digests
//! from a [`SecretStore`], refuses digests already present and otherwise
//! records the new digest in front of the history, keeping at most
//! [`HistoryConfig::size`] entries.
//!
//! Read problems are split in two:
//!
//! - **Degradation** (`NotFound`, an undecodable value, a malformed secret) is
//!   expected and always recovered by starting from an empty history.
//! - **Transport failures** follow [`ReadFailurePolicy`]: `Open` continues with
//!   an empty history, `Closed` aborts the request.
//! - A key the store refuses always aborts the request.
//!
//! Write failures are always returned to the caller.

pub mod digest;
pub mod record;
pub mod store;
pub mod submission;

pub use self::record::History;
pub use self::store::{Secret, SecretStore, StoreError};

use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_HISTORY_SIZE: usize = 4;

/// What to do when the store cannot be reached while loading history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFailurePolicy {
    /// Carry on with an empty history. Reuse protection is off during outages.
    #[default]
    Open,
    /// Refuse the change until the store is reachable again.
    Closed,
}

impl ReadFailurePolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ReadFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("invalid read failure policy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    size: usize,
    read_failure: ReadFailurePolicy,
    check_and_set: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            size: DEFAULT_HISTORY_SIZE,
            read_failure: ReadFailurePolicy::Open,
            check_and_set: false,
        }
    }

    /// Number of passwords remembered per user, never less than one.
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.max(1);
        self
    }

    #[must_use]
    pub const fn with_read_failure(mut self, policy: ReadFailurePolicy) -> Self {
        self.read_failure = policy;
        self
    }

    /// Write back only if nobody changed the history since it was read.
    #[must_use]
    pub const fn with_check_and_set(mut self, enabled: bool) -> Self {
        self.check_and_set = enabled;
        self
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn read_failure(&self) -> ReadFailurePolicy {
        self.read_failure
    }

    #[must_use]
    pub const fn check_and_set(&self) -> bool {
        self.check_and_set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("password previously used")]
    PreviouslyUsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(Rejection),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read password history: {0}")]
    Read(#[source] StoreError),
    #[error("failed to encode password history: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write password history: {0}")]
    Write(#[source] StoreError),
}

/// History as loaded, plus the version to expect when writing it back.
struct Loaded {
    history: History,
    version: Option<u64>,
}

impl Loaded {
    const fn fresh(version: Option<u64>) -> Self {
        Self {
            history: History::new(Vec::new()),
            version,
        }
    }
}

#[derive(Debug)]
pub struct HistoryEngine<S> {
    store: S,
    config: HistoryConfig,
}

impl<S: SecretStore> HistoryEngine<S> {
    #[must_use]
    pub const fn new(store: S, config: HistoryConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Check `password` against the user's history and record it if unused.
    ///
    /// # Errors
    /// Returns `HistoryError::Write` if the new history cannot be stored, and
    /// `HistoryError::Read` if the store is unreachable under
    /// [`ReadFailurePolicy::Closed`] or refuses `user_id` as a key.
    #[instrument(skip(self, password))]
    pub async fn evaluate_and_record(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<Decision, HistoryError> {
        let digest =
            digest::fit_to_ceiling(digest::password_digest(password), self.store.digest_ceiling());

        let loaded = self.load(user_id).await?;

        if loaded.history.contains(&digest) {
            info!("password found in history, rejecting");
            return Ok(Decision::Rejected(Rejection::PreviouslyUsed));
        }

        let history = loaded.history.rotate(digest, self.config.size);
        debug!("history length after rotation: {}", history.len());

        let value = history.encode()?;
        let expected_version = if self.config.check_and_set {
            loaded.version
        } else {
            None
        };

        self.store
            .set(user_id, &value, expected_version)
            .await
            .map_err(|err| {
                error!("failed to store password history: {}", err);
                HistoryError::Write(err)
            })?;

        Ok(Decision::Accepted)
    }

    async fn load(&self, user_id: &str) -> Result<Loaded, HistoryError> {
        match self.store.get(user_id).await {
            Ok(secret) => match History::decode(&secret.value) {
                Ok(history) => Ok(Loaded {
                    history,
                    version: secret.version,
                }),
                Err(err) => {
                    warn!("stored history can't be decoded, starting over: {}", err);
                    Ok(Loaded::fresh(secret.version))
                }
            },

            Err(StoreError::NotFound { version }) => {
                info!("no password history yet, creating a new one");
                // version 0 asks the store to create the secret only if still absent
                Ok(Loaded::fresh(Some(version.unwrap_or(0))))
            }

            Err(StoreError::Malformed { detail, version }) => {
                warn!("stored history is malformed, starting over: {}", detail);
                Ok(Loaded::fresh(version))
            }

            Err(err @ StoreError::InvalidKey(_)) => {
                error!("password history can't be addressed: {}", err);
                Err(HistoryError::Read(err))
            }

            Err(err) => match self.config.read_failure {
                ReadFailurePolicy::Open => {
                    warn!(
                        "could not read password history, continuing without it: {}",
                        err
                    );
                    Ok(Loaded::fresh(None))
                }
                ReadFailurePolicy::Closed => {
                    error!("could not read password history: {}", err);
                    Err(HistoryError::Read(err))
                }
            },
        }
    }
}
