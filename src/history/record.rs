use serde::{Deserialize, Serialize};

/// Digests of a user's previous passwords, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<String>);

impl History {
    #[must_use]
    pub const fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    /// Parse the serialized form kept in the store (a JSON array of strings).
    ///
    /// # Errors
    /// Returns an error if `value` is not a JSON array of strings.
    pub fn decode(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.0.iter().any(|entry| entry == digest)
    }

    /// Put `digest` in front and keep at most `limit` entries.
    #[must_use]
    pub fn rotate(mut self, digest: String, limit: usize) -> Self {
        self.0.insert(0, digest);
        self.0.truncate(limit);
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
