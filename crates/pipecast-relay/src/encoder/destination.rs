//! Encoder output target.

use std::fmt;

/// Fully composed output URI: `base + "/" + key`.
///
/// `Debug` and `Display` redact the stream key; only [`Destination::uri`]
/// exposes it, for handing to the encoder.
#[derive(Clone, PartialEq, Eq)]
pub struct Destination {
    base: String,
    key: String,
}

impl Destination {
    /// Compose a destination. Trailing slashes on `base` are dropped so the
    /// key is always separated by exactly one `/`.
    pub fn new(base: &str, key: &str) -> Result<Self, DestinationError> {
        let base = base.trim().trim_end_matches('/');
        let key = key.trim();
        if base.is_empty() {
            return Err(DestinationError::EmptyBase);
        }
        if key.is_empty() {
            return Err(DestinationError::EmptyKey);
        }
        Ok(Self {
            base: base.to_string(),
            key: key.to_string(),
        })
    }

    /// The URI the encoder publishes to. Contains the secret key.
    pub fn uri(&self) -> String {
        format!("{}/{}", self.base, self.key)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Log-safe form of the URI.
    pub fn redacted(&self) -> String {
        format!("{}/****", self.base)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Destination").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestinationError {
    #[error("destination base URL is empty")]
    EmptyBase,

    #[error("stream key is empty")]
    EmptyKey,
}
