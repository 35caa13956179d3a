//! Call credentials
// (c) 2025 qfs contributors

use serde::{Deserialize, Serialize};

/// A bearer credential, sent as `authorization: Bearer <token>` metadata.
///
/// The token is never printed; `Debug` and `Display` redact it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    /// Constructor
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The value of the `authorization` metadata entry
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Is there anything to send?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

impl From<&str> for BearerToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BearerToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

impl std::fmt::Display for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}
