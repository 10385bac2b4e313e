use chrono::{DateTime, Utc};
use std::fmt;

/// A short-lived access token minted by an identity backend (or supplied out
/// of band by an operator).
///
/// The token is owned transiently by the caller of the acquisition; this
/// crate caches nothing across calls. `expires_on` is `None` on the override
/// path, where no expiry is known.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_on,
        }
    }

    /// Whether the token has already passed its expiry, if one is known.
    pub fn is_expired(&self) -> bool {
        match self.expires_on {
            Some(expires_on) => expires_on <= Utc::now(),
            None => false,
        }
    }
}

// The token value must never end up in logs, so Debug redacts it.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}
