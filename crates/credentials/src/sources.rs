use crate::error::CredentialError;
use crate::token::AccessToken;
use async_trait::async_trait;
use std::env;

/// The generic, abstract interface for anything that can produce an access
/// token for a set of scopes.
///
/// This trait is the single strategy seam of the crate: the override path,
/// the environment variable path, and the managed-identity path are all just
/// implementations, so callers never branch on which mechanism is active.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Produces a token valid for the given scopes.
    ///
    /// `Err(CredentialError::Unavailable)` means this source cannot serve the
    /// request at all (e.g., the environment variable is unset), which a
    /// chain treats as "try the next source".
    async fn token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError>;
}

/// A token source backed by a fixed, pre-resolved token value.
///
/// Used for the operator-supplied override path; the value is returned
/// verbatim for every request, with no expiry attached.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if self.token.is_empty() {
            return Err(CredentialError::Unavailable(
                "static token source holds an empty token".to_string(),
            ));
        }
        Ok(AccessToken::new(self.token.clone(), None))
    }
}

/// A token source that reads a token from an environment variable.
///
/// This is the first link of the default chain, so a token injected by a
/// deployment platform wins over a round trip to the metadata endpoint.
pub struct EnvTokenSource {
    variable: String,
}

impl EnvTokenSource {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl TokenSource for EnvTokenSource {
    async fn token(&self, _scopes: &[String]) -> Result<AccessToken, CredentialError> {
        match env::var(&self.variable) {
            Ok(value) if !value.is_empty() => Ok(AccessToken::new(value, None)),
            _ => Err(CredentialError::Unavailable(format!(
                "environment variable '{}' is not set",
                self.variable
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_its_token_verbatim() {
        let source = StaticTokenSource::new("abc123");
        let token = source.token(&[]).await.unwrap();
        assert_eq!(token.value, "abc123");
        assert!(token.expires_on.is_none());
    }

    #[tokio::test]
    async fn static_source_with_empty_token_is_unavailable() {
        let source = StaticTokenSource::new("");
        let result = source.token(&[]).await;
        assert!(matches!(result, Err(CredentialError::Unavailable(_))));
    }

    #[tokio::test]
    async fn env_source_reads_the_configured_variable() {
        // Var name is unique to this test to avoid clashing with parallel tests.
        unsafe { env::set_var("GRANITE_TEST_ENV_SOURCE_TOKEN", "from-env") };
        let source = EnvTokenSource::new("GRANITE_TEST_ENV_SOURCE_TOKEN");
        let token = source.token(&[]).await.unwrap();
        assert_eq!(token.value, "from-env");
        unsafe { env::remove_var("GRANITE_TEST_ENV_SOURCE_TOKEN") };
    }

    #[tokio::test]
    async fn env_source_is_unavailable_when_the_variable_is_missing() {
        let source = EnvTokenSource::new("GRANITE_TEST_ENV_SOURCE_MISSING");
        let result = source.token(&[]).await;
        assert!(matches!(result, Err(CredentialError::Unavailable(_))));
    }
}
