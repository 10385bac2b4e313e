use crate::error::CredentialError;
use crate::sources::TokenSource;
use crate::token::AccessToken;
use async_trait::async_trait;
use std::sync::Arc;

/// An ordered fallback over several token sources.
///
/// Sources are tried front to back; the first one to produce a token wins.
/// A source that fails (unavailable or otherwise) is skipped and the next
/// one is consulted. Only when every source has failed does the chain itself
/// fail, carrying the last underlying error for diagnostics.
pub struct CredentialChain {
    sources: Vec<Arc<dyn TokenSource>>,
}

impl CredentialChain {
    pub fn new(sources: Vec<Arc<dyn TokenSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenSource for CredentialChain {
    async fn token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        let mut last_error = CredentialError::Unavailable(
            "the credential chain is empty".to_string(),
        );

        for (index, source) in self.sources.iter().enumerate() {
            match source.token(scopes).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    tracing::debug!(source_index = index, error = %e, "credential chain source failed");
                    last_error = e;
                }
            }
        }

        Err(CredentialError::ChainExhausted(last_error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticTokenSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A source that always fails and counts how often it was asked.
    struct FailingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenSource for FailingSource {
        async fn token(&self, _scopes: &[String]) -> Result<AccessToken, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CredentialError::Unavailable("always failing".to_string()))
        }
    }

    #[tokio::test]
    async fn the_first_successful_source_wins() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let chain = CredentialChain::new(vec![
            Arc::new(FailingSource {
                calls: failing_calls.clone(),
            }) as Arc<dyn TokenSource>,
            Arc::new(StaticTokenSource::new("second")),
            Arc::new(StaticTokenSource::new("third")),
        ]);

        let token = chain.token(&[]).await.unwrap();
        assert_eq!(token.value, "second");
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn an_exhausted_chain_reports_the_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = CredentialChain::new(vec![
            Arc::new(FailingSource {
                calls: calls.clone(),
            }) as Arc<dyn TokenSource>,
            Arc::new(FailingSource {
                calls: calls.clone(),
            }),
        ]);

        let result = chain.token(&[]).await;
        assert!(matches!(result, Err(CredentialError::ChainExhausted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn an_empty_chain_fails() {
        let chain = CredentialChain::new(vec![]);
        let result = chain.token(&[]).await;
        assert!(matches!(result, Err(CredentialError::ChainExhausted(_))));
    }
}
