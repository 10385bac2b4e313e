use crate::chain::CredentialChain;
use crate::error::CredentialError;
use crate::managed_identity::ManagedIdentitySource;
use crate::sources::{EnvTokenSource, TokenSource};
use crate::token::AccessToken;
use configuration::IdentitySettings;
use std::sync::Arc;

/// The environment variable consulted by the default credential chain before
/// it falls back to the metadata endpoint.
pub const DEFAULT_TOKEN_ENV_VAR: &str = "GRANITE_DATABASE_TOKEN";

/// Resolves access tokens by a straight precedence rule: a pre-configured
/// override token wins; otherwise the credential chain is consulted.
///
/// The provider caches nothing. Each `acquire_token` call resolves a fresh
/// token; callers who want caching do it outside, typically by configuring
/// an override token for the process.
pub struct CredentialProvider {
    override_token: Option<String>,
    chain: Arc<dyn TokenSource>,
}

impl CredentialProvider {
    pub fn new(override_token: Option<String>, chain: Arc<dyn TokenSource>) -> Self {
        // An empty override must not shadow the chain.
        let override_token = override_token.filter(|t| !t.is_empty());
        Self {
            override_token,
            chain,
        }
    }

    /// Builds a provider from the identity section of the configuration
    /// snapshot, wiring up the default chain: environment variable first,
    /// then the managed-identity metadata endpoint.
    pub fn from_settings(identity: &IdentitySettings) -> Self {
        let chain = CredentialChain::new(vec![
            Arc::new(EnvTokenSource::new(DEFAULT_TOKEN_ENV_VAR)) as Arc<dyn TokenSource>,
            Arc::new(ManagedIdentitySource::new(&identity.metadata_endpoint)),
        ]);
        Self::new(identity.override_token().map(str::to_string), Arc::new(chain))
    }

    /// Resolves a token for the given scopes.
    ///
    /// The override path never touches the network and never fails; the
    /// chain path suspends while the identity backend is contacted and
    /// propagates its failure as-is, which the execution layer treats as
    /// fatal (a bad credential source will not become good on retry).
    pub async fn acquire_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if let Some(token) = &self.override_token {
            tracing::debug!("using the configured override access token");
            return Ok(AccessToken::new(token.clone(), None));
        }
        self.chain.token(scopes).await
    }
}
