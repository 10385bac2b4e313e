use crate::error::CredentialError;
use crate::sources::TokenSource;
use crate::token::AccessToken;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;

/// The API version of the instance-metadata token endpoint.
const METADATA_API_VERSION: &str = "2018-02-01";

/// How long we wait for the metadata endpoint before declaring the source
/// failed. The endpoint is link-local, so anything slower than this means it
/// is not there.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// The token payload returned by the metadata endpoint.
///
/// `expires_on` is a Unix timestamp transmitted as a string; some backends
/// send `expires_in` (seconds from now) instead, so both are accepted.
#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl MetadataTokenResponse {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(epoch) = self.expires_on.as_deref().and_then(|s| s.parse::<i64>().ok()) {
            return Utc.timestamp_opt(epoch, 0).single();
        }
        self.expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64))
    }
}

/// A token source backed by the platform's instance-metadata service.
///
/// This is the "managed identity" path: no secret is embedded anywhere;
/// the platform authenticates the machine itself and mints a short-lived
/// token for the requested resource.
pub struct ManagedIdentitySource {
    client: reqwest::Client,
    endpoint: String,
}

impl ManagedIdentitySource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Maps the requested scopes onto the single `resource` parameter the
    /// metadata endpoint understands: the first scope, with the conventional
    /// `/.default` suffix stripped.
    fn resource_for(scopes: &[String]) -> Result<String, CredentialError> {
        let first = scopes.first().ok_or_else(|| {
            CredentialError::Unavailable(
                "no scopes configured for the managed identity source".to_string(),
            )
        })?;
        Ok(first.trim_end_matches("/.default").to_string())
    }
}

#[async_trait]
impl TokenSource for ManagedIdentitySource {
    async fn token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError> {
        let resource = Self::resource_for(scopes)?;

        tracing::debug!(endpoint = %self.endpoint, resource = %resource, "requesting managed identity token");

        let response = self
            .client
            .get(self.endpoint.as_str())
            .header("Metadata", "true")
            .query(&[
                ("api-version", METADATA_API_VERSION),
                ("resource", resource.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Backend(format!(
                "metadata endpoint answered {}: {}",
                status, body
            )));
        }

        let payload: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Deserialization(e.to_string()))?;

        if payload.access_token.is_empty() {
            return Err(CredentialError::Backend(
                "metadata endpoint returned an empty access token".to_string(),
            ));
        }

        let expiry = payload.expiry();
        Ok(AccessToken::new(payload.access_token, expiry))
    }
}
