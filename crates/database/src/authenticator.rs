use crate::connection_string::{ConnectionDescriptor, ConnectionSpec};
use crate::error::DbError;
use credentials::CredentialProvider;

/// Injects an identity token as the connection's password when the
/// descriptor warrants it; otherwise the spec is left untouched and any
/// password embedded in the connection string stays authoritative.
///
/// When injection applies there is exactly one token acquisition per call.
/// The function is idempotent within an attempt: a second invocation
/// re-resolves the token and deterministically overwrites the password, so
/// an already-authenticated spec is never corrupted.
pub async fn authenticate(
    spec: &mut ConnectionSpec,
    descriptor: &ConnectionDescriptor,
    provider: &CredentialProvider,
    scopes: &[String],
) -> Result<(), DbError> {
    if !descriptor.needs_identity_injection() {
        return Ok(());
    }

    let token = provider.acquire_token(scopes).await?;
    tracing::debug!(
        user = spec.user().unwrap_or("<none>"),
        expires_on = ?token.expires_on,
        "injecting identity token as connection password"
    );
    spec.set_password(token.value);
    Ok(())
}
