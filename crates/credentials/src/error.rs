use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to reach the token endpoint: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The token endpoint returned an error: {0}")]
    Backend(String),

    #[error("Failed to deserialize the token response: {0}")]
    Deserialization(String),

    #[error("The token source has no token available: {0}")]
    Unavailable(String),

    #[error("Every source in the credential chain failed; last error: {0}")]
    ChainExhausted(String),
}
