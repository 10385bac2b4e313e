use serde::Deserialize;

/// The root configuration structure for the entire application.
///
/// An instance of this struct is an immutable snapshot: it is loaded once,
/// shared read-only across concurrent operations, and never mutated in place.
/// An administrative reconfiguration (e.g., rotating the override token)
/// produces a brand-new snapshot that later calls observe.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub identity: IdentitySettings,
}

/// Settings for the target database and the retry behavior applied to it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// The vendor connection string, as `key=value;` pairs
    /// (e.g. "Server=db.internal;Database=orders;User Id=app;").
    pub connection_string: String,
    /// The schema queries run against.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// How many times a transiently failing query is retried after the
    /// original attempt. Total attempts = `max_retries + 1`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for the exponential backoff between attempts. Zero disables
    /// the delay entirely.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single backoff delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Settings for how identity tokens are acquired when the connection string
/// carries no password of its own.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySettings {
    /// The scopes requested from the token backend.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// An access token supplied out of band. When non-empty it is used
    /// verbatim and the credential chain is never consulted.
    #[serde(default)]
    pub override_access_token: Option<String>,
    /// The instance-metadata endpoint the managed-identity source calls.
    #[serde(default = "default_metadata_endpoint")]
    pub metadata_endpoint: String,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_metadata_endpoint() -> String {
    "http://169.254.169.254/metadata/identity/oauth2/token".to_string()
}

impl IdentitySettings {
    /// Returns the override token, treating an empty string as unset so a
    /// blank environment variable does not silently disable the chain.
    pub fn override_token(&self) -> Option<&str> {
        self.override_access_token
            .as_deref()
            .filter(|t| !t.is_empty())
    }
}
