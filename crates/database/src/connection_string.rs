use crate::error::DbError;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// The presence flags the connection authenticator bases its decision on.
///
/// Computed fresh from the connection string on every connection attempt and
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub has_user: bool,
    pub has_password: bool,
    pub has_explicit_auth_method: bool,
}

impl ConnectionDescriptor {
    /// Whether an identity token should be injected as the connection's
    /// password: a user is named, no password is embedded, and no explicit
    /// authentication method overrides the decision.
    pub fn needs_identity_injection(&self) -> bool {
        self.has_user && !self.has_password && !self.has_explicit_auth_method
    }
}

/// A connection string parsed into structured fields.
///
/// The accepted grammar is vendor-style `key=value;` pairs, e.g.
/// `Server=db.internal;Port=5432;Database=orders;User Id=app;`. Keys are
/// matched case-insensitively and an empty value counts as absent, so
/// `Password=;` does not suppress identity injection.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    host: String,
    port: u16,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    auth_method: Option<String>,
    ssl_mode: Option<PgSslMode>,
    application_name: Option<String>,
}

impl ConnectionSpec {
    /// Parses a `key=value;` connection string.
    ///
    /// Pure and I/O free. Fails only when a segment cannot be split into a
    /// key and a value at all, or when a recognized value is unusable (a
    /// non-numeric port, an unknown ssl mode). Absent fields are not errors.
    pub fn parse(connection_string: &str) -> Result<Self, DbError> {
        let mut spec = Self {
            host: "localhost".to_string(),
            port: 5432,
            database: None,
            user: None,
            password: None,
            auth_method: None,
            ssl_mode: None,
            application_name: None,
        };

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (key, value) = segment.split_once('=').ok_or_else(|| {
                DbError::MalformedConnectionString(format!(
                    "segment '{}' is not a key=value pair",
                    segment
                ))
            })?;

            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            // An empty value means the field is absent.
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "server" | "host" | "data source" => spec.host = value.to_string(),
                "port" => {
                    spec.port = value.parse().map_err(|_| {
                        DbError::MalformedConnectionString(format!(
                            "port '{}' is not a number",
                            value
                        ))
                    })?;
                }
                "database" | "initial catalog" => spec.database = Some(value.to_string()),
                "user id" | "user" | "uid" | "username" => spec.user = Some(value.to_string()),
                "password" | "pwd" => spec.password = Some(value.to_string()),
                "authentication" => spec.auth_method = Some(value.to_string()),
                "ssl mode" | "sslmode" => spec.ssl_mode = Some(parse_ssl_mode(value)?),
                "application name" => spec.application_name = Some(value.to_string()),
                // Unknown keys are tolerated so vendor-specific extras do not
                // break parsing.
                _ => {}
            }
        }

        Ok(spec)
    }

    /// Derives the presence flags the authenticator decides on.
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            has_user: self.user.is_some(),
            has_password: self.password.is_some(),
            has_explicit_auth_method: self.auth_method.is_some(),
        }
    }

    /// Overwrites the password field. Called by the authenticator with a
    /// freshly acquired token; a repeated call deterministically replaces
    /// the previous value.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Builds the sqlx connect options for this spec.
    pub fn to_pg_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port);
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(ssl_mode) = self.ssl_mode {
            options = options.ssl_mode(ssl_mode);
        }
        if let Some(application_name) = &self.application_name {
            options = options.application_name(application_name);
        }
        options
    }
}

fn parse_ssl_mode(value: &str) -> Result<PgSslMode, DbError> {
    match value.to_ascii_lowercase().as_str() {
        "disable" => Ok(PgSslMode::Disable),
        "allow" => Ok(PgSslMode::Allow),
        "prefer" => Ok(PgSslMode::Prefer),
        "require" => Ok(PgSslMode::Require),
        "verify-ca" => Ok(PgSslMode::VerifyCa),
        "verify-full" => Ok(PgSslMode::VerifyFull),
        other => Err(DbError::MalformedConnectionString(format!(
            "unknown ssl mode '{}'",
            other
        ))),
    }
}
