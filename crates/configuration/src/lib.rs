use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{DatabaseSettings, IdentitySettings, Settings};

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the
/// configuration file, layers any `GRANITE_*` environment variables on top
/// (so secrets like the override access token never have to live in the
/// file), validates the result, and returns an immutable `Settings` snapshot.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        // Tells the builder to look for a file named `config.toml`
        .add_source(config::File::with_name("config.toml"))
        // Environment variables override the file, e.g.
        // GRANITE_IDENTITY__OVERRIDE_ACCESS_TOKEN=... .
        .add_source(config::Environment::with_prefix("GRANITE").separator("__"))
        .build()?;

    // Attempt to deserialize the entire configuration into our `Settings` struct
    let settings = builder.try_deserialize::<Settings>()?;
    validate(&settings)?;

    Ok(settings)
}

/// Rejects configurations that could only fail later, at query time.
fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.database.connection_string.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.connection_string must not be empty".to_string(),
        ));
    }
    if settings.database.retry_max_delay_ms < settings.database.retry_base_delay_ms {
        return Err(ConfigError::ValidationError(
            "database.retry_max_delay_ms must be >= database.retry_base_delay_ms".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn settings_from_toml(toml: &str) -> Result<Settings, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()?;
        let settings = builder.try_deserialize::<Settings>()?;
        validate(&settings)?;
        Ok(settings)
    }

    #[test]
    fn loads_a_complete_configuration() {
        let settings = settings_from_toml(
            r#"
            [database]
            connection_string = "Server=db.internal;Database=orders;User Id=app;"
            schema = "sales"
            max_retries = 5
            retry_base_delay_ms = 50
            retry_max_delay_ms = 2000

            [identity]
            scopes = ["https://database.example.com/.default"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.schema, "sales");
        assert_eq!(settings.database.max_retries, 5);
        assert_eq!(settings.identity.scopes.len(), 1);
        assert!(settings.identity.override_token().is_none());
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let settings = settings_from_toml(
            r#"
            [database]
            connection_string = "Server=db.internal;Database=orders;"

            [identity]
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.schema, "public");
        assert_eq!(settings.database.max_retries, 3);
        assert_eq!(settings.database.retry_base_delay_ms, 100);
    }

    #[test]
    fn rejects_an_empty_connection_string() {
        let result = settings_from_toml(
            r#"
            [database]
            connection_string = "  "

            [identity]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn an_empty_override_token_counts_as_unset() {
        let settings = settings_from_toml(
            r#"
            [database]
            connection_string = "Server=db.internal;"

            [identity]
            override_access_token = ""
            "#,
        )
        .unwrap();
        assert!(settings.identity.override_token().is_none());
    }
}
