//! Connection and behavior configuration.

use std::time::Duration;

use mongodb::options::ClientOptions;

use crate::error::{OrmError, OrmResult};

/// How the layer treats silently-ignorable misuse.
///
/// The original behavior of this layer is to ignore unrecognized filter
/// expressions, unknown preload names and similar misconfiguration. Strict
/// mode upgrades those cases to recorded validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Silently skip unrecognized expressions, relations and fields.
    #[default]
    Lenient,
    /// Record a validation error instead of skipping.
    Strict,
}

impl Strictness {
    /// Check if strict mode is enabled.
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Configuration for the mapping layer.
#[derive(Debug, Clone)]
pub struct OrmConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout.
    pub server_selection_timeout: Option<Duration>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
    /// Deadline for a single store operation.
    pub op_timeout: Duration,
    /// Deadline for each secondary relation fetch. The total preload budget
    /// is proportional to the number of relations resolved.
    pub preload_timeout: Duration,
    /// Misuse handling mode.
    pub strictness: Strictness,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: String::new(),
            app_name: Some("documap".to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            direct_connection: None,
            op_timeout: Duration::from_secs(10),
            preload_timeout: Duration::from_secs(10),
            strictness: Strictness::Lenient,
        }
    }
}

impl OrmConfig {
    /// Create a configuration from a MongoDB URI and database name.
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> OrmConfigBuilder {
        OrmConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> OrmResult<()> {
        if self.uri.is_empty() {
            return Err(OrmError::config("connection URI must not be empty"));
        }
        if self.database.is_empty() {
            return Err(OrmError::config("database name must not be empty"));
        }
        Ok(())
    }

    /// Convert to MongoDB ClientOptions.
    pub async fn to_client_options(&self) -> OrmResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| OrmError::config(format!("failed to parse URI: {}", e)))?;

        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }
        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }

        Ok(options)
    }
}

/// Builder for [`OrmConfig`].
#[derive(Debug, Default)]
pub struct OrmConfigBuilder {
    config: OrmConfig,
}

impl OrmConfigBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            config: OrmConfig::default(),
        }
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.config.uri = uri.into();
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.config.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.config.max_pool_size = Some(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = Some(duration);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.config.direct_connection = Some(enabled);
        self
    }

    /// Set the per-operation deadline.
    pub fn op_timeout(mut self, duration: Duration) -> Self {
        self.config.op_timeout = duration;
        self
    }

    /// Set the per-relation preload deadline.
    pub fn preload_timeout(mut self, duration: Duration) -> Self {
        self.config.preload_timeout = duration;
        self
    }

    /// Set the misuse handling mode.
    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.config.strictness = strictness;
        self
    }

    /// Build the configuration, validating it.
    pub fn build(self) -> OrmResult<OrmConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrmConfig::default();
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.op_timeout, Duration::from_secs(10));
        assert_eq!(config.strictness, Strictness::Lenient);
    }

    #[test]
    fn test_builder() {
        let config = OrmConfig::builder()
            .uri("mongodb://db.example.com:27017")
            .database("orders")
            .max_pool_size(20)
            .op_timeout(Duration::from_secs(5))
            .strictness(Strictness::Strict)
            .build()
            .unwrap();

        assert_eq!(config.uri, "mongodb://db.example.com:27017");
        assert_eq!(config.database, "orders");
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.op_timeout, Duration::from_secs(5));
        assert!(config.strictness.is_strict());
    }

    #[test]
    fn test_validate_rejects_empty_database() {
        let err = OrmConfig::builder()
            .uri("mongodb://localhost:27017")
            .build()
            .unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
    }

    #[test]
    fn test_from_uri() {
        let config = OrmConfig::from_uri("mongodb://localhost:27017", "shop");
        assert_eq!(config.database, "shop");
        assert!(config.validate().is_ok());
    }
}
