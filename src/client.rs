//! Client wrapper binding a shared MongoDB connection to one database.

use std::sync::Arc;
use std::time::Duration;

use bson::{Document, doc};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use crate::config::{OrmConfig, Strictness};
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::session::Session;

/// Handle to a logical database within a shared store connection.
///
/// The MongoDB driver handles connection pooling internally; this wrapper
/// is cheap to clone and safe for concurrent independent use by multiple
/// sessions. Sessions borrow operations from it, never own it.
#[derive(Clone, Debug)]
pub struct OrmClient {
    client: Client,
    database: Database,
    config: Arc<OrmConfig>,
}

impl OrmClient {
    /// Create a new client from configuration.
    pub async fn new(config: OrmConfig) -> OrmResult<Self> {
        config.validate()?;
        let options = config.to_client_options().await?;

        let client = Client::with_options(options)
            .map_err(|e| OrmError::connection(format!("failed to create client: {}", e)))?;

        let database = client.database(&config.database);

        info!(
            uri = %config.uri,
            database = %config.database,
            "store client created"
        );

        Ok(Self {
            client,
            database,
            config: Arc::new(config),
        })
    }

    /// Create a builder for the client.
    pub fn builder() -> OrmClientBuilder {
        OrmClientBuilder::new()
    }

    /// Open a fresh session accumulator bound to this client's database.
    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Get the typed collection a model maps to.
    pub fn collection_for<M: Model>(&self) -> Collection<M> {
        self.database.collection(&M::collection_name())
    }

    /// Get a typed collection by explicit name.
    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    /// Get a collection of raw BSON documents.
    pub fn collection_doc(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the underlying MongoDB client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    /// Check if the client is healthy by pinging the server.
    pub async fn is_healthy(&self) -> bool {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_ok()
    }

    /// Drop a collection.
    pub async fn drop_collection(&self, name: &str) -> OrmResult<()> {
        debug!(collection = %name, "dropping collection");
        self.database
            .collection::<Document>(name)
            .drop(None)
            .await
            .map_err(OrmError::from)?;
        Ok(())
    }

    /// Create an index on a collection.
    pub async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        unique: bool,
    ) -> OrmResult<String> {
        use mongodb::IndexModel;
        use mongodb::options::IndexOptions;

        let options = IndexOptions::builder().unique(unique).build();
        let model = IndexModel::builder().keys(keys).options(options).build();

        let result = self
            .database
            .collection::<Document>(collection)
            .create_index(model, None)
            .await
            .map_err(OrmError::from)?;

        Ok(result.index_name)
    }

    /// Start a driver session for transactions.
    pub async fn start_session(&self) -> OrmResult<mongodb::ClientSession> {
        let session = self
            .client
            .start_session(None)
            .await
            .map_err(OrmError::from)?;
        Ok(session)
    }
}

/// Builder for [`OrmClient`].
#[derive(Debug, Default)]
pub struct OrmClientBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    min_pool_size: Option<u32>,
    connect_timeout: Option<Duration>,
    op_timeout: Option<Duration>,
    preload_timeout: Option<Duration>,
    strictness: Option<Strictness>,
    direct_connection: Option<bool>,
}

impl OrmClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the per-operation deadline.
    pub fn op_timeout(mut self, duration: Duration) -> Self {
        self.op_timeout = Some(duration);
        self
    }

    /// Set the per-relation preload deadline.
    pub fn preload_timeout(mut self, duration: Duration) -> Self {
        self.preload_timeout = Some(duration);
        self
    }

    /// Set the misuse handling mode.
    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = Some(strictness);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Build the client.
    pub async fn build(self) -> OrmResult<OrmClient> {
        let mut config_builder = OrmConfig::builder();

        if let Some(uri) = self.uri {
            config_builder = config_builder.uri(uri);
        }
        if let Some(database) = self.database {
            config_builder = config_builder.database(database);
        }
        if let Some(app_name) = self.app_name {
            config_builder = config_builder.app_name(app_name);
        }
        if let Some(max_pool) = self.max_pool_size {
            config_builder = config_builder.max_pool_size(max_pool);
        }
        if let Some(min_pool) = self.min_pool_size {
            config_builder = config_builder.min_pool_size(min_pool);
        }
        if let Some(timeout) = self.connect_timeout {
            config_builder = config_builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.op_timeout {
            config_builder = config_builder.op_timeout(timeout);
        }
        if let Some(timeout) = self.preload_timeout {
            config_builder = config_builder.preload_timeout(timeout);
        }
        if let Some(strictness) = self.strictness {
            config_builder = config_builder.strictness(strictness);
        }
        if let Some(direct) = self.direct_connection {
            config_builder = config_builder.direct_connection(direct);
        }

        let config = config_builder.build()?;
        OrmClient::new(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder_fields() {
        let builder = OrmClientBuilder::new()
            .uri("mongodb://localhost:27017")
            .database("test")
            .max_pool_size(20)
            .strictness(Strictness::Strict);

        assert_eq!(builder.uri, Some("mongodb://localhost:27017".to_string()));
        assert_eq!(builder.database, Some("test".to_string()));
        assert_eq!(builder.max_pool_size, Some(20));
        assert_eq!(builder.strictness, Some(Strictness::Strict));
    }

    #[tokio::test]
    async fn test_build_requires_database() {
        let err = OrmClientBuilder::new()
            .uri("mongodb://localhost:27017")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_without_connecting() {
        // Client construction parses options but does not contact the server.
        let client = OrmClientBuilder::new()
            .uri("mongodb://localhost:27017")
            .database("documap_test")
            .build()
            .await
            .unwrap();

        assert_eq!(client.config().database, "documap_test");
        assert_eq!(client.database().name(), "documap_test");
    }
}
