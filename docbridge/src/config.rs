//! Configuration-driven backend selection.
//!
//! [`connect`] is the one place that turns a [`StoreConfig`] into a running store. Everything
//! after it works against [`DynDocumentStore`] and never branches on the backend again.
//!
//! ```ignore
//! let config = StoreConfig::from_json_str(r#"{
//!     "type": "mongo_db",
//!     "host": "db.internal",
//!     "database": "shop",
//!     "username": "app",
//!     "password": "secret"
//! }"#)?;
//!
//! let store = docbridge::config::connect(config).await?;
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use docbridge_core::{
    backend::StoreBackendBuilder,
    error::{DocumentStoreError, DocumentStoreResult},
    store::{DocumentStore, DynDocumentStore},
};
use docbridge_memory::InMemoryStore;

/// Which backend to build, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    MongoDb(MongoDbSettings),
}

/// Connection settings for a MongoDB backend.
///
/// `dsn` wins over `host`/`port` when both are given.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MongoDbSettings {
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub direct_connection: bool,
    /// Seconds. Defaults to 5.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl fmt::Debug for MongoDbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbSettings")
            .field("dsn", &self.dsn)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("app_name", &self.app_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("direct_connection", &self.direct_connection)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl StoreConfig {
    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> DocumentStoreResult<Self> {
        let config: StoreConfig =
            serde_json::from_str(json).map_err(|e| DocumentStoreError::Configuration(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> DocumentStoreResult<()> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::MongoDb(settings) => {
                if settings.database.is_empty() {
                    return Err(DocumentStoreError::Configuration("database name is empty".into()));
                }
                if settings.username.is_some() != settings.password.is_some() {
                    return Err(DocumentStoreError::Configuration(
                        "username and password must be given together".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Builds the backend `config` selects and wraps it in a store.
pub async fn connect(config: StoreConfig) -> DocumentStoreResult<DynDocumentStore> {
    config.validate()?;

    match config {
        StoreConfig::Memory => {
            tracing::debug!(target: "docbridge::bridge", backend = "memory", "connecting");
            Ok(DocumentStore::new(InMemoryStore::builder().build().await?).into_dyn())
        }
        StoreConfig::MongoDb(settings) => connect_mongodb(settings).await,
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(settings: MongoDbSettings) -> DocumentStoreResult<DynDocumentStore> {
    use std::time::Duration;

    use docbridge_mongodb::MongoDbStoreBuilder;

    tracing::debug!(target: "docbridge::bridge", backend = "mongodb", ?settings, "connecting");

    let mut builder = match &settings.dsn {
        Some(dsn) => MongoDbStoreBuilder::new(dsn, &settings.database),
        None => MongoDbStoreBuilder::from_host(settings.host.as_deref(), settings.port, &settings.database),
    };
    if let Some(app_name) = settings.app_name {
        builder = builder.app_name(app_name);
    }
    if let (Some(username), Some(password)) = (settings.username, settings.password) {
        builder = builder.credentials(username, password);
    }
    if let Some(secs) = settings.connect_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }

    Ok(DocumentStore::new(builder.direct_connection(settings.direct_connection).build().await?).into_dyn())
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(_settings: MongoDbSettings) -> DocumentStoreResult<DynDocumentStore> {
    Err(DocumentStoreError::Configuration(
        "the mongodb backend requires the `mongodb` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_config() {
        assert_eq!(StoreConfig::from_json_str(r#"{ "type": "memory" }"#).unwrap(), StoreConfig::Memory);
    }

    #[test]
    fn parses_mongodb_config_with_defaults() {
        let config = StoreConfig::from_json_str(
            r#"{ "type": "mongo_db", "host": "db", "database": "shop" }"#,
        )
        .unwrap();

        let StoreConfig::MongoDb(settings) = config else {
            panic!("expected a mongodb config");
        };
        assert_eq!(settings.host.as_deref(), Some("db"));
        assert_eq!(settings.port, None);
        assert!(!settings.direct_connection);
    }

    #[test]
    fn rejects_half_credentials_and_unknown_backends() {
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "type": "mongo_db", "database": "shop", "username": "app" }"#),
            Err(DocumentStoreError::Configuration(_))
        ));
        assert!(matches!(
            StoreConfig::from_json_str(r#"{ "type": "sqlite" }"#),
            Err(DocumentStoreError::Configuration(_))
        ));
    }

    #[test]
    fn debug_redacts_the_password() {
        let config = StoreConfig::from_json_str(
            r#"{ "type": "mongo_db", "database": "shop", "username": "app", "password": "hunter2" }"#,
        )
        .unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[cfg(not(feature = "mongodb"))]
    #[tokio::test]
    async fn mongodb_without_the_feature_is_a_configuration_error() {
        let config = StoreConfig::from_json_str(r#"{ "type": "mongo_db", "database": "shop" }"#).unwrap();

        assert!(matches!(connect(config).await, Err(DocumentStoreError::Configuration(_))));
    }
}
