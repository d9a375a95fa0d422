//! PostgreSQL connection setup.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_core::SyncError;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::error;

/// Connection settings for the relational target.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub login: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"********")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

/// A client shared by every loader of one run.
pub type SharedClient = Arc<Mutex<Client>>;

/// Connect and spawn the connection driver task.
pub async fn new_postgresql_client(config: &PostgresConfig) -> Result<SharedClient, SyncError> {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.login)
        .password(&config.password)
        .dbname(&config.database)
        .application_name("warehouse-sync");

    let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
        SyncError::Connection(anyhow::Error::new(e).context(format!(
            "Failed to connect to PostgreSQL at {}:{}/{}",
            config.host, config.port, config.database
        )))
    })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {e}");
        }
    });

    Ok(Arc::new(Mutex::new(client)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: PostgresConfig =
            serde_yaml::from_str("host: db\nlogin: loader\ndatabase: app").unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.schema, "public");
        assert_eq!(config.password, "");
    }
}
