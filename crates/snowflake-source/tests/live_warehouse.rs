//! Runs against a real Snowflake account.
//!
//! Requires `SNOWFLAKE_ACCOUNT`, `SNOWFLAKE_LOGIN`, `SNOWFLAKE_PASSWORD`,
//! `SNOWFLAKE_DATABASE`, `SNOWFLAKE_SCHEMA` and `SNOWFLAKE_WAREHOUSE`
//! (`SNOWFLAKE_REGION` optional).
//! Run with `cargo test -p warehouse-sync-snowflake -- --ignored`.

use snowflake::{SnowflakeClient, SnowflakeConfig};
use sync_core::{SyncValue, Warehouse};

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set"))
}

#[tokio::test]
#[ignore]
async fn test_select_literals() {
    let config = SnowflakeConfig {
        account: env("SNOWFLAKE_ACCOUNT"),
        region: std::env::var("SNOWFLAKE_REGION").ok(),
        login: env("SNOWFLAKE_LOGIN"),
        password: env("SNOWFLAKE_PASSWORD"),
        database: env("SNOWFLAKE_DATABASE"),
        schema: env("SNOWFLAKE_SCHEMA"),
        warehouse: env("SNOWFLAKE_WAREHOUSE"),
        role: std::env::var("SNOWFLAKE_ROLE").ok(),
        host: None,
    };
    let client = SnowflakeClient::connect(&config).await.unwrap();
    let rows = client
        .execute("SELECT 1 AS ID, 'a' AS NAME, '2024-01-01'::TIMESTAMP_NTZ AS UPDATED_AT")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ID"), Some(&SyncValue::Int(1)));
    assert_eq!(rows[0].get("NAME"), Some(&SyncValue::from("a")));
}

#[tokio::test]
#[ignore]
async fn test_bad_credentials_are_connection_errors() {
    let config = SnowflakeConfig {
        account: env("SNOWFLAKE_ACCOUNT"),
        region: std::env::var("SNOWFLAKE_REGION").ok(),
        login: env("SNOWFLAKE_LOGIN"),
        password: "definitely-wrong".to_string(),
        database: env("SNOWFLAKE_DATABASE"),
        schema: env("SNOWFLAKE_SCHEMA"),
        warehouse: env("SNOWFLAKE_WAREHOUSE"),
        role: None,
        host: None,
    };
    let err = SnowflakeClient::connect(&config).await.err().unwrap();
    assert!(matches!(err, sync_core::SyncError::Connection(_)));
}
