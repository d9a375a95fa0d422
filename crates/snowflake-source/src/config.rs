use serde::{Deserialize, Serialize};

/// Snowflake connection profile.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnowflakeConfig {
    /// Account locator, e.g. `xy12345`.
    pub account: String,
    /// Cloud region, e.g. `eu-west-1`; omitted for the default US West region.
    #[serde(default)]
    pub region: Option<String>,
    pub login: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    pub schema: String,
    pub warehouse: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Full base URL, overriding the one derived from account and region.
    #[serde(default)]
    pub host: Option<String>,
}

impl SnowflakeConfig {
    /// Base URL of the account, without trailing slash.
    pub fn base_url(&self) -> String {
        if let Some(host) = &self.host {
            return host.trim_end_matches('/').to_string();
        }
        match self.region.as_deref() {
            None | Some("") | Some("us-west-2") => {
                format!("https://{}.snowflakecomputing.com", self.account)
            }
            Some(region) => format!("https://{}.{region}.snowflakecomputing.com", self.account),
        }
    }
}

impl std::fmt::Debug for SnowflakeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeConfig")
            .field("account", &self.account)
            .field("region", &self.region)
            .field("login", &self.login)
            .field("password", &"********")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("host", &self.host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(region: Option<&str>) -> SnowflakeConfig {
        SnowflakeConfig {
            account: "xy12345".to_string(),
            region: region.map(str::to_string),
            login: "loader".to_string(),
            password: "hunter2".to_string(),
            database: "ANALYTICS".to_string(),
            schema: "PUBLIC".to_string(),
            warehouse: "LOAD_WH".to_string(),
            role: None,
            host: None,
        }
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            config(None).base_url(),
            "https://xy12345.snowflakecomputing.com"
        );
        assert_eq!(
            config(Some("eu-west-1")).base_url(),
            "https://xy12345.eu-west-1.snowflakecomputing.com"
        );
        let mut overridden = config(Some("eu-west-1"));
        overridden.host = Some("http://localhost:8080/".to_string());
        assert_eq!(overridden.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_from_yaml() {
        let config: SnowflakeConfig = serde_yaml::from_str(
            "account: xy12345\nlogin: loader\ndatabase: ANALYTICS\nschema: PUBLIC\nwarehouse: LOAD_WH\nrole: LOADER",
        )
        .unwrap();
        assert_eq!(config.password, "");
        assert_eq!(config.region, None);
        assert_eq!(config.role.as_deref(), Some("LOADER"));
        assert!(serde_yaml::from_str::<SnowflakeConfig>("account: x\npasword: typo").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", config(None));
        assert!(!rendered.contains("hunter2"));
    }
}
