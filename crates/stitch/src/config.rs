use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection settings for the Stitch Connect API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StitchConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub client_id: String,
    /// API access token, sent as a bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_host() -> String {
    "https://api.stitchdata.com/v4".to_string()
}

impl StitchConfig {
    pub fn new(client_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            client_id: client_id.into(),
            token: Some(token.into()),
            headers: BTreeMap::new(),
        }
    }

    pub(crate) fn trigger_url(&self, source_id: &str) -> String {
        format!("{}/sources/{source_id}/sync", self.host.trim_end_matches('/'))
    }

    pub(crate) fn extractions_url(&self) -> String {
        format!(
            "{}/{}/extractions",
            self.host.trim_end_matches('/'),
            self.client_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let mut config = StitchConfig::new("123", "secret");
        config.host = "https://api.example.com/v4/".to_string();
        assert_eq!(
            config.trigger_url("42"),
            "https://api.example.com/v4/sources/42/sync"
        );
        assert_eq!(
            config.extractions_url(),
            "https://api.example.com/v4/123/extractions"
        );
    }

    #[test]
    fn test_from_yaml_defaults_host() {
        let config: StitchConfig = serde_yaml::from_str("client_id: '99'").unwrap();
        assert_eq!(config.host, "https://api.stitchdata.com/v4");
        assert_eq!(config.token, None);
    }
}
