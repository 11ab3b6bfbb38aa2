use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use llmgw_directory::Routes;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Static routing directory; ignored when a Redis directory is selected.
    #[serde(default)]
    pub routes: Routes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Per-server drain window on shutdown; the process caps it at 5 minutes.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    60
}

pub fn load(path: &Path) -> anyhow::Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: GatewayConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.shutdown_grace_secs, 60);
        assert!(config.routes.tenants.is_empty());
    }

    #[test]
    fn routes_tree_parses() {
        let raw = r#"
server:
  listen: "127.0.0.1:9000"
routes:
  tenants:
    - id: tenant-1
      upstream:
        upstream:
          openai:
            base_url: https://api.openai.com/v1
            api_key: sk-tenant
      teams:
        - id: team-1
          groups:
            - id: group-1
              groups:
                - id: group-2
                  endpoints:
                    - id: ep-1
                      alias: inner
                      api_key: key-inner
"#;
        let config: GatewayConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        let tenant = &config.routes.tenants[0];
        assert_eq!(tenant.teams[0].groups[0].groups[0].endpoints[0].alias, "inner");
        assert!(tenant.upstream.is_some());
    }
}
