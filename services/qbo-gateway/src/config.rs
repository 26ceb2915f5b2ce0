//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The client secret
//! and QuickBooks Time token come from `QB_CLIENT_SECRET` /
//! `QB_TIME_ACCESS_TOKEN` (or a secret file), never from the TOML directly.
//! The token pair itself lives in the credentials file, owned by the
//! credential store.

use common::Secret;
use qbo_client::Environment;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub quickbooks: QuickBooksConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Accounting API settings
#[derive(Debug, Deserialize)]
pub struct QuickBooksConfig {
    /// Realm ID of the company; overridden by `QB_COMPANY_ID`
    #[serde(default)]
    pub company_id: String,
    /// Overridden by `QB_ENVIRONMENT`
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Replaces the environment's host, paths unchanged
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_time_base_url")]
    pub time_base_url: String,
    #[serde(skip)]
    pub time_access_token: Option<Secret<String>>,
}

/// OAuth app and credential persistence settings
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    /// Overridden by `QB_CLIENT_ID`
    #[serde(default)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to QB_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    /// Env file holding QB_ACCESS_TOKEN / QB_REFRESH_TOKEN
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// Refresh this many seconds before the tracked expiry; unset means
    /// refresh only after a 401/403
    #[serde(default)]
    pub refresh_margin_secs: Option<u64>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_connections() -> usize {
    100
}

fn default_environment() -> Environment {
    Environment::Production
}

fn default_timeout() -> u64 {
    30
}

fn default_time_base_url() -> String {
    qbo_client::endpoint::TIME_BASE_URL.to_string()
}

fn default_token_endpoint() -> String {
    intuit_auth::TOKEN_ENDPOINT.to_string()
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from(".env")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for QuickBooksConfig {
    fn default() -> Self {
        Self {
            company_id: String::new(),
            environment: default_environment(),
            timeout_secs: default_timeout(),
            base_url: None,
            time_base_url: default_time_base_url(),
            time_access_token: None,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            client_secret_file: None,
            token_endpoint: default_token_endpoint(),
            credentials_file: default_credentials_file(),
            refresh_margin_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay process env vars.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents, |key| std::env::var(key).ok())
    }

    /// Parse TOML, overlay values from `env`, resolve secrets, validate.
    ///
    /// Client secret resolution order:
    /// 1. QB_CLIENT_SECRET
    /// 2. client_secret_file
    pub fn from_toml(contents: &str, env: impl Fn(&str) -> Option<String>) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Some(id) = env("QB_COMPANY_ID") {
            config.quickbooks.company_id = id;
        }
        if let Some(raw) = env("QB_ENVIRONMENT") {
            config.quickbooks.environment =
                raw.parse()
                    .map_err(|e: qbo_client::UnknownName| common::Error::InvalidValue {
                        key: "QB_ENVIRONMENT".into(),
                        message: e.to_string(),
                    })?;
        }
        if let Some(id) = env("QB_CLIENT_ID") {
            config.oauth.client_id = id;
        }
        config.quickbooks.time_access_token = env("QB_TIME_ACCESS_TOKEN")
            .as_deref()
            .and_then(Secret::from_trimmed);

        if let Some(secret) = env("QB_CLIENT_SECRET").as_deref().and_then(Secret::from_trimmed) {
            config.oauth.client_secret = Some(secret);
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let raw = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.oauth.client_secret = Secret::from_trimmed(&raw);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.quickbooks.company_id.trim().is_empty() {
            return Err(common::Error::Config(
                "quickbooks.company_id (or QB_COMPANY_ID) is required".into(),
            ));
        }
        if self.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "oauth.client_id (or QB_CLIENT_ID) is required".into(),
            ));
        }
        if self.oauth.client_secret.is_none() {
            return Err(common::Error::Config(
                "QB_CLIENT_SECRET or oauth.client_secret_file is required".into(),
            ));
        }

        let urls = [
            ("oauth.token_endpoint", Some(&self.oauth.token_endpoint)),
            ("quickbooks.time_base_url", Some(&self.quickbooks.time_base_url)),
            ("quickbooks.base_url", self.quickbooks.base_url.as_ref()),
        ];
        for (key, url) in urls {
            if let Some(url) = url
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                return Err(common::Error::InvalidValue {
                    key: key.into(),
                    message: format!("must start with http:// or https://, got: {url}"),
                });
            }
        }

        if self.quickbooks.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("qbo-gateway.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:9090"

[quickbooks]
company_id = "9341454278137598"
environment = "sandbox"

[oauth]
client_id = "ABcd1234"
credentials_file = "/var/lib/qbo/.env"
"#
    }

    #[test]
    fn test_load_valid_config() {
        let config =
            Config::from_toml(valid_toml(), env_of(&[("QB_CLIENT_SECRET", "s3cr3t")])).unwrap();

        assert_eq!(config.server.listen_addr.port(), 9090);
        assert_eq!(config.server.max_connections, 100);
        assert_eq!(config.quickbooks.company_id, "9341454278137598");
        assert_eq!(config.quickbooks.environment, Environment::Sandbox);
        assert_eq!(config.quickbooks.timeout_secs, 30);
        assert!(config.quickbooks.base_url.is_none());
        assert_eq!(config.quickbooks.time_base_url, "https://rest.tsheets.com");
        assert_eq!(config.oauth.client_id, "ABcd1234");
        assert_eq!(config.oauth.client_secret.unwrap().expose(), "s3cr3t");
        assert_eq!(
            config.oauth.token_endpoint,
            "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer"
        );
        assert_eq!(config.oauth.credentials_file, PathBuf::from("/var/lib/qbo/.env"));
        assert!(config.oauth.refresh_margin_secs.is_none());
        assert!(config.quickbooks.time_access_token.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::from_toml(
            valid_toml(),
            env_of(&[
                ("QB_CLIENT_SECRET", "s3cr3t"),
                ("QB_COMPANY_ID", "9991"),
                ("QB_ENVIRONMENT", "Production"),
                ("QB_CLIENT_ID", "other-client"),
                ("QB_TIME_ACCESS_TOKEN", "T1\n"),
            ]),
        )
        .unwrap();

        assert_eq!(config.quickbooks.company_id, "9991");
        assert_eq!(config.quickbooks.environment, Environment::Production);
        assert_eq!(config.oauth.client_id, "other-client");
        assert_eq!(config.quickbooks.time_access_token.unwrap().expose(), "T1");
    }

    #[test]
    fn test_env_only_config() {
        let config = Config::from_toml(
            "",
            env_of(&[
                ("QB_CLIENT_SECRET", "s3cr3t"),
                ("QB_COMPANY_ID", "9991"),
                ("QB_CLIENT_ID", "client"),
            ]),
        )
        .unwrap();

        assert_eq!(config.quickbooks.environment, Environment::Production);
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.oauth.credentials_file, PathBuf::from(".env"));
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let result = Config::from_toml(
            valid_toml(),
            env_of(&[("QB_CLIENT_SECRET", "s3cr3t"), ("QB_ENVIRONMENT", "staging")]),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("QB_ENVIRONMENT"), "got: {err}");
    }

    #[test]
    fn test_unknown_environment_in_file_rejected() {
        let toml = valid_toml().replace("\"sandbox\"", "\"staging\"");
        let result = Config::from_toml(&toml, env_of(&[("QB_CLIENT_SECRET", "s3cr3t")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_client_secret_rejected() {
        let result = Config::from_toml(valid_toml(), env_of(&[]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("QB_CLIENT_SECRET"), "got: {err}");
    }

    #[test]
    fn test_client_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "from-file\n").unwrap();
        let toml = format!(
            "{}client_secret_file = \"{}\"\n",
            valid_toml(),
            secret_path.display()
        );

        let config = Config::from_toml(&toml, env_of(&[])).unwrap();
        assert_eq!(config.oauth.client_secret.unwrap().expose(), "from-file");
    }

    #[test]
    fn test_client_secret_env_overrides_file() {
        let toml = format!(
            "{}client_secret_file = \"/nonexistent/client_secret\"\n",
            valid_toml()
        );

        let config =
            Config::from_toml(&toml, env_of(&[("QB_CLIENT_SECRET", "from-env")])).unwrap();
        assert_eq!(config.oauth.client_secret.unwrap().expose(), "from-env");
    }

    #[test]
    fn test_client_secret_file_nonexistent_returns_error() {
        let toml = format!(
            "{}client_secret_file = \"/nonexistent/client_secret\"\n",
            valid_toml()
        );

        let result = Config::from_toml(&toml, env_of(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_company_id_rejected() {
        let toml = valid_toml().replace("company_id = \"9341454278137598\"", "");
        let err = Config::from_toml(&toml, env_of(&[("QB_CLIENT_SECRET", "s")])).unwrap_err();
        assert!(err.to_string().contains("company_id"), "got: {err}");
    }

    #[test]
    fn test_invalid_token_endpoint_rejected() {
        let toml = format!("{}token_endpoint = \"ftp://example.com\"\n", valid_toml());
        let err = Config::from_toml(&toml, env_of(&[("QB_CLIENT_SECRET", "s")])).unwrap_err();
        assert!(err.to_string().contains("oauth.token_endpoint"), "got: {err}");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = valid_toml().replace(
            "environment = \"sandbox\"",
            "environment = \"sandbox\"\ntimeout_secs = 0",
        );
        let result = Config::from_toml(&toml, env_of(&[("QB_CLIENT_SECRET", "s")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let toml = valid_toml().replace(
            "listen_addr = \"127.0.0.1:9090\"",
            "listen_addr = \"127.0.0.1:9090\"\nmax_connections = 0",
        );
        let result = Config::from_toml(&toml, env_of(&[("QB_CLIENT_SECRET", "s")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/qbo-gateway.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = Config::from_toml("not valid {{{{ toml", env_of(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/etc/qbo/custom.toml"));
        assert_eq!(path, PathBuf::from("/etc/qbo/custom.toml"));
    }
}
