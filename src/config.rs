//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub forms: FormsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "forms.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://forms.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Kind of GitHub application the credentials belong to
///
/// GitHub Apps ignore OAuth scopes and may issue expiring tokens;
/// OAuth Apps take a scope list.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GitHubClientType {
    #[default]
    GithubApp,
    OauthApp,
}

impl GitHubClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitHubClientType::GithubApp => "github-app",
            GitHubClientType::OauthApp => "oauth-app",
        }
    }
}

/// GitHub application and endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// OAuth client ID (empty when not configured)
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret (empty when not configured)
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub client_type: GitHubClientType,
    /// REST/GraphQL API root (default: "https://api.github.com")
    pub api_url: String,
    /// Web root used for the OAuth web flow (default: "https://github.com")
    pub web_url: String,
    /// Scopes requested by OAuth Apps
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl GitHubConfig {
    /// Whether both client ID and secret are set
    pub fn has_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.api_url.trim_end_matches('/'))
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
}

/// Project data cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Seconds a loaded project schema is reused (default: 300)
    pub project_ttl: u64,
    /// Maximum cached (user, project) entries (default: 1000)
    pub max_projects: u64,
}

/// Form page configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FormsConfig {
    /// Where `/` redirects to
    pub demo_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    const LEVELS: [&'static str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

    /// Filter directives used when `RUST_LOG` is unset
    pub fn default_filter(&self) -> String {
        let level = self.level.to_ascii_lowercase();
        format!("projectforms={level},tower_http={level}")
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (PROJECTFORMS__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("github.client_type", "github-app")?
            .set_default("github.api_url", "https://api.github.com")?
            .set_default("github.web_url", "https://github.com")?
            .set_default("auth.session_max_age", 604800)?
            .set_default("cache.project_ttl", 300)?
            .set_default("cache.max_projects", 1000)?
            .set_default("forms.demo_path", "/project-forms/demo/projects/1/issues/new")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (PROJECTFORMS__*)
            .add_source(
                Environment::with_prefix("PROJECTFORMS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("github.scopes")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        for (key, value) in [
            ("github.api_url", &self.github.api_url),
            ("github.web_url", &self.github.web_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::Config(format!("{key} is not a valid URL: {e}")))?;
        }

        if crate::project::Parameters::from_path(&self.forms.demo_path).is_none() {
            return Err(AppError::Config(format!(
                "forms.demo_path must look like /<owner>/<repo>/projects/<number>/issues/new, got {}",
                self.forms.demo_path
            )));
        }

        if !LoggingConfig::LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "logging.level must be one of {}, got {}",
                LoggingConfig::LEVELS.join(", "),
                self.logging.level
            )));
        }

        if self.should_use_secure_cookies() && !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }

    /// Report settings that work but disable or weaken something
    pub fn log_warnings(&self) {
        if !self.github.has_credentials() {
            tracing::warn!("github.client_id / github.client_secret not configured; sign-in is disabled");
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        }
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            github: GitHubConfig {
                client_id: "github-client-id".to_string(),
                client_secret: "github-client-secret".to_string(),
                client_type: GitHubClientType::GithubApp,
                api_url: "https://api.github.com".to_string(),
                web_url: "https://github.com".to_string(),
                scopes: Vec::new(),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 604_800,
            },
            cache: CacheConfig {
                project_ttl: 300,
                max_projects: 1000,
            },
            forms: FormsConfig {
                demo_path: "/project-forms/demo/projects/1/issues/new".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "forms.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_malformed_demo_path() {
        let mut config = valid_config();
        config.forms.demo_path = "/project-forms/demo".to_string();

        let error = config.validate().expect_err("demo path must be a form path");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("forms.demo_path")
        ));
    }

    #[test]
    fn validate_allows_missing_github_credentials() {
        let mut config = valid_config();
        config.github.client_id.clear();
        config.github.client_secret.clear();

        assert!(config.validate().is_ok());
        assert!(!config.github.has_credentials());
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = valid_config();
        config.logging.level = "verbose".to_string();

        let error = config.validate().expect_err("log level must be known");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("logging.level")
        ));
    }

    #[test]
    fn default_filter_uses_configured_level() {
        let mut logging = valid_config().logging;
        logging.level = "DEBUG".to_string();
        assert_eq!(logging.default_filter(), "projectforms=debug,tower_http=debug");
        assert!(!logging.is_json());

        logging.format = "JSON".to_string();
        assert!(logging.is_json());
    }

    #[test]
    fn graphql_url_ignores_trailing_slash() {
        let mut config = valid_config();
        config.github.api_url = "http://127.0.0.1:9999/".to_string();
        assert_eq!(config.github.graphql_url(), "http://127.0.0.1:9999/graphql");
    }

    #[test]
    fn base_url_combines_protocol_and_domain() {
        let mut config = valid_config();
        config.server.domain = "localhost:3000".to_string();
        assert_eq!(config.server.base_url(), "http://localhost:3000");
    }
}
