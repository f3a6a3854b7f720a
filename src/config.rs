//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::oauth::codes::DEFAULT_CODE_TTL;
use crate::oauth::registration::DEFAULT_SCOPE;
use crate::oauth::tokens::{DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_REFRESH_TOKEN_TTL};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before resolving `env:` references.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// OAuth authorization server configuration
    pub oauth: OAuthConfig,
    /// Upstream session hand-off
    pub session: SessionConfig,
    /// Brand data source
    pub data: DataConfig,
    /// Expired credential sweeping
    pub reaper: ReaperConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (BRANDHALO_ prefix)
        figment = figment.merge(Env::prefixed("BRANDHALO_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env: resolution)
        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Reject configurations the gateway cannot serve with.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.oauth.issuer)
            .map_err(|e| Error::Config(format!("oauth.issuer must be an absolute URL: {e}")))?;
        if self.oauth.scopes_supported.is_empty() {
            return Err(Error::Config(
                "oauth.scopes_supported must not be empty".to_string(),
            ));
        }
        if self.oauth.code_ttl.is_zero() || self.oauth.access_token_ttl.is_zero() {
            return Err(Error::Config(
                "oauth.code_ttl and oauth.access_token_ttl must be positive".to_string(),
            ));
        }
        if self.reaper.enabled && self.reaper.interval.is_zero() {
            return Err(Error::Config("reaper.interval must be positive".to_string()));
        }
        self.session.resolve_shared_secret()?;
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// OAuth authorization server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Public base URL of this gateway; endpoint URLs in the metadata derive from it
    pub issuer: String,
    /// Authorization code lifetime
    #[serde(with = "humantime_serde")]
    pub code_ttl: Duration,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,
    /// Scopes advertised and grantable
    pub scopes_supported: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://127.0.0.1:39500".to_string(),
            code_ttl: DEFAULT_CODE_TTL,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            scopes_supported: vec![DEFAULT_SCOPE.to_string()],
        }
    }
}

/// Session hand-off configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Header carrying the active organization ID
    pub organization_header: String,
    /// Header carrying the signed-in user ID
    pub user_header: String,
    /// Header carrying the proxy shared secret
    pub secret_header: String,
    /// Shared secret the proxy must present (supports `env:VAR_NAME`).
    /// When unset, session headers are trusted as-is.
    #[serde(default)]
    pub shared_secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            organization_header: "x-brandhalo-org-id".to_string(),
            user_header: "x-brandhalo-user-id".to_string(),
            secret_header: "x-brandhalo-session-secret".to_string(),
            shared_secret: None,
        }
    }
}

impl SessionConfig {
    /// Resolve the shared secret (expand `env:` references)
    ///
    /// # Errors
    ///
    /// Returns an error if an `env:` reference names an unset or empty variable.
    pub fn resolve_shared_secret(&self) -> Result<Option<String>> {
        let Some(secret) = self.shared_secret.as_ref() else {
            return Ok(None);
        };
        let Some(var_name) = secret.strip_prefix("env:") else {
            return Ok(Some(secret.clone()));
        };
        match env::var(var_name) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            _ => Err(Error::Config(format!(
                "session.shared_secret references unset environment variable {var_name}"
            ))),
        }
    }
}

/// Brand data source configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataConfig {
    /// YAML file mapping organization IDs to brand records
    pub file: Option<PathBuf>,
}

/// Background sweeping of expired codes and tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Enable the sweep (expiry is enforced on read either way)
    pub enabled: bool,
    /// Sweep interval
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(60),
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "10m", "1h", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Env overrides like `BRANDHALO_OAUTH__CODE_TTL=600` arrive as integers
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse(&s).map_err(serde::de::Error::custom),
        }
    }

    /// Parse "100ms", "30s", "10m", "1h", "30d" or a bare number of seconds.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown input or a value that overflows.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            return number(ms).map(Duration::from_millis);
        }
        let (value, unit) = if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else if let Some(days) = s.strip_suffix('d') {
            (days, 86_400)
        } else {
            // Assume seconds
            (s, 1)
        };
        number(value)?
            .checked_mul(unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {s}"))
    }

    fn number(s: &str) -> Result<u64, String> {
        s.parse::<u64>()
            .map_err(|e| format!("invalid duration {s:?}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.oauth.code_ttl, Duration::from_secs(600));
        assert_eq!(config.oauth.access_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.oauth.scopes_supported, vec!["brand:read"]);
        assert!(!config.reaper.enabled);
    }

    #[test]
    fn parses_human_durations() {
        assert_eq!(humantime_serde::parse("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(humantime_serde::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(humantime_serde::parse("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(humantime_serde::parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(humantime_serde::parse("30d").unwrap(), Duration::from_secs(2_592_000));
        assert_eq!(humantime_serde::parse("45").unwrap(), Duration::from_secs(45));
        assert!(humantime_serde::parse("soon").is_err());
    }

    #[test]
    fn overflowing_durations_are_rejected() {
        assert!(humantime_serde::parse("18446744073709551615d").is_err());
        assert!(humantime_serde::parse("18446744073709551615h").is_err());
        assert!(humantime_serde::parse("18446744073709551615s").is_ok());
    }

    #[test]
    fn durations_accept_bare_integers() {
        let config: ReaperConfig = serde_yaml::from_str("interval: 90").unwrap();

        assert_eq!(config.interval, Duration::from_secs(90));
    }

    #[test]
    fn load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(
            &path,
            r#"
server:
  port: 41000
oauth:
  issuer: "https://app.brandhalo.ai"
  access_token_ttl: "15m"
session:
  shared_secret: "proxy-secret"
reaper:
  enabled: true
  interval: "5m"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.server.port, 41000);
        assert_eq!(config.oauth.issuer, "https://app.brandhalo.ai");
        assert_eq!(config.oauth.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.oauth.code_ttl, Duration::from_secs(600));
        assert_eq!(
            config.session.resolve_shared_secret().unwrap().as_deref(),
            Some("proxy-secret")
        );
        assert!(config.reaper.enabled);
        assert_eq!(config.reaper.interval, Duration::from_secs(300));
    }

    #[test]
    fn env_overrides_nested_keys() {
        // GIVEN: a nested key exported with the BRANDHALO_ prefix
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("override.env");
        std::fs::write(&env_path, "BRANDHALO_DATA__FILE=/srv/brand/orgs.yaml\n").unwrap();
        dotenvy::from_path(&env_path).unwrap();

        // WHEN: loading without a file
        let config = Config::load(None).unwrap();

        // THEN: the env value lands in its section
        assert_eq!(
            config.data.file.as_deref(),
            Some(std::path::Path::new("/srv/brand/orgs.yaml"))
        );
    }

    #[test]
    fn load_missing_file_is_error() {
        let result = Config::load(Some(Path::new("/nonexistent/brandhalo.yaml")));

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_issuer() {
        let mut config = Config::default();
        config.oauth.issuer = "not a url".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn shared_secret_resolves_env_reference() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "BRANDHALO_TEST_SESSION_SECRET=from-env-file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            session: SessionConfig {
                shared_secret: Some("env:BRANDHALO_TEST_SESSION_SECRET".to_string()),
                ..SessionConfig::default()
            },
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(
            config.session.resolve_shared_secret().unwrap().as_deref(),
            Some("from-env-file")
        );
    }

    #[test]
    fn unresolved_secret_reference_fails_validation() {
        // GIVEN: a shared secret pointing at a variable nobody sets
        let config = Config {
            session: SessionConfig {
                shared_secret: Some("env:BRANDHALO_TEST_NEVER_SET_SECRET".to_string()),
                ..SessionConfig::default()
            },
            ..Default::default()
        };

        // THEN: the reference never degrades to its own literal text
        assert!(config.session.resolve_shared_secret().is_err());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }
}
