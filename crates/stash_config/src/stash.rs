use config::{builder::DefaultState, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::validation::{validate, ConfigReport};
use crate::{LimitsConfig, OriginConfig, ServerConfig};

pub const DEFAULT_CONFIG_FILE: &str = "stash.toml";
pub const ENV_PREFIX: &str = "STASH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing listen port (use --port or server.port)")]
    MissingPort,

    #[error("missing origin URL (use --origin or origin.url)")]
    MissingOrigin,

    #[error("invalid configuration:\n{0}")]
    Invalid(String),
}

/// Values given on the command line. They win over the file and the
/// environment.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub origin: Option<String>,
}

/// `STASH__SECTION__KEY=value`, numbers parsed.
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

// =======================================================
// STASH CONFIG: main config
// =======================================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StashConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub origin: OriginConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl StashConfig {
    /// Layers, lowest priority first:
    /// 1) `file_name` (TOML, optional)
    /// 2) `STASH__SECTION__KEY` environment variables
    /// 3) CLI overrides
    pub fn load(file_name: &str, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        Self::load_with_env(file_name, env_source(), overrides)
    }

    fn load_with_env(
        file_name: &str,
        env: Environment,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(File::new(file_name, FileFormat::Toml).required(false))
            .add_source(env);

        Self::build(builder, overrides)
    }

    /// Same as [`StashConfig::load`] but from an in-memory TOML document and
    /// without reading the environment.
    pub fn from_toml_str(toml: &str, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let builder =
            config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build(builder, overrides)
    }

    fn build(
        builder: ConfigBuilder<DefaultState>,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let built = builder
            .set_override_option("server.host", overrides.host.clone())?
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .set_override_option("origin.url", overrides.origin.clone())?
            .build()?;

        Ok(built.try_deserialize()?)
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn origin(&self) -> &OriginConfig {
        &self.origin
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// `host:port` to bind.
    pub fn listen_addr(&self) -> Result<String, ConfigError> {
        let port = self.server.port.ok_or(ConfigError::MissingPort)?;
        Ok(format!("{}:{}", self.server.host, port))
    }

    pub fn origin_url(&self) -> Result<&str, ConfigError> {
        self.origin.url().ok_or(ConfigError::MissingOrigin)
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    /// Runs [`StashConfig::validate`] and turns errors into
    /// [`ConfigError::Invalid`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        let report = self.validate();
        if report.has_errors() {
            return Err(ConfigError::Invalid(report.format()));
        }

        for warning in report.warnings() {
            tracing::warn!(target: "stash::config", %warning, "Configuration warning");
        }

        Ok(self)
    }

    pub fn log_summary(&self) {
        info!(
            target: "stash::config",
            host = %self.server.host,
            port = ?self.server.port,
            max_connections = self.server.max_connections,
            "[server]"
        );
        info!(
            target: "stash::config",
            url = ?self.origin.url,
            connect_timeout_secs = self.origin.connect_timeout_secs,
            response_timeout_secs = self.origin.response_timeout_secs,
            pool_max_per_addr = self.origin.pool_max_per_addr,
            pool_idle_timeout_secs = self.origin.pool_idle_timeout_secs,
            "[origin]"
        );
        info!(
            target: "stash::config",
            max_request_body_bytes = self.limits.max_request_body_bytes,
            max_response_body_bytes = self.limits.max_response_body_bytes,
            "[limits]"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{env_source, CliOverrides, ConfigError, StashConfig};
    use std::{env, fs, path::PathBuf};

    const FILE: &str = r#"
[server]
port = 8080
max_connections = 16

[origin]
url = "http://localhost:3000"
response_timeout_secs = 10
"#;

    #[test]
    fn defaults_apply_for_missing_sections() {
        let cfg = StashConfig::from_toml_str("", &CliOverrides::default()).expect("empty ok");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, None);
        assert_eq!(cfg.server.max_connections, 1024);
        assert_eq!(cfg.origin.connect_timeout_secs, 5);
        assert_eq!(cfg.origin.pool_max_per_addr, 32);
        assert_eq!(cfg.origin.pool_idle_timeout_secs, 60);
        assert_eq!(cfg.limits.max_request_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn reads_file_values() {
        let cfg = StashConfig::from_toml_str(FILE, &CliOverrides::default()).expect("file ok");
        assert_eq!(cfg.server.port, Some(8080));
        assert_eq!(cfg.server.max_connections, 16);
        assert_eq!(cfg.origin_url().unwrap(), "http://localhost:3000");
        assert_eq!(cfg.origin.response_timeout_secs, 10);
        assert_eq!(cfg.origin.connect_timeout_secs, 5);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let overrides = CliOverrides {
            host: Some("127.0.0.1".into()),
            port: Some(9090),
            origin: Some("https://example.com".into()),
        };
        let cfg = StashConfig::from_toml_str(FILE, &overrides).expect("file ok");
        assert_eq!(cfg.listen_addr().unwrap(), "127.0.0.1:9090");
        assert_eq!(cfg.origin_url().unwrap(), "https://example.com");
    }

    #[test]
    fn missing_port_and_origin_are_reported() {
        let cfg = StashConfig::from_toml_str("", &CliOverrides::default()).unwrap();
        assert!(matches!(cfg.listen_addr(), Err(ConfigError::MissingPort)));
        assert!(matches!(cfg.origin_url(), Err(ConfigError::MissingOrigin)));
        assert!(matches!(cfg.validated(), Err(ConfigError::Invalid(_))));
    }

    fn write_temp_toml(name: &str, contents: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("{name}-{}.toml", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    fn vars(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_beats_file_and_cli_beats_env() {
        let path = write_temp_toml("stash-layering", FILE);
        let env = vars(&[
            ("STASH__SERVER__PORT", "9000"),
            ("STASH__ORIGIN__URL", "http://from-env:4000"),
            ("STASH__ORIGIN__CONNECT_TIMEOUT_SECS", "7"),
            ("OTHER__SERVER__PORT", "1"),
        ]);

        let from_env = StashConfig::load_with_env(
            path.to_str().unwrap(),
            env_source().source(Some(env.clone())),
            &CliOverrides::default(),
        )
        .unwrap();
        assert_eq!(from_env.server.port, Some(9000));
        assert_eq!(from_env.origin_url().unwrap(), "http://from-env:4000");
        assert_eq!(from_env.origin.connect_timeout_secs, 7);
        // untouched by env: still from the file
        assert_eq!(from_env.server.max_connections, 16);
        assert_eq!(from_env.origin.response_timeout_secs, 10);

        let overrides = CliOverrides {
            host: None,
            port: Some(9100),
            origin: Some("https://from-cli".into()),
        };
        let from_cli = StashConfig::load_with_env(
            path.to_str().unwrap(),
            env_source().source(Some(env)),
            &overrides,
        )
        .unwrap();
        assert_eq!(from_cli.server.port, Some(9100));
        assert_eq!(from_cli.origin_url().unwrap(), "https://from-cli");
        assert_eq!(from_cli.origin.connect_timeout_secs, 7);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = StashConfig::load_with_env(
            "/nonexistent/stash.toml",
            env_source().source(Some(vars(&[("STASH__SERVER__PORT", "8081")]))),
            &CliOverrides::default(),
        )
        .unwrap();
        assert_eq!(cfg.server.port, Some(8081));
        assert_eq!(cfg.server.host, "0.0.0.0");
    }
}
