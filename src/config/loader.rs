//! Configuration loading from disk and command-line overrides.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::cli::Cli;
use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Prefix `http://` onto an endpoint given as bare `host:port`.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

impl ServiceConfig {
    /// Build the effective configuration: file (or defaults), then CLI and
    /// environment overrides, then validation.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => parse_config(&fs::read_to_string(path)?)?,
            None => ServiceConfig::default(),
        };
        config.apply_overrides(cli);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(bind) = &cli.bind {
            self.listener.bind_address = bind.clone();
        }
        if let Some(endpoint) = &cli.otlp_endpoint {
            self.telemetry.otlp_endpoint = endpoint.clone();
        }
        self.telemetry.otlp_endpoint = normalize_endpoint(&self.telemetry.otlp_endpoint);
        if let Some(name) = &cli.service_name {
            self.telemetry.service_name = name.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
        if cli.disable_export {
            self.telemetry.export_enabled = false;
        }
        if cli.self_traffic {
            self.self_traffic.enabled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vessel-{}-{name}.toml", std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("collector:4317"), "http://collector:4317");
        assert_eq!(normalize_endpoint("https://collector:4317"), "https://collector:4317");
        assert_eq!(normalize_endpoint(" http://c:4317 "), "http://c:4317");
    }

    #[test]
    fn test_resolve_without_file_uses_defaults() {
        let config = ServiceConfig::resolve(&Cli::default()).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let path = temp_config(
            "overrides",
            r#"
            [listener]
            bind_address = "127.0.0.1:7000"

            [telemetry]
            service_name = "from-file"
            "#,
        );
        let cli = Cli {
            config: Some(path.clone()),
            otlp_endpoint: Some("collector:4317".into()),
            log_level: Some("debug".into()),
            self_traffic: true,
            ..Default::default()
        };
        let config = ServiceConfig::resolve(&cli).unwrap();
        fs::remove_file(path).ok();

        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.telemetry.service_name, "from-file");
        assert_eq!(config.telemetry.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.logging.level, "debug");
        assert!(config.self_traffic.enabled);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = temp_config("invalid", "[timeouts]\nrequest_secs = 0\n");
        let err = load_config(&path).unwrap_err();
        fs::remove_file(path).ok();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors[0].field, "timeouts.request_secs")
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_parse_error_and_missing_file() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
        let missing = Cli {
            config: Some(PathBuf::from("/nonexistent/vessel.toml")),
            ..Default::default()
        };
        assert!(matches!(ServiceConfig::resolve(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_disable_export_skips_endpoint_validation() {
        let cli = Cli {
            otlp_endpoint: Some("ftp://nowhere".into()),
            disable_export: true,
            ..Default::default()
        };
        let config = ServiceConfig::resolve(&cli).unwrap();
        assert!(!config.telemetry.export_enabled);
    }
}
