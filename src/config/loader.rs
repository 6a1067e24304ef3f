//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
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

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [listener]
        bind_address = "127.0.0.1:0"

        [timeouts]
        request_secs = 5

        [not_found]
        status = 404
        body = "nothing here"

        [[routes]]
        name = "api"
        path = "/api/"
        methods = ["GET", "HEAD"]
        body = "api root"

        [[routes]]
        name = "health"
        path = "/healthz"
        exact = true
        status = 204
    "#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:0");
        assert_eq!(config.timeouts.request_secs, 5);
        assert_eq!(config.timeouts.drain_secs, 10);
        assert_eq!(config.routes.len(), 2);

        let api = &config.routes[0];
        assert_eq!(api.methods, vec!["GET", "HEAD"]);
        assert_eq!(api.response.status, 200);
        assert_eq!(api.response.body, "api root");

        let health = &config.routes[1];
        assert!(health.exact);
        assert_eq!(health.response.status, 204);
        assert_eq!(config.not_found.unwrap().body, "nothing here");
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = parse_config("[timeouts]\nrequest_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("request_secs"));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_config("routes = 7"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/muxd.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
