//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, status codes, addresses)
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, Method, StatusCode};
use thiserror::Error;

use crate::config::schema::{ServerConfig, StaticResponse};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address {value:?}")]
    Address { field: &'static str, value: String },

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("duplicate route name {0:?}")]
    DuplicateRoute(String),

    #[error("route {route:?}: invalid status code {status}")]
    Status { route: String, status: u16 },

    #[error("route {route:?}: invalid method {method:?}")]
    Method { route: String, method: String },

    #[error("route {route:?}: invalid header name {header:?}")]
    Header { route: String, header: String },
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if let Some(response) = &config.not_found {
        check_status("not_found", response, &mut errors);
    }

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        check_status(&route.name, &route.response, &mut errors);
        for method in &route.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::Method {
                    route: route.name.clone(),
                    method: method.clone(),
                });
            }
        }
        if let Some(header) = &route.require_header {
            if HeaderName::from_bytes(header.as_bytes()).is_err() {
                errors.push(ValidationError::Header {
                    route: route.name.clone(),
                    header: header.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_status(route: &str, response: &StaticResponse, errors: &mut Vec<ValidationError>) {
    if StatusCode::from_u16(response.status).is_err() {
        errors.push(ValidationError::Status {
            route: route.to_string(),
            status: response.status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(name: &str) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            path: "/".into(),
            exact: false,
            methods: Vec::new(),
            require_header: None,
            priority: 0,
            response: StaticResponse {
                status: 200,
                body: String::new(),
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.request_secs = 0;

        let mut bad = route("a");
        bad.response.status = 42;
        bad.methods = vec!["GE T".into()];
        bad.require_header = Some("bad header".into());
        config.routes = vec![bad, route("a")];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::ZeroRequestTimeout));
        assert!(errors.contains(&ValidationError::DuplicateRoute("a".into())));
        assert!(errors.contains(&ValidationError::Status {
            route: "a".into(),
            status: 42
        }));
    }
}
