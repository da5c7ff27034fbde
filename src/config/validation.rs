//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates finite and positive)
//! - Validate addresses parse as socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Individual routes are not validated here: a malformed route is skipped
//!   by the route compiler so one bad entry never rejects a whole file

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("rate_limit.requests_per_second must be a positive finite number, got {0}")]
    InvalidRate(f64),

    #[error("rate_limit.burst_size must be at least 1")]
    InvalidBurst,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyApiKey,
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    let rate_limit = &config.rate_limit;
    if !(rate_limit.requests_per_second.is_finite() && rate_limit.requests_per_second > 0.0) {
        errors.push(ValidationError::InvalidRate(rate_limit.requests_per_second));
    }
    if rate_limit.burst_size == 0 {
        errors.push(ValidationError::InvalidBurst);
    }
    if rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroDuration("rate_limit.sweep_interval_secs"));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.upstream_secs", timeouts.upstream_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(field));
        }
    }

    if config.watcher.enabled && config.watcher.debounce_ms == 0 {
        errors.push(ValidationError::ZeroDuration("watcher.debounce_ms"));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::EmptyApiKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.rate_limit.requests_per_second = f64::NAN;
        config.rate_limit.burst_size = 0;
        config.timeouts.upstream_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidBurst));
        assert!(errors.contains(&ValidationError::ZeroDuration("timeouts.upstream_secs")));
    }

    #[test]
    fn admin_checks_only_apply_when_enabled() {
        let mut config = GatewayConfig::default();
        config.admin.api_key = String::new();
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::EmptyApiKey])
        );
    }
}
