//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile the policy tables to surface every invalid range, rule or override
//! - Validate value ranges (window > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::GateConfig;
use crate::policy::snapshot::{PolicyError, PolicySnapshot};

/// Upper bound for the rate-limit window and the sweep interval (one week).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// A single semantic problem in a config file.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidAddress { field: &'static str, value: String },
    InvalidHeader { field: &'static str, value: String },
    ZeroDuration { field: &'static str },
    DurationTooLong { field: &'static str, max_secs: u64 },
    MissingAdminKey,
    Policy(PolicyError),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidAddress { field, value } => {
                write!(f, "{}: invalid socket address {:?}", field, value)
            }
            ValidationError::InvalidHeader { field, value } => {
                write!(f, "{}: invalid header name {:?}", field, value)
            }
            ValidationError::ZeroDuration { field } => write!(f, "{} must be greater than zero", field),
            ValidationError::DurationTooLong { field, max_secs } => {
                write!(f, "{} must be at most {} seconds", field, max_secs)
            }
            ValidationError::MissingAdminKey => write!(f, "admin.api_key must be set when admin is enabled"),
            ValidationError::Policy(e) => write!(f, "policy: {}", e),
        }
    }
}

/// Validate a parsed configuration, policy tables included.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = setting_errors(config);
    if let Err(policy_errors) = PolicySnapshot::compile(&config.policy) {
        errors.extend(policy_errors.into_iter().map(ValidationError::Policy));
    }
    into_result(errors)
}

/// Validate everything except the `[policy]` tables. Those are checked when
/// the policy store compiles them, so a bad table leaves the gate failing
/// closed instead of refusing to start.
pub fn validate_settings(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    into_result(setting_errors(config))
}

fn into_result(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn setting_errors(config: &GateConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        }
    }

    check_header(&mut errors, "gate.forwarded_header", &config.gate.forwarded_header);
    if let Some(header) = &config.gate.roles_header {
        check_header(&mut errors, "gate.roles_header", header);
    }

    check_duration(&mut errors, "gate.window_secs", config.gate.window_secs);
    check_duration(&mut errors, "gate.sweep_interval_secs", config.gate.sweep_interval_secs);
    check_duration(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    errors
}

fn check_duration(errors: &mut Vec<ValidationError>, field: &'static str, secs: u64) {
    if secs == 0 {
        errors.push(ValidationError::ZeroDuration { field });
    } else if secs > MAX_INTERVAL_SECS {
        errors.push(ValidationError::DurationTooLong {
            field,
            max_secs: MAX_INTERVAL_SECS,
        });
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

fn check_header(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if HeaderName::from_bytes(value.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader {
            field,
            value: value.to_string(),
        });
    }
}
