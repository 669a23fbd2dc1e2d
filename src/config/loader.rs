//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GateConfig;
use crate::config::validation::{validate_config, validate_settings, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GateConfig, ConfigError> {
    let config: GateConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse configuration from TOML text, validating everything except the
/// policy tables. The policy store reports policy errors on its own.
pub fn parse_settings(content: &str) -> Result<GateConfig, ConfigError> {
    let config: GateConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_settings(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// File counterpart of [`parse_settings`].
pub fn load_settings(path: &Path) -> Result<GateConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_settings(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[policy.ranges]]
            id = "lan"
            cidr = "192.168.0.0/16"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.policy.ranges[0].cidr, "192.168.0.0/16");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_invalid_policy_is_validation_error() {
        let err = parse_config(
            r#"
            [[policy.overrides]]
            target = "not-an-ip"
            ceiling = 5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("not-an-ip"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../../netgate.example.toml")).unwrap();
        assert_eq!(config.policy.ranges.len(), 2);
        assert_eq!(config.policy.rules[1].required_roles, vec!["admin".to_string()]);
        assert_eq!(config.policy.rate_limit.categories.get("search"), Some(&0.5));
        assert_eq!(config.gate.roles_header.as_deref(), Some("x-auth-roles"));
        assert!(config.admin.enabled);
    }

    #[test]
    fn test_settings_load_keeps_invalid_policy_for_the_store() {
        let text = r#"
            [gate]
            window_secs = 9223372036854775807
            "#;
        assert!(matches!(parse_settings(text), Err(ConfigError::Validation(_))));

        let text = r#"
            [[policy.ranges]]
            id = "bad"
            cidr = "10.0.0.0/99"
            "#;
        let config = parse_settings(text).unwrap();
        assert_eq!(config.policy.ranges[0].cidr, "10.0.0.0/99");
        assert!(parse_config(text).is_err());
    }
}
