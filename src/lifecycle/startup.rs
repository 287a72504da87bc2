//! Startup configuration assembly.
//!
//! File values are loaded first, command-line overrides are applied on top,
//! and the merged result is validated once.

use std::path::Path;

use crate::config::{read_config, validate_config, ConfigError, ProxyConfig};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}

/// Build the effective configuration.
///
/// Without a path the defaults are used.
pub fn build_config(path: Option<&Path>, overrides: &Overrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(addr) = &overrides.bind_address {
        config.listener.bind_address = addr.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = build_config(None, &Overrides::default()).unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn overrides_beat_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nbind_address = \"127.0.0.1:3128\"\n[observability]\nlog_level = \"warn\""
        )
        .unwrap();

        let overrides = Overrides {
            bind_address: Some("127.0.0.1:8888".into()),
            log_level: None,
        };
        let config = build_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8888");
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[observability]\nlog_level = \"loud\"").unwrap();

        let err = build_config(Some(file.path()), &Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }

    #[test]
    fn cli_level_repairs_invalid_file_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[observability]\nlog_level = \"loud\"").unwrap();

        let overrides = Overrides {
            bind_address: None,
            log_level: Some("debug".into()),
        };
        let config = build_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = Overrides {
            bind_address: Some("nope".into()),
            log_level: None,
        };
        let err = build_config(None, &overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
