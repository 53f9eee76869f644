//! Beamlink CLI configuration
//!
//! Loaded from a TOML file when `--config` is given, defaults otherwise. Every
//! section is optional; a partial file only overrides what it names.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use beamlink_core::{BluetoothAddress, DispatchConfig, LinkConfig, LocalCarrier};

use crate::error::{CliError, Result};

/// Address used when the configuration names none
pub const DEFAULT_LOCAL_ADDRESS: &str = "02:00:00:00:00:01";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// This device's carrier address (AA:BB:CC:DD:EE:FF)
    pub local_address: String,
    pub local_name: String,
    /// Link manager timing and services
    pub link: LinkConfig,
    /// Inbound dispatch policy
    pub dispatch: DispatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            local_address: DEFAULT_LOCAL_ADDRESS.to_string(),
            local_name: "beamlink".to_string(),
            link: LinkConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        debug!("Read configuration from {}", path.as_ref().display());
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        self.local_address()?;
        if self.local_name.is_empty() {
            return Err(CliError::Config("local_name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn local_address(&self) -> Result<BluetoothAddress> {
        Ok(self.local_address.parse()?)
    }

    /// Powered-on carrier at the configured address
    pub fn local_carrier(&self) -> Result<LocalCarrier> {
        Ok(LocalCarrier::new(self.local_address()?, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.local_address().unwrap().to_string(),
            DEFAULT_LOCAL_ADDRESS
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            local_address = "AA:BB:CC:DD:EE:FF"
            local_name = "kitchen"
            "#,
        )
        .unwrap();
        assert_eq!(config.local_name, "kitchen");
        assert_eq!(config.link, LinkConfig::default());
        assert_eq!(config.local_carrier().unwrap().address.as_bytes()[0], 0xAA);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let result = AppConfig::from_toml_str(r#"local_address = "not-an-address""#);
        assert!(matches!(result, Err(CliError::Beamlink(_))));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = AppConfig::default();
        config.link = config.link.with_wait_for_link(Duration::from_millis(750));
        let encoded = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&encoded).unwrap(), config);
    }
}
