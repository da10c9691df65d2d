use crate::core::errors::{RmsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Per-module runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Stop the loop after this many completed cycles. `None` runs forever.
    pub max_cycles: Option<u64>,
    /// Log a warning when a single gate wait exceeds this many milliseconds.
    /// Needs a tokio runtime with the time driver enabled.
    pub stall_warning_ms: Option<u64>,
    /// Emit a `trace!` line per completed cycle
    pub trace_cycles: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            max_cycles: None,
            stall_warning_ms: None,
            trace_cycles: false,
        }
    }
}

impl ModuleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == Some(0) {
            return Err(RmsError::configuration_field(
                "max_cycles must be greater than 0 when set",
                "max_cycles",
            ));
        }
        if self.stall_warning_ms == Some(0) {
            return Err(RmsError::configuration_field(
                "stall_warning_ms must be greater than 0 when set",
                "stall_warning_ms",
            ));
        }
        Ok(())
    }

    /// Bounded configuration, mostly useful in tests
    pub fn bounded(max_cycles: u64) -> Self {
        Self {
            max_cycles: Some(max_cycles),
            ..Self::default()
        }
    }

    pub fn stall_warning(&self) -> Option<Duration> {
        self.stall_warning_ms.map(Duration::from_millis)
    }
}

/// Configuration for a whole network of modules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Applied to every module without an override
    pub defaults: ModuleConfig,
    /// Per-module overrides keyed by module name
    pub modules: HashMap<String, ModuleConfig>,
    /// Skip the circular-wait check before starting
    pub skip_wiring_check: bool,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        for (name, config) in &self.modules {
            config.validate().map_err(|e| match e {
                RmsError::Configuration { message, .. } => {
                    RmsError::configuration_field(message, format!("modules.{}", name))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Effective configuration for a module
    pub fn for_module(&self, name: &str) -> ModuleConfig {
        self.modules
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RmsError::configuration(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert!(ModuleConfig::default().validate().is_ok());
        assert!(NetworkConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_cycles_rejected() {
        let config = ModuleConfig::bounded(0);
        assert!(matches!(
            config.validate(),
            Err(RmsError::Configuration { field: Some(ref f), .. }) if f == "max_cycles"
        ));
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
defaults:
  stall_warning_ms: 250
modules:
  counter:
    max_cycles: 10
"#;
        let config = NetworkConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.defaults.stall_warning(), Some(Duration::from_millis(250)));
        assert_eq!(config.for_module("counter").max_cycles, Some(10));
        // unspecified fields of an override fall back to the struct default
        assert_eq!(config.for_module("counter").stall_warning_ms, None);
        assert_eq!(config.for_module("other"), config.defaults);
    }

    #[test]
    fn test_missing_file() {
        match NetworkConfig::from_yaml_file("/nonexistent/network.yaml") {
            Err(RmsError::Configuration { message, field }) => {
                assert!(message.contains("/nonexistent/network.yaml"));
                assert_eq!(field, None);
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_stall_timer_is_opt_in() {
        assert_eq!(ModuleConfig::default().stall_warning(), None);
        assert_eq!(ModuleConfig::bounded(3).stall_warning(), None);
    }

    #[test]
    fn test_yaml_invalid_override() {
        let yaml = "modules:\n  bad:\n    max_cycles: 0\n";
        match NetworkConfig::from_yaml_str(yaml) {
            Err(RmsError::Configuration { field, .. }) => {
                assert_eq!(field.as_deref(), Some("modules.bad"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}
