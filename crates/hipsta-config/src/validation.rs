use crate::types::{LibraryConfig, StoreConfig};
use crate::ConfigError;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];

impl LibraryConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (side, store) in [("local", &self.local), ("remote", &self.remote)] {
            if let Some(StoreConfig::Sqlite(s)) = store {
                if s.path.trim().is_empty() {
                    errors.push(ConfigError::InvalidStore(
                        side.to_string(),
                        "sqlite path must not be empty".to_string(),
                    ));
                }
            }
            if let Some(StoreConfig::Memory(m)) = store {
                if m.id_prefix.as_deref().is_some_and(|p| p.trim().is_empty()) {
                    errors.push(ConfigError::InvalidStore(
                        side.to_string(),
                        "id_prefix must not be empty".to_string(),
                    ));
                }
            }
        }

        if side_latency(&self.local).is_some() {
            errors.push(ConfigError::InvalidStore(
                "local".to_string(),
                "latency is only supported on the remote store".to_string(),
            ));
        }

        // Both sides on one file would make every record its own linkage.
        if let (Some(StoreConfig::Sqlite(l)), Some(StoreConfig::Sqlite(r))) =
            (&self.local, &self.remote)
        {
            if !l.path.is_empty() && l.path == r.path {
                errors.push(ConfigError::SharedStorePath(l.path.clone()));
            }
        }

        if self.sync.max_passes == 0 {
            errors.push(ConfigError::InvalidConfig(
                "sync.max_passes must be at least 1".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigError::InvalidConfig(format!(
                "Unknown logging.level '{}'",
                self.logging.level
            )));
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn side_latency(store: &Option<StoreConfig>) -> Option<crate::HumanDuration> {
    store.as_ref().and_then(|s| s.latency())
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn test_validate_default_config() {
        assert!(LibraryConfig::default().validate().is_empty());
    }

    #[test]
    fn test_validate_zero_passes() {
        let yaml = r#"
sync:
  max_passes: 0
"#;
        let config = LibraryConfig::from_yaml(yaml).unwrap();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("max_passes"));
    }

    #[test]
    fn test_validate_shared_path() {
        let yaml = r#"
local:
  type: sqlite
  path: /tmp/same.db
remote:
  type: sqlite
  path: /tmp/same.db
"#;
        let config = LibraryConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.validate_or_err(),
            Err(ConfigError::SharedStorePath(p)) if p == "/tmp/same.db"
        ));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let yaml = r#"
local:
  type: sqlite
  path: ""
  latency: 10ms
logging:
  level: loud
"#;
        let config = LibraryConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.validate().len(), 3);
    }
}
