mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Invalid {0} store: {1}")]
    InvalidStore(String, String),

    #[error("Local and remote stores share the same file: {0}")]
    SharedStorePath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LibraryConfig {
    /// Parse a library configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;

        // An empty document means "all defaults".
        if interpolated.trim().is_empty() {
            return Ok(LibraryConfig::default());
        }

        let config: LibraryConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a library configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
name: reading-list
local:
  type: sqlite
  path: ./library.db
"#;

        let config = LibraryConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, Some("reading-list".to_string()));
        assert!(matches!(
            config.local,
            Some(StoreConfig::Sqlite(ref s)) if s.path == "./library.db"
        ));
        assert!(config.remote.is_none());
        assert_eq!(config.sync.max_passes, 3);
    }

    #[test]
    fn test_parse_full_config() {
        std::env::set_var("HIPSTA_TEST_ROOT", "/tmp/hipsta-root");

        let yaml = r#"
name: full
local:
  type: sqlite
  path: ${HIPSTA_TEST_ROOT}/library.db
remote:
  type: memory
  id_prefix: CK
  latency: 25ms
sync:
  max_passes: 5
  on_open: true
logging:
  level: debug
"#;

        let config = LibraryConfig::from_yaml(yaml).unwrap();
        match &config.local {
            Some(StoreConfig::Sqlite(s)) => assert_eq!(s.path, "/tmp/hipsta-root/library.db"),
            other => panic!("Expected sqlite local store, got {:?}", other),
        }
        match &config.remote {
            Some(StoreConfig::Memory(m)) => {
                assert_eq!(m.id_prefix.as_deref(), Some("CK"));
                assert_eq!(
                    m.latency.as_ref().map(|l| l.as_duration()),
                    Some(Duration::from_millis(25))
                );
            }
            other => panic!("Expected memory remote store, got {:?}", other),
        }
        assert_eq!(config.sync.max_passes, 5);
        assert!(config.sync.on_open);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_empty_document() {
        let config = LibraryConfig::from_yaml("  \n").unwrap();
        assert!(config.local.is_none());
        assert_eq!(config.sync.max_passes, 3);
    }

    #[test]
    fn test_parse_unknown_store_type() {
        let yaml = r#"
local:
  type: cloudkit
"#;
        assert!(matches!(
            LibraryConfig::from_yaml(yaml),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("hipsta-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hipsta.yaml");
        std::fs::write(&path, "name: on-disk\n").unwrap();

        let config = LibraryConfig::from_file(&path).unwrap();
        assert_eq!(config.name.as_deref(), Some("on-disk"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
