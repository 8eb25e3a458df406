use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root configuration for a bookmark library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Optional name for this library.
    #[serde(default)]
    pub name: Option<String>,

    /// The fast, on-device store.
    #[serde(default)]
    pub local: Option<StoreConfig>,

    /// The slow, network-backed store.
    #[serde(default)]
    pub remote: Option<StoreConfig>,

    /// Reconciliation settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// SQLite database file.
    Sqlite(SqliteStoreConfig),
    /// Process-local store, lost on exit.
    Memory(MemoryStoreConfig),
}

impl StoreConfig {
    /// Short name of the store type, as written in YAML.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreConfig::Sqlite(_) => "sqlite",
            StoreConfig::Memory(_) => "memory",
        }
    }

    /// Simulated per-request latency, if any.
    pub fn latency(&self) -> Option<HumanDuration> {
        match self {
            StoreConfig::Sqlite(c) => c.latency.clone(),
            StoreConfig::Memory(c) => c.latency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: String,

    /// Artificial delay before every request (remote only).
    #[serde(default)]
    pub latency: Option<HumanDuration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryStoreConfig {
    /// Prefix for generated record identifiers.
    #[serde(default)]
    pub id_prefix: Option<String>,

    /// Artificial delay before every request (remote only).
    #[serde(default)]
    pub latency: Option<HumanDuration>,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    /// Apply passes allowed before a sync gives up.
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,

    /// Run a sync right after the library opens.
    #[serde(default)]
    pub on_open: bool,
}

fn default_max_passes() -> u32 {
    3
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_passes: default_max_passes(),
            on_open: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter level (`error`, `warn`, `info`, `debug`, `trace`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Human-readable duration (e.g., "50ms", "5s", "1h").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HumanDuration(pub std::time::Duration);

impl HumanDuration {
    pub fn as_duration(&self) -> std::time::Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
            (n, "ms")
        } else if let Some(n) = s.strip_suffix('s') {
            (n, "s")
        } else if let Some(n) = s.strip_suffix('m') {
            (n, "m")
        } else if let Some(n) = s.strip_suffix('h') {
            (n, "h")
        } else if let Some(n) = s.strip_suffix('d') {
            (n, "d")
        } else {
            return Err(format!("Invalid duration format: {}", s));
        };

        let num: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => std::time::Duration::from_millis(num),
            "s" => std::time::Duration::from_secs(num),
            "m" => std::time::Duration::from_secs(num * 60),
            "h" => std::time::Duration::from_secs(num * 3600),
            _ => std::time::Duration::from_secs(num * 86400),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let millis = self.0.as_millis();

        if millis < 1000 || millis % 1000 != 0 {
            write!(f, "{}ms", millis)
        } else if secs < 60 || secs % 60 != 0 {
            write!(f, "{}s", secs)
        } else if secs < 3600 || secs % 3600 != 0 {
            write!(f, "{}m", secs / 60)
        } else if secs < 86400 || secs % 86400 != 0 {
            write!(f, "{}h", secs / 3600)
        } else {
            write!(f, "{}d", secs / 86400)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}
