use crate::types::{LibraryConfig, MemoryStoreConfig, StoreConfig};

impl LibraryConfig {
    /// Fill in missing stores and identifier prefixes.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        if self.local.is_none() {
            self.local = Some(StoreConfig::Memory(MemoryStoreConfig {
                id_prefix: Some("L".to_string()),
                latency: None,
            }));
        }
        if self.remote.is_none() {
            self.remote = Some(StoreConfig::Memory(MemoryStoreConfig {
                id_prefix: Some("R".to_string()),
                latency: None,
            }));
        }

        // Memory stores without a prefix get one from their side, so ids
        // from the two stores never look alike.
        if let Some(StoreConfig::Memory(ref mut m)) = self.local {
            m.id_prefix.get_or_insert_with(|| "L".to_string());
        }
        if let Some(StoreConfig::Memory(ref mut m)) = self.remote {
            m.id_prefix.get_or_insert_with(|| "R".to_string());
        }

        self.logging.level = self.logging.level.trim().to_lowercase();
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> LibraryConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}
