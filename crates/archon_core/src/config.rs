//! # World Configuration
//!
//! Storage sizing loaded once at startup, from TOML or code.
//!
//! ```toml
//! chunk_capacity = 256
//! entity_capacity = 100000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Default number of entities per chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 256;

/// Default number of pre-reserved entity slots.
pub const DEFAULT_ENTITY_CAPACITY: usize = 1024;

/// Sizing for a [`World`](crate::World).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entities per chunk. Every archetype allocates chunks of this capacity.
    pub chunk_capacity: usize,
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            entity_capacity: DEFAULT_ENTITY_CAPACITY,
        }
    }
}

impl WorldConfig {
    /// Creates a config with the given chunk capacity and default slot reservation.
    #[must_use]
    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        Self {
            chunk_capacity,
            ..Self::default()
        }
    }

    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> StorageResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| StorageError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if the file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StorageError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if `chunk_capacity` is zero.
    pub fn validate(&self) -> StorageResult<()> {
        if self.chunk_capacity == 0 {
            return Err(StorageError::InvalidConfig(
                "chunk_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
