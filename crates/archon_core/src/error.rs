//! # Storage Error Types
//!
//! All errors that can occur in archetype storage.

use thiserror::Error;

use crate::ecs::{ArchetypeId, ComponentId, EntityId};

/// Errors that can occur in archetype storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The entity is dead, stale, or was never spawned.
    #[error("no such entity: {0:?}")]
    NoSuchEntity(EntityId),

    /// A structural change targeted an archetype held blocked by a raw column scan.
    #[error("archetype {0:?} is blocked for structural changes")]
    ArchetypeBlocked(ArchetypeId),

    /// The component identifier was never handed out by the registry.
    #[error("unknown component: {0:?}")]
    UnknownComponent(ComponentId),

    /// The chunk layout for an archetype could not be computed.
    #[error("invalid chunk layout: {0}")]
    InvalidLayout(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
