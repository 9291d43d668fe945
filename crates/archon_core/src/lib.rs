//! # ARCHON Core Storage
//!
//! Archetype-based columnar storage consumed by the ARCHON query engine:
//! - Entities grouped by their exact component set (archetypes)
//! - Fixed-capacity chunks with one contiguous column per component
//! - A process-wide component registry with stable, ordered identifiers
//!
//! ## Architecture Rules
//!
//! 1. **Columns are contiguous** - One allocation per chunk, 64-byte aligned columns
//! 2. **Swap-remove only** - Removing an entity moves the archetype tail into the hole
//! 3. **Archetypes are never deleted** - The archetype list only grows
//!
//! ## Example
//!
//! ```rust,ignore
//! use archon_core::{EntityBuilder, Position, Velocity, World};
//!
//! let mut world = World::new();
//! let id = world.spawn(
//!     EntityBuilder::new()
//!         .with(Position::new(0.0, 0.0, 0.0))
//!         .with(Velocity::new(1.0, 0.0, 0.0)),
//! )?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::WorldConfig;
pub use ecs::{
    component_id, component_info, Archetype, ArchetypeId, Chunk, ColumnLayout, Component,
    ComponentId, ComponentInfo, ComponentSet, EntityBuilder, EntityId, EntityLocation,
    FrozenComponentSet, Phantom, Position, Velocity, World, WorldId, COLUMN_ALIGN,
};
pub use error::{StorageError, StorageResult};
