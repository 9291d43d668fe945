//! # Entity Component Storage
//!
//! Archetype storage with chunked columns.
//!
//! ## Design Philosophy
//!
//! - Entities with the same component set share an archetype
//! - Each archetype stores entities in fixed-capacity chunks
//! - Each chunk holds one contiguous, 64-byte aligned column per component
//! - Entity IDs are simple indices with generation counters

pub mod archetype;
pub mod chunk;
pub mod component;
pub mod component_set;
mod entity;
mod world;

pub use archetype::{Archetype, ArchetypeId, ColumnLayout};
pub use chunk::{Chunk, COLUMN_ALIGN};
pub use component::{
    component_id, component_info, Component, ComponentId, ComponentInfo, Phantom, Position,
    Velocity,
};
pub use component_set::{ComponentSet, FrozenComponentSet};
pub use entity::{EntityBuilder, EntityId, EntityLocation};
pub use world::{World, WorldId};
