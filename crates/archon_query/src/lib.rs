//! # ARCHON Query Engine
//!
//! Declarative queries over `archon_core` archetype storage:
//! - A builder that sorts components into four mutually exclusive sets
//! - Immutable descriptions that cache their matching archetypes
//! - Execution per entity, per chunk, across threads, or as SIMD lanes
//!
//! ## Architecture Rules
//!
//! 1. **Descriptions are immutable** - Only the match cache changes after `build`
//! 2. **Caches only grow** - Archetypes are never removed, so a watermark suffices
//! 3. **Walks go backwards** - Swap-remove during iteration never skips an entity
//!
//! ## Example
//!
//! ```rust,ignore
//! use archon_query::QueryBuilder;
//! use archon_core::{Position, Velocity};
//!
//! let mut builder = QueryBuilder::new();
//! builder.include::<Position>()?.include::<Velocity>()?;
//! let movers = builder.build();
//!
//! movers.run(&mut world).for_each::<(Position, Velocity), _>(|_, (pos, vel)| {
//!     pos.x += vel.x;
//! });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod builder;
pub mod chunk_handle;
pub mod description;
pub mod error;
pub mod execute;
pub mod lanes;
pub mod tuple;
pub mod vectorize;

pub use builder::QueryBuilder;
pub use chunk_handle::ChunkHandle;
pub use description::{ArchetypeMatch, MatchList, QueryDescription};
pub use error::{Classification, LaneCoverage, QueryError, QueryResult};
pub use execute::{Execution, Row};
pub use lanes::{
    F32x4, F32x8, F64x2, F64x4, I32x4, I32x8, LaneInfo, NativeF32, SimdVector, U32x4, U32x8,
};
pub use tuple::{ComponentTuple, MAX_ARITY};
pub use vectorize::LaneBatch;
