//! # Query Error Types
//!
//! All errors that can occur while building or executing queries.

use std::fmt;

use archon_core::{ArchetypeId, ComponentId};
use thiserror::Error;

/// The four mutually exclusive ways a query can classify a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Matching archetypes must contain the component.
    Include,
    /// Matching archetypes must not contain the component.
    Exclude,
    /// Matching archetypes must contain at least one component of this set.
    AtLeastOne,
    /// Matching archetypes must contain exactly one component of this set.
    ExactlyOne,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
            Self::AtLeastOne => "at_least_one_of",
            Self::ExactlyOne => "exactly_one_of",
        })
    }
}

/// How a column split into whole vectors plus a scalar remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneCoverage {
    /// Whole vectors.
    pub vectors: usize,
    /// Scalars left over after the whole vectors.
    pub leftover: usize,
}

impl fmt::Display for LaneCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vectors + {} leftover", self.vectors, self.leftover)
    }
}

/// Errors that can occur in the query engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The component is already classified differently in this builder.
    #[error("component {component:?} is already in {existing}, cannot add it with {attempted}")]
    Conflict {
        /// Offending component.
        component: ComponentId,
        /// Classification it already has.
        existing: Classification,
        /// Classification the caller tried to add.
        attempted: Classification,
    },

    /// Two columns of the same chunk split into different lane counts.
    #[error(
        "lane coverage mismatch in archetype {archetype:?}: \
         component {component:?} has {found}, expected {expected}"
    )]
    LaneCoverageMismatch {
        /// Archetype being walked.
        archetype: ArchetypeId,
        /// Column that disagreed with the first one.
        component: ComponentId,
        /// Coverage of the first column.
        expected: LaneCoverage,
        /// Coverage of the disagreeing column.
        found: LaneCoverage,
    },

    /// The component's size is not a multiple of the vector scalar size.
    #[error("component {component:?} ({size} bytes) is not a whole number of {scalar_size}-byte scalars")]
    ScalarMismatch {
        /// Offending component.
        component: ComponentId,
        /// Component size in bytes.
        size: usize,
        /// Scalar size in bytes.
        scalar_size: usize,
    },

    /// bytemuck rejected a column reinterpretation.
    #[error("cannot reinterpret column of component {component:?}: {reason}")]
    Reinterpret {
        /// Offending component.
        component: ComponentId,
        /// Why the cast failed.
        reason: bytemuck::PodCastError,
    },
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
