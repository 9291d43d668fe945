//! # Query Builder
//!
//! Collects the four classification sets of a query and rejects any
//! component classified two different ways.
//!
//! ```rust,ignore
//! let description = QueryBuilder::new()
//!     .include::<Position>()?
//!     .include::<Velocity>()?
//!     .exclude::<Frozen>()?
//!     .build();
//! ```

use archon_core::{component_id, Component, ComponentId, ComponentSet, Phantom};

use crate::description::QueryDescription;
use crate::error::{Classification, QueryError, QueryResult};
use crate::tuple::ComponentTuple;

/// Mutable collector for a query's classification sets.
///
/// No component ever sits in two sets. Builders are reusable: `build`
/// leaves them untouched.
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    include: ComponentSet,
    exclude: ComponentSet,
    at_least_one: ComponentSet,
    exactly_one: ComponentSet,
}

impl QueryBuilder {
    /// Creates a builder with every set empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, classification: Classification) -> &ComponentSet {
        match classification {
            Classification::Include => &self.include,
            Classification::Exclude => &self.exclude,
            Classification::AtLeastOne => &self.at_least_one,
            Classification::ExactlyOne => &self.exactly_one,
        }
    }

    fn set_mut(&mut self, classification: Classification) -> &mut ComponentSet {
        match classification {
            Classification::Include => &mut self.include,
            Classification::Exclude => &mut self.exclude,
            Classification::AtLeastOne => &mut self.at_least_one,
            Classification::ExactlyOne => &mut self.exactly_one,
        }
    }

    fn classify(
        &mut self,
        component: ComponentId,
        attempted: Classification,
    ) -> QueryResult<&mut Self> {
        match self.classification_of(component) {
            Some(existing) if existing != attempted => Err(QueryError::Conflict {
                component,
                existing,
                attempted,
            }),
            Some(_) => Ok(self),
            None => {
                self.set_mut(attempted).insert(component);
                Ok(self)
            }
        }
    }

    /// Requires matching archetypes to contain `C`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if `C` is already classified otherwise.
    pub fn include<C: Component>(&mut self) -> QueryResult<&mut Self> {
        self.include_id(component_id::<C>())
    }

    /// Identifier form of [`QueryBuilder::include`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if the component is already classified otherwise.
    pub fn include_id(&mut self, component: ComponentId) -> QueryResult<&mut Self> {
        self.classify(component, Classification::Include)
    }

    /// Includes every component of a tuple.
    ///
    /// Components are added in declared order; on a conflict the earlier
    /// ones stay included.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] for the first component already
    /// classified otherwise.
    pub fn include_all<Q: ComponentTuple>(&mut self) -> QueryResult<&mut Self> {
        for component in Q::component_ids().iter() {
            self.include_id(*component)?;
        }
        Ok(self)
    }

    /// Rejects archetypes containing `C`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if `C` is already classified otherwise.
    pub fn exclude<C: Component>(&mut self) -> QueryResult<&mut Self> {
        self.exclude_id(component_id::<C>())
    }

    /// Identifier form of [`QueryBuilder::exclude`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if the component is already classified otherwise.
    pub fn exclude_id(&mut self, component: ComponentId) -> QueryResult<&mut Self> {
        self.classify(component, Classification::Exclude)
    }

    /// Adds `C` to the set of which matching archetypes need at least one.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if `C` is already classified otherwise.
    pub fn at_least_one_of<C: Component>(&mut self) -> QueryResult<&mut Self> {
        self.at_least_one_of_id(component_id::<C>())
    }

    /// Identifier form of [`QueryBuilder::at_least_one_of`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if the component is already classified otherwise.
    pub fn at_least_one_of_id(&mut self, component: ComponentId) -> QueryResult<&mut Self> {
        self.classify(component, Classification::AtLeastOne)
    }

    /// Adds `C` to the set of which matching archetypes need exactly one.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if `C` is already classified otherwise.
    pub fn exactly_one_of<C: Component>(&mut self) -> QueryResult<&mut Self> {
        self.exactly_one_of_id(component_id::<C>())
    }

    /// Identifier form of [`QueryBuilder::exactly_one_of`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Conflict`] if the component is already classified otherwise.
    pub fn exactly_one_of_id(&mut self, component: ComponentId) -> QueryResult<&mut Self> {
        self.classify(component, Classification::ExactlyOne)
    }

    /// Checks whether a component is included.
    #[must_use]
    pub fn includes(&self, component: ComponentId) -> bool {
        self.include.contains(component)
    }

    /// Checks whether a component is excluded.
    #[must_use]
    pub fn excludes(&self, component: ComponentId) -> bool {
        self.exclude.contains(component)
    }

    /// Checks whether a component is in the at-least-one set.
    #[must_use]
    pub fn in_at_least_one(&self, component: ComponentId) -> bool {
        self.at_least_one.contains(component)
    }

    /// Checks whether a component is in the exactly-one set.
    #[must_use]
    pub fn in_exactly_one(&self, component: ComponentId) -> bool {
        self.exactly_one.contains(component)
    }

    /// Which set, if any, holds a component.
    #[must_use]
    pub fn classification_of(&self, component: ComponentId) -> Option<Classification> {
        [
            Classification::Include,
            Classification::Exclude,
            Classification::AtLeastOne,
            Classification::ExactlyOne,
        ]
        .into_iter()
        .find(|classification| self.set(*classification).contains(component))
    }

    /// Compiles the sets into an immutable description.
    ///
    /// Tombstoned entities are skipped: [`Phantom`] is excluded unless the
    /// builder classifies it explicitly.
    #[must_use]
    pub fn build(&self) -> QueryDescription {
        let phantom = component_id::<Phantom>();
        let implicit_phantom = self.classification_of(phantom).is_none();

        let exclude = if implicit_phantom {
            let mut exclude = self.exclude.clone();
            exclude.insert(phantom);
            exclude.freeze()
        } else {
            self.exclude.freeze()
        };

        QueryDescription::new(
            self.include.freeze(),
            exclude,
            self.at_least_one.freeze(),
            self.exactly_one.freeze(),
            implicit_phantom,
        )
    }
}

impl From<&QueryDescription> for QueryBuilder {
    fn from(description: &QueryDescription) -> Self {
        let mut exclude = description.exclude_set().thaw();
        if description.has_implicit_phantom() {
            exclude = exclude
                .iter()
                .filter(|id| *id != component_id::<Phantom>())
                .collect();
        }
        Self {
            include: description.include_set().thaw(),
            exclude,
            at_least_one: description.at_least_one_set().thaw(),
            exactly_one: description.exactly_one_set().thaw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use archon_core::{Position, Velocity};

    use super::*;

    #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Frozen(u32);
    impl Component for Frozen {}

    #[test]
    fn test_conflicts_name_both_sides() {
        let mut builder = QueryBuilder::new();
        builder.include::<Position>().unwrap();

        let err = builder.exclude::<Position>().unwrap_err();
        assert_eq!(
            err,
            QueryError::Conflict {
                component: component_id::<Position>(),
                existing: Classification::Include,
                attempted: Classification::Exclude,
            }
        );
        assert!(builder.at_least_one_of::<Position>().is_err());
        assert!(builder.exactly_one_of::<Position>().is_err());
        assert!(!builder.excludes(component_id::<Position>()));
    }

    #[test]
    fn test_repeat_in_same_set_is_noop() {
        let mut builder = QueryBuilder::new();
        builder
            .include::<Position>()
            .unwrap()
            .include::<Position>()
            .unwrap();
        assert!(builder.includes(component_id::<Position>()));
        assert_eq!(builder.build().include_set().len(), 1);
    }

    #[test]
    fn test_build_adds_implicit_phantom() {
        let mut builder = QueryBuilder::new();
        builder.include::<Position>().unwrap();
        let description = builder.build();
        assert!(description.exclude_set().contains(component_id::<Phantom>()));
        // Builder itself is untouched
        assert!(!builder.excludes(component_id::<Phantom>()));
    }

    #[test]
    fn test_explicit_phantom_is_respected() {
        let mut builder = QueryBuilder::new();
        builder.include::<Phantom>().unwrap();
        let description = builder.build();
        assert!(description.include_set().contains(component_id::<Phantom>()));
        assert!(!description.exclude_set().contains(component_id::<Phantom>()));
    }

    #[test]
    fn test_round_trip_through_description() {
        let mut builder = QueryBuilder::new();
        builder
            .include::<Position>()
            .unwrap()
            .exclude::<Frozen>()
            .unwrap()
            .at_least_one_of::<Velocity>()
            .unwrap();

        let description = builder.build();
        let rebuilt = QueryBuilder::from(&description);
        assert!(rebuilt.includes(component_id::<Position>()));
        assert!(rebuilt.excludes(component_id::<Frozen>()));
        assert!(!rebuilt.excludes(component_id::<Phantom>()));
        assert!(rebuilt.in_at_least_one(component_id::<Velocity>()));

        let again = rebuilt.build();
        assert_eq!(again.include_set(), description.include_set());
        assert_eq!(again.exclude_set(), description.exclude_set());
        assert_eq!(again.at_least_one_set(), description.at_least_one_set());
    }

    #[test]
    fn test_include_all_from_tuple() {
        let mut builder = QueryBuilder::new();
        builder.include_all::<(Position, Velocity)>().unwrap();
        assert!(builder.includes(component_id::<Position>()));
        assert!(builder.includes(component_id::<Velocity>()));

        builder.exclude::<Frozen>().unwrap();
        assert!(builder.include_all::<(Frozen,)>().is_err());
    }

    #[test]
    fn test_classification_of() {
        let mut builder = QueryBuilder::new();
        builder.exactly_one_of::<Velocity>().unwrap();
        assert_eq!(
            builder.classification_of(component_id::<Velocity>()),
            Some(Classification::ExactlyOne)
        );
        assert_eq!(builder.classification_of(component_id::<Position>()), None);
        assert!(builder.in_exactly_one(component_id::<Velocity>()));
    }
}
