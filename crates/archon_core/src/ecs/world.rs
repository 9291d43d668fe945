//! # ECS World
//!
//! The central container for all archetypes and entities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::archetype::{Archetype, ArchetypeId};
use super::component::{component_id, Component, ComponentId};
use super::component_set::FrozenComponentSet;
use super::entity::{EntityBuilder, EntityId, EntityLocation};
use crate::config::WorldConfig;
use crate::error::{StorageError, StorageResult};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier of a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

impl WorldId {
    fn next() -> Self {
        Self(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: u32,
    location: Option<EntityLocation>,
}

/// The ECS World - owns every archetype and the entity slot table.
///
/// Archetypes are created on demand and never removed, so an
/// [`ArchetypeId`] stays valid for the world's lifetime and
/// `archetype_count()` only grows.
///
/// # Example
///
/// ```rust,ignore
/// let mut world = World::new();
/// let id = world.spawn(EntityBuilder::new().with(Position::new(1.0, 2.0, 3.0)))?;
/// assert_eq!(world.get::<Position>(id).map(|p| p.x), Some(1.0));
/// ```
pub struct World {
    id: WorldId,
    config: WorldConfig,
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<FrozenComponentSet, ArchetypeId>,
    /// Entity slots, indexed by `EntityId::index`.
    slots: Vec<Slot>,
    /// Free list of slot indices for reuse.
    free_indices: Vec<u32>,
    /// Number of currently alive entities.
    alive_count: usize,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Creates a world from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if the configuration is invalid.
    pub fn with_config(config: WorldConfig) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        Self {
            id: WorldId::next(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            slots: Vec::with_capacity(config.entity_capacity),
            free_indices: Vec::new(),
            alive_count: 0,
            config,
        }
    }

    /// This world's process-unique identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Configuration the world was created with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Number of archetypes created so far.
    #[inline]
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes, indexed by [`ArchetypeId::index`].
    #[inline]
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// One archetype by ID.
    #[inline]
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Returns the archetype for a component set, creating it if needed.
    ///
    /// `components` may be in any order.
    ///
    /// # Errors
    ///
    /// Fails if a component is unregistered or its layout is unsupported.
    pub fn archetype_for(&mut self, components: &[ComponentId]) -> StorageResult<ArchetypeId> {
        let signature = FrozenComponentSet::from_ids(components);
        if let Some(id) = self.archetype_index.get(signature.as_slice()) {
            return Ok(*id);
        }

        let raw = u32::try_from(self.archetypes.len())
            .map_err(|_| StorageError::InvalidLayout("archetype limit reached".into()))?;
        let id = ArchetypeId::new(raw);
        let archetype = Archetype::new(id, signature.clone(), self.config.chunk_capacity)?;
        tracing::debug!(
            archetype = raw,
            components = ?signature.as_slice(),
            "created archetype"
        );
        self.archetypes.push(archetype);
        self.archetype_index.insert(signature, id);
        Ok(id)
    }

    /// Spawns an entity with the builder's components.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ArchetypeBlocked`] if the target archetype is
    /// blocked, or a layout error if its archetype cannot be created.
    pub fn spawn(&mut self, builder: EntityBuilder) -> StorageResult<EntityId> {
        let archetype_id = self.archetype_for(builder.component_ids())?;
        let archetype = &mut self.archetypes[archetype_id.index()];
        if archetype.is_blocked() {
            return Err(StorageError::ArchetypeBlocked(archetype_id));
        }

        let entity = if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            // Increment generation to invalidate old references
            slot.generation = slot.generation.wrapping_add(1);
            EntityId::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len())
                .map_err(|_| StorageError::InvalidLayout("entity slots exhausted".into()))?;
            self.slots.push(Slot::default());
            EntityId::new(index, 0)
        };

        let (chunk, row) = archetype.push(entity, &builder);
        self.slots[entity.index() as usize].location = Some(EntityLocation {
            archetype: archetype_id,
            chunk,
            row,
        });
        self.alive_count += 1;
        Ok(entity)
    }

    /// Spawns one entity per builder, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Propagates the first [`World::spawn`] error. Entities spawned before
    /// the failure stay alive.
    pub fn spawn_batch<I>(&mut self, builders: I) -> StorageResult<Vec<EntityId>>
    where
        I: IntoIterator<Item = EntityBuilder>,
    {
        let builders = builders.into_iter();
        let mut spawned = Vec::with_capacity(builders.size_hint().0);
        for builder in builders {
            spawned.push(self.spawn(builder)?);
        }
        Ok(spawned)
    }

    /// Despawns an entity, freeing its slot for reuse.
    ///
    /// The archetype's last entity moves into the freed row.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoSuchEntity`] for dead or stale IDs and
    /// [`StorageError::ArchetypeBlocked`] while its archetype is blocked.
    pub fn despawn(&mut self, id: EntityId) -> StorageResult<()> {
        let location = self.location(id).ok_or(StorageError::NoSuchEntity(id))?;
        let archetype = &mut self.archetypes[location.archetype.index()];
        if archetype.is_blocked() {
            return Err(StorageError::ArchetypeBlocked(location.archetype));
        }

        if let Some(moved) = archetype.swap_remove(location.chunk, location.row) {
            self.slots[moved.index() as usize].location = Some(location);
        }
        self.slots[id.index() as usize].location = None;
        self.free_indices.push(id.index());
        self.alive_count -= 1;
        Ok(())
    }

    /// Checks if an entity is alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.location(id).is_some()
    }

    /// Number of alive entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.alive_count
    }

    /// Checks if no entity is alive.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alive_count == 0
    }

    /// Where a live entity is stored.
    #[must_use]
    pub fn location(&self, id: EntityId) -> Option<EntityLocation> {
        if id.is_null() {
            return None;
        }
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.location
    }

    /// Reads one component of a live entity.
    #[must_use]
    pub fn get<C: Component>(&self, id: EntityId) -> Option<&C> {
        let location = self.location(id)?;
        self.archetypes[location.archetype.index()]
            .column::<C>(location.chunk)?
            .get(location.row)
    }

    /// Mutably borrows one component of a live entity.
    #[must_use]
    pub fn get_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        let location = self.location(id)?;
        self.archetypes[location.archetype.index()]
            .column_mut::<C>(location.chunk)?
            .get_mut(location.row)
    }

    /// Checks whether a live entity has component `C`.
    #[must_use]
    pub fn has<C: Component>(&self, id: EntityId) -> bool {
        self.location(id)
            .is_some_and(|l| self.archetypes[l.archetype.index()].has(component_id::<C>()))
    }
}
