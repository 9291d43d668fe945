//! # Query Engine Integration Tests
//!
//! Drives matching, caching and every execution form against real worlds.
//!
//! Run with: cargo test -p archon_query --test query_engine_test

use std::collections::HashSet;

use archon_core::{
    component_id, ArchetypeId, Component, ComponentId, EntityBuilder, EntityId, Phantom, Position,
    Velocity, World, WorldConfig,
};
use archon_query::{
    F32x8, LaneInfo, NativeF32, QueryBuilder, QueryDescription, QueryError, SimdVector,
};
use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

macro_rules! tags {
    ($($name:ident),+) => {
        $(
            #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
            #[repr(C)]
            struct $name(u32);
            impl Component for $name {}
        )+
    };
}

tags!(T0, T1, T2, T3, T4, T5, T6, T7);

const POOL: usize = 8;

fn pool() -> [ComponentId; POOL] {
    [
        component_id::<T0>(),
        component_id::<T1>(),
        component_id::<T2>(),
        component_id::<T3>(),
        component_id::<T4>(),
        component_id::<T5>(),
        component_id::<T6>(),
        component_id::<T7>(),
    ]
}

fn ids_of(mask: u8) -> Vec<ComponentId> {
    let pool = pool();
    (0..POOL)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| pool[bit])
        .collect()
}

/// Bitmask form of a query, checked by brute force.
#[derive(Clone, Copy, Debug)]
struct MaskQuery {
    include: u8,
    exclude: u8,
    at_least_one: u8,
    exactly_one: u8,
}

impl MaskQuery {
    fn random(rng: &mut StdRng) -> Self {
        let mut query = Self {
            include: 0,
            exclude: 0,
            at_least_one: 0,
            exactly_one: 0,
        };
        for bit in 0..POOL {
            let flag = 1u8 << bit;
            match rng.gen_range(0..6) {
                0 => query.include |= flag,
                1 => query.exclude |= flag,
                2 => query.at_least_one |= flag,
                3 => query.exactly_one |= flag,
                _ => {}
            }
        }
        query
    }

    fn matches(&self, mask: u8) -> bool {
        mask & self.include == self.include
            && mask & self.exclude == 0
            && (self.at_least_one == 0 || mask & self.at_least_one != 0)
            && (self.exactly_one == 0 || (mask & self.exactly_one).count_ones() == 1)
    }

    fn describe(&self) -> QueryDescription {
        let pool = pool();
        let mut builder = QueryBuilder::new();
        for (bit, id) in pool.iter().enumerate() {
            let flag = 1u8 << bit;
            if self.include & flag != 0 {
                builder.include_id(*id).unwrap();
            } else if self.exclude & flag != 0 {
                builder.exclude_id(*id).unwrap();
            } else if self.at_least_one & flag != 0 {
                builder.at_least_one_of_id(*id).unwrap();
            } else if self.exactly_one & flag != 0 {
                builder.exactly_one_of_id(*id).unwrap();
            }
        }
        builder.build()
    }
}

fn random_archetypes(world: &mut World, rng: &mut StdRng, count: usize) -> Vec<(u8, ArchetypeId)> {
    (0..count)
        .map(|_| {
            let mask = rng.gen::<u8>();
            (mask, world.archetype_for(&ids_of(mask)).unwrap())
        })
        .collect()
}

#[test]
fn test_phantom_entities_are_hidden() {
    let mut world = World::new();
    for i in 0..10 {
        world
            .spawn(
                EntityBuilder::new()
                    .with(Position::new(i as f32, 0.0, 0.0))
                    .with(Velocity::new(1.0, 0.0, 0.0)),
            )
            .unwrap();
    }
    for _ in 0..5 {
        world
            .spawn(
                EntityBuilder::new()
                    .with(Position::default())
                    .with(Phantom::default()),
            )
            .unwrap();
    }

    let mut builder = QueryBuilder::new();
    builder.include::<Position>().unwrap();
    let query = builder.build();
    assert_eq!(query.count(&world), 10);
    assert_eq!(query.run(&mut world).for_each::<(Position,), _>(|_, _| {}), 10);

    // Naming Phantom anywhere disables the implicit exclusion
    let mut builder = QueryBuilder::new();
    builder
        .include::<Position>()
        .unwrap()
        .at_least_one_of::<Phantom>()
        .unwrap();
    assert_eq!(builder.build().count(&world), 5);
}

#[test]
fn test_at_least_one_records_present_members() {
    let mut world = World::new();
    let a_c = world
        .archetype_for(&[component_id::<T0>(), component_id::<T2>()])
        .unwrap();
    let a_b_c = world
        .archetype_for(&[
            component_id::<T0>(),
            component_id::<T1>(),
            component_id::<T2>(),
        ])
        .unwrap();
    world
        .archetype_for(&[component_id::<T2>(), component_id::<T3>()])
        .unwrap();

    let mut builder = QueryBuilder::new();
    builder
        .at_least_one_of::<T0>()
        .unwrap()
        .at_least_one_of::<T1>()
        .unwrap();
    let query = builder.build();

    let matches = query.archetypes(&world);
    assert_eq!(matches.len(), 2);
    for m in matches.iter() {
        let present = m.at_least_one.as_ref().unwrap();
        if m.archetype == a_c {
            assert_eq!(present.as_slice(), &[component_id::<T0>()]);
        } else {
            assert_eq!(m.archetype, a_b_c);
            assert!(present.contains(component_id::<T0>()));
            assert!(present.contains(component_id::<T1>()));
            assert_eq!(present.len(), 2);
        }
    }
}

#[test]
fn test_classification_conflict() {
    let mut builder = QueryBuilder::new();
    builder.include::<T0>().unwrap();
    let err = builder.exclude::<T0>().unwrap_err();
    assert!(matches!(err, QueryError::Conflict { .. }));
    // The rejected call leaves the builder untouched
    assert!(builder.includes(component_id::<T0>()));
    assert!(!builder.excludes(component_id::<T0>()));
}

#[test]
fn test_random_matching_agrees_with_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x00A5_C0DE);
    let mut world = World::new();
    let archetypes = random_archetypes(&mut world, &mut rng, 120);

    for _ in 0..200 {
        let mask_query = MaskQuery::random(&mut rng);
        let query = mask_query.describe();

        let expected: HashSet<ArchetypeId> = archetypes
            .iter()
            .filter(|(mask, _)| mask_query.matches(*mask))
            .map(|(_, id)| *id)
            .collect();
        let matches = query.archetypes(&world);
        let found: HashSet<ArchetypeId> = matches.iter().map(|m| m.archetype).collect();

        assert_eq!(found, expected, "query {mask_query:?}");
        assert_eq!(found.len(), matches.len(), "duplicate match for {mask_query:?}");
        assert!(matches
            .windows(2)
            .all(|w| w[0].sort_key() < w[1].sort_key()));
    }
}

#[test]
fn test_incremental_cache_equals_fresh_scan() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut world = World::new();
    let queries: Vec<MaskQuery> = (0..20).map(|_| MaskQuery::random(&mut rng)).collect();
    let cached: Vec<QueryDescription> = queries.iter().map(MaskQuery::describe).collect();

    for _ in 0..10 {
        random_archetypes(&mut world, &mut rng, 15);
        for query in &cached {
            let _ = query.archetypes(&world);
            assert_eq!(query.watermark(), world.archetype_count());
        }
    }

    for (mask_query, query) in queries.iter().zip(&cached) {
        let fresh = mask_query.describe();
        assert_eq!(*query.archetypes(&world), *fresh.archetypes(&world));
    }
}

fn mixed_world() -> World {
    let mut world = World::with_config(WorldConfig::with_chunk_capacity(16)).unwrap();
    for i in 0..37 {
        world
            .spawn(EntityBuilder::new().with(Position::new(i as f32, 0.0, 0.0)))
            .unwrap();
    }
    for i in 0..21 {
        world
            .spawn(
                EntityBuilder::new()
                    .with(Position::new(i as f32, 1.0, 0.0))
                    .with(Velocity::default()),
            )
            .unwrap();
    }
    for _ in 0..9 {
        world
            .spawn(
                EntityBuilder::new()
                    .with(Position::default())
                    .with(T0(1)),
            )
            .unwrap();
    }
    for _ in 0..4 {
        world
            .spawn(
                EntityBuilder::new()
                    .with(Position::default())
                    .with(Phantom::default()),
            )
            .unwrap();
    }
    world
}

#[test]
fn test_every_form_visits_the_same_count() {
    let mut world = mixed_world();
    let mut builder = QueryBuilder::new();
    builder.include::<Position>().unwrap();
    let query = builder.build();
    let expected = query.count(&world);
    assert_eq!(expected, 67);

    let mut execution = query.run(&mut world);
    assert_eq!(execution.for_each::<(Position,), _>(|_, _| {}), expected);

    let mut execution = query.run(&mut world);
    assert_eq!(
        execution.for_each_chunk::<(Position,), _>(|_, _| {}),
        expected
    );

    let mut execution = query.run(&mut world);
    assert_eq!(execution.for_each_chunk_handle(|_| {}), expected);

    let mut execution = query.run(&mut world);
    assert_eq!(
        execution.par_for_each_chunk::<(Position,), _>(|_, _| {}),
        expected
    );

    let mut execution = query.run(&mut world);
    assert_eq!(
        execution
            .for_each_lanes::<(Position,), NativeF32, _>(|_| {})
            .unwrap(),
        expected
    );

    let mut execution = query.run(&mut world);
    assert_eq!(execution.retain::<(Position,), _>(|_| true), expected);

    let mut execution = query.run(&mut world);
    assert_eq!(execution.retain_chunks(|_| true), expected);

    assert_eq!(world.len(), 71);
}

#[test]
fn test_retain_visits_each_entity_once() {
    let mut world = mixed_world();
    let mut builder = QueryBuilder::new();
    builder.include::<Position>().unwrap().exclude::<T0>().unwrap();
    let query = builder.build();
    let before = query.count(&world);

    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let visited = query
        .run(&mut world)
        .retain::<(Position,), _>(|row| {
            let entity = row.entity();
            assert!(seen.insert(entity), "{entity:?} visited twice");
            let (pos,) = row.components();
            let keep = (pos.x as u32) % 2 == 1;
            if keep {
                kept.push((entity, *pos));
            }
            keep
        });

    assert_eq!(visited, before);
    assert_eq!(seen.len(), before);
    assert_eq!(query.count(&world), kept.len());
    for (entity, pos) in kept {
        assert_eq!(world.get::<Position>(entity), Some(&pos));
    }
    // Excluded and hidden entities are untouched
    assert_eq!(world.len() - query.count(&world), 9 + 4);
}

#[test]
fn test_chunk_forms_see_consistent_entities() {
    let mut world = mixed_world();
    let mut builder = QueryBuilder::new();
    builder.include::<Velocity>().unwrap();
    let query = builder.build();

    let mut from_chunks: Vec<EntityId> = Vec::new();
    query
        .run(&mut world)
        .for_each_chunk::<(Position, Velocity), _>(|entities, (positions, velocities)| {
            assert_eq!(entities.len(), positions.len());
            assert_eq!(entities.len(), velocities.len());
            from_chunks.extend_from_slice(entities);
        });

    let mut from_rows: Vec<EntityId> = Vec::new();
    query
        .run(&mut world)
        .for_each::<(Velocity,), _>(|entity, _| from_rows.push(entity));

    // Rows go backwards inside a chunk, chunk slices run forwards
    assert_eq!(from_chunks.len(), 21);
    from_chunks.sort_unstable();
    from_rows.sort_unstable();
    assert_eq!(from_chunks, from_rows);
}

/// Three-float component so scalar runs straddle entity boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Triple([f32; 3]);
impl Component for Triple {}

const SENTINEL: f32 = -999.0;

#[test]
fn test_lane_tails_never_leak_padding() {
    let mut world = World::with_config(WorldConfig::with_chunk_capacity(4)).unwrap();
    let mut spawned = Vec::new();
    for i in 0..5 {
        let base = (i * 3) as f32;
        let id = world
            .spawn(
                EntityBuilder::new()
                    .with(Triple([base, base + 1.0, base + 2.0]))
                    .with(Position::new(7.0, 7.0, 7.0)),
            )
            .unwrap();
        spawned.push((id, base));
    }

    let mut builder = QueryBuilder::new();
    builder.include::<Triple>().unwrap();
    let query = builder.build();

    let mut infos = Vec::new();
    let visited = query
        .run(&mut world)
        .for_each_lanes::<(Triple,), F32x8, _>(|batch| {
            let info = batch.info();
            infos.push((batch.len(), info));
            let (vectors,) = batch.vectors();
            for vector in vectors.iter_mut() {
                for (lane, value) in vector.lanes_mut().iter_mut().enumerate() {
                    if info.is_tail() && lane >= info.leftover {
                        assert_eq!(*value, 0.0);
                        *value = SENTINEL;
                    } else {
                        *value += 1.0;
                    }
                }
            }
        })
        .unwrap();
    assert_eq!(visited, 5);

    // Last chunk first: one entity is 3 scalars, all tail.
    // Then four entities: 12 scalars, one vector and 4 leftover starting
    // two floats into an entity.
    assert_eq!(
        infos,
        vec![
            (
                1,
                LaneInfo {
                    offset: 0,
                    leftover: 3
                }
            ),
            (1, LaneInfo::default()),
            (
                1,
                LaneInfo {
                    offset: 2,
                    leftover: 4
                }
            ),
        ]
    );
    assert_eq!(infos[0].1.padding_lanes::<F32x8>(), F32x8::LANES - 3);

    for (id, base) in spawned {
        assert_eq!(
            world.get::<Triple>(id),
            Some(&Triple([base + 1.0, base + 2.0, base + 3.0]))
        );
        assert_eq!(world.get::<Position>(id), Some(&Position::new(7.0, 7.0, 7.0)));
    }
}

#[test]
fn test_lane_mismatch_reports_archetype() {
    let mut world = World::new();
    for _ in 0..3 {
        world
            .spawn(
                EntityBuilder::new()
                    .with(Triple::default())
                    .with(Position::default()),
            )
            .unwrap();
    }
    let mut builder = QueryBuilder::new();
    builder.include::<Triple>().unwrap();
    let query = builder.build();
    let archetype = world.archetypes()[0].id();

    let mut calls = 0;
    let err = query
        .run(&mut world)
        .for_each_lanes::<(Position, Triple), F32x8, _>(|_| calls += 1)
        .unwrap_err();

    assert_eq!(calls, 0);
    match err {
        QueryError::LaneCoverageMismatch {
            archetype: reported,
            component,
            expected,
            found,
        } => {
            assert_eq!(reported, archetype);
            assert_eq!(component, component_id::<Triple>());
            // 12 Position scalars vs 9 Triple scalars
            assert_eq!((expected.vectors, expected.leftover), (1, 4));
            assert_eq!((found.vectors, found.leftover), (1, 1));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!world.archetype(archetype).unwrap().is_blocked());
}
