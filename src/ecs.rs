// src/ecs.rs
//! Entity store adapter over `hecs::World`.
//!
//! Adds the one thing hecs does not provide: per-component destroy signals.
//! A hook registered with `on_destroy::<C>()` fires synchronously whenever a `C`
//! leaves an entity (entity destroyed, component removed or replaced), and always
//! *before* the component storage is released, so the hook can still read it.

use std::any::TypeId;
use std::collections::HashMap;

use hecs::{Component, Query, QueryBorrow, QueryMut, Ref, RefMut, World};

use crate::error::{PhysicsError, PhysicsResult};

/// Engine entity ID alias
pub type EntityId = hecs::Entity;

type DestroyHook = Box<dyn FnMut(&World, EntityId) + Send>;

#[derive(Default)]
pub struct Registry {
    world: World,
    destroy_hooks: HashMap<TypeId, Vec<DestroyHook>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn create(&mut self) -> EntityId {
        self.world.spawn(())
    }

    #[inline]
    pub fn valid(&self, entity: EntityId) -> bool {
        self.world.contains(entity)
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.world.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.world.len() == 0
    }

    /// Registers `hook` to run whenever a `C` is about to be dropped from an entity.
    pub fn on_destroy<C: Component>(&mut self, mut hook: impl FnMut(EntityId, &C) + Send + 'static) {
        let erased: DestroyHook = Box::new(move |world, entity| {
            if let Ok(component) = world.get::<&C>(entity) {
                hook(entity, &component);
            }
        });
        self.destroy_hooks.entry(TypeId::of::<C>()).or_default().push(erased);
    }

    /// Attaches `component`. An existing `C` is replaced, running its destroy hooks first.
    pub fn emplace<C: Component>(&mut self, entity: EntityId, component: C) -> PhysicsResult<()> {
        if !self.world.contains(entity) {
            return Err(PhysicsError::EntityNotFound);
        }
        self.fire_hooks_for::<C>(entity);
        self.world
            .insert_one(entity, component)
            .map_err(|_| PhysicsError::EntityNotFound)
    }

    #[inline]
    pub fn try_get<C: Component>(&self, entity: EntityId) -> Option<Ref<'_, C>> {
        self.world.get::<&C>(entity).ok()
    }

    #[inline]
    pub fn try_get_mut<C: Component>(&self, entity: EntityId) -> Option<RefMut<'_, C>> {
        self.world.get::<&mut C>(entity).ok()
    }

    #[inline]
    pub fn has<C: Component>(&self, entity: EntityId) -> bool {
        self.world.get::<&C>(entity).is_ok()
    }

    /// Iterate `(EntityId, Q)` for every entity matching the query.
    #[inline]
    pub fn view<Q: Query>(&self) -> QueryBorrow<'_, Q> {
        self.world.query::<Q>()
    }

    #[inline]
    pub fn view_mut<Q: Query>(&mut self) -> QueryMut<'_, Q> {
        self.world.query_mut::<Q>()
    }

    /// Detaches a `C` from `entity`, running its destroy hooks first.
    pub fn remove<C: Component>(&mut self, entity: EntityId) -> Option<C> {
        if !self.has::<C>(entity) {
            return None;
        }
        self.fire_hooks_for::<C>(entity);
        self.world.remove_one::<C>(entity).ok()
    }

    /// Destroys `entity`. Every destroy hook of every component it holds fires
    /// before any storage is released. Returns `false` for dead entities.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.world.contains(entity) {
            return false;
        }
        for hooks in self.destroy_hooks.values_mut() {
            for hook in hooks.iter_mut() {
                hook(&self.world, entity);
            }
        }
        self.world.despawn(entity).is_ok()
    }

    /// Destroys every entity, firing hooks for each.
    pub fn clear(&mut self) {
        let entities: Vec<EntityId> = self.world.iter().map(|e| e.entity()).collect();
        for entity in entities {
            self.destroy(entity);
        }
        self.world.clear();
    }

    fn fire_hooks_for<C: Component>(&mut self, entity: EntityId) {
        if let Some(hooks) = self.destroy_hooks.get_mut(&TypeId::of::<C>()) {
            for hook in hooks.iter_mut() {
                hook(&self.world, entity);
            }
        }
    }
}
