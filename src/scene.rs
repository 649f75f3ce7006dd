// src/scene.rs
//! Scene: owns the entity registry and its physics world, and drives both per frame.
//!
//! Frame order in `update`: periodic shape-cache compaction, solver step(s),
//! ground-contact sweep. Body creation/destruction requested between frames is
//! therefore always visible to the next step.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::{Mutex, MutexGuard};
use rapier3d::prelude::SharedShape;

use crate::components::{RigidBodyComponent, Transform};
use crate::config::PhysicsConfig;
use crate::ecs::{EntityId, Registry};
use crate::error::{PhysicsError, PhysicsResult};
use crate::lifecycle::{connect_body_cleanup, SharedPhysics};
use crate::math;
use crate::physics::{BodyHandle, PhysicsWorld};
use crate::raycast::RaycastHit;
use crate::time::IntervalTimer;

pub struct Scene {
    registry: Registry,
    physics: SharedPhysics,
    config: PhysicsConfig,
    compaction: IntervalTimer,
    frame: u64,
}

impl Scene {
    pub fn new(config: PhysicsConfig) -> PhysicsResult<Self> {
        let physics: SharedPhysics = Arc::new(Mutex::new(PhysicsWorld::new(&config)?));
        let mut registry = Registry::new();
        connect_body_cleanup(&mut registry, &physics);

        Ok(Self {
            registry,
            physics,
            compaction: IntervalTimer::new(config.compaction.interval_secs),
            config,
            frame: 0,
        })
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Locks the physics world for queries and per-body tuning. Bodies are only
    /// created and destroyed through the scene. Do not destroy entities while the
    /// guard is alive.
    #[inline]
    pub fn physics(&self) -> MutexGuard<'_, PhysicsWorld> {
        self.physics.lock()
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Scene seconds until the shape cache is next compacted.
    #[inline]
    pub fn next_compaction_in(&self) -> f32 {
        self.compaction.remaining()
    }

    // -------------------------------------------------------------------------
    // Entities & Bodies
    // -------------------------------------------------------------------------

    /// Creates an entity with a body, a `RigidBodyComponent` and a `Transform`.
    pub fn spawn_body(
        &mut self,
        shape: SharedShape,
        mass: f32,
        position: Vec3,
        rotation_degrees: Vec3,
    ) -> PhysicsResult<EntityId> {
        let entity = self.registry.create();
        self.attach_body(entity, shape, mass, position, rotation_degrees)?;
        self.registry
            .emplace(entity, Transform::from_position_rotation(position, rotation_degrees))?;
        Ok(entity)
    }

    /// Gives an existing entity a body. A body it already had is destroyed.
    pub fn attach_body(
        &mut self,
        entity: EntityId,
        shape: SharedShape,
        mass: f32,
        position: Vec3,
        rotation_degrees: Vec3,
    ) -> PhysicsResult<BodyHandle> {
        if !self.registry.valid(entity) {
            return Err(PhysicsError::EntityNotFound);
        }
        // Previous body goes first, while the entity owns nothing else.
        self.registry.remove::<RigidBodyComponent>(entity);
        let body = self
            .physics
            .lock()
            .create_rigid_body(entity, shape, mass, position, rotation_degrees);
        self.registry.emplace(entity, RigidBodyComponent::new(body))?;
        Ok(body)
    }

    /// Body handle of `entity`, if it has one.
    pub fn body_of(&self, entity: EntityId) -> Option<BodyHandle> {
        self.registry.try_get::<RigidBodyComponent>(entity).map(|c| c.body())
    }

    /// Destroys `entity`; its body (if any) leaves the world before this returns.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        self.registry.destroy(entity)
    }

    // -------------------------------------------------------------------------
    // Per-frame
    // -------------------------------------------------------------------------

    /// Advances the scene by one frame. Returns the number of solver steps taken.
    pub fn update(&mut self, frame_time: Duration) -> u32 {
        let secs = frame_time.as_secs_f32();
        self.frame += 1;

        let mut physics = self.physics.lock();
        if self.compaction.tick(secs) {
            physics.collect_garbage();
        }

        let (max_substeps, fixed_timestep, elapsed) = self.config.step.step_args(secs);
        let steps = physics.step(max_substeps, fixed_timestep, elapsed);
        physics.update_ground_contacts();
        steps
    }

    /// Copies every simulated pose into its entity's `Transform`.
    pub fn sync_transforms(&mut self) {
        let physics = self.physics.lock();
        for (_, (body, transform)) in self
            .registry
            .view_mut::<(&RigidBodyComponent, &mut Transform)>()
        {
            if let Ok((position, rotation)) = physics.body_transform(body.body()) {
                transform.position = position;
                transform.rotation_degrees = math::quat_to_euler_degrees(rotation);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn raycast(&self, from: Vec3, to: Vec3, sort_by_distance: bool) -> Vec<RaycastHit> {
        self.raycast_filtered(from, to, sort_by_distance, |_, _| true)
    }

    /// Raycast restricted to hits whose entity is alive in this scene and pass
    /// `filter(world, hit)`. The world is passed in since it is locked for the query.
    pub fn raycast_filtered<F>(&self, from: Vec3, to: Vec3, sort_by_distance: bool, mut filter: F) -> Vec<RaycastHit>
    where
        F: FnMut(&PhysicsWorld, &RaycastHit) -> bool,
    {
        let guard = self.physics.lock();
        let physics: &PhysicsWorld = &guard;
        let registry = &self.registry;

        physics.raycast_filtered(from, to, sort_by_distance, |entity, body, point, normal| {
            if !registry.valid(entity) {
                log::warn!("Raycast skipped body {:?} of dead entity {:?}", body, entity);
                return false;
            }
            let hit = RaycastHit { entity, body, point, normal, distance: point.distance(from) };
            filter(physics, &hit)
        })
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        // Release every body through the hooks before the world goes away.
        self.registry.clear();
        log::debug!("Scene dropped after {} frames", self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepPolicy;
    use approx::assert_relative_eq;

    const FRAME: Duration = Duration::from_micros(16_667);

    fn scene() -> Scene {
        Scene::new(PhysicsConfig::default()).unwrap()
    }

    fn down_ray(scene: &Scene) -> Vec<RaycastHit> {
        scene.raycast(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, -100.0, 0.0), true)
    }

    #[test]
    fn test_invalid_config_aborts_construction() {
        let mut cfg = PhysicsConfig::default();
        cfg.ground_contact_epsilon = 0.0;
        assert!(Scene::new(cfg).is_err());
    }

    #[test]
    fn test_static_box_scenario() {
        let mut scene = scene();

        let shape = scene.physics().box_shape(Vec3::ONE);
        let again = scene.physics().box_shape(Vec3::ONE);
        assert!(Arc::ptr_eq(&shape.0, &again.0));

        let entity = scene.spawn_body(shape, 0.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let body = scene.body_of(entity).unwrap();
        for _ in 0..120 {
            scene.update(FRAME);
        }
        assert_eq!(scene.physics().body_transform(body).unwrap().0, Vec3::ZERO);

        let hits = down_ray(&scene);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity, entity);
        assert_relative_eq!(hits[0].point.y, 1.0, epsilon = 1e-4);

        assert!(scene.destroy_entity(entity));
        assert!(down_ray(&scene).is_empty());
    }

    #[test]
    fn test_destroyed_entity_has_no_body() {
        let mut scene = scene();
        let shape = scene.physics().sphere_shape(0.5);
        let entities: Vec<EntityId> = (0..5)
            .map(|i| scene.spawn_body(shape.clone(), 1.0, Vec3::new(i as f32 * 3.0, 5.0, 0.0), Vec3::ZERO).unwrap())
            .collect();
        let bodies: Vec<BodyHandle> = entities.iter().map(|e| scene.body_of(*e).unwrap()).collect();
        assert_eq!(scene.physics().body_count(), 5);

        scene.destroy_entity(entities[2]);
        let physics = scene.physics();
        assert_eq!(physics.body_count(), 4);
        assert!(!physics.contains_body(bodies[2]));
        assert!(physics.contains_body(bodies[1]));
    }

    #[test]
    fn test_compaction_runs_on_scene_time() {
        let mut cfg = PhysicsConfig::default();
        cfg.compaction.interval_secs = 1.0;
        let mut scene = Scene::new(cfg).unwrap();

        let shape = scene.physics().box_shape(Vec3::splat(0.5));
        let entity = scene.spawn_body(shape, 1.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        scene.destroy_entity(entity);
        assert_eq!(scene.physics().shape_cache_stats().boxes, 1);

        scene.update(Duration::from_millis(500));
        assert_eq!(scene.physics().shape_cache_stats().boxes, 1);
        assert_relative_eq!(scene.next_compaction_in(), 0.5, epsilon = 1e-4);
        scene.update(Duration::from_millis(600));
        assert_eq!(scene.physics().shape_cache_stats().boxes, 0);
    }

    #[test]
    fn test_ground_sweep_after_update() {
        let mut scene = scene();
        let floor = scene.physics().box_shape(Vec3::new(20.0, 1.0, 20.0));
        scene.spawn_body(floor, 0.0, Vec3::ZERO, Vec3::ZERO).unwrap();

        let crate_shape = scene.physics().box_shape(Vec3::splat(0.5));
        let resting = scene.spawn_body(crate_shape.clone(), 1.0, Vec3::new(0.0, 1.5, 0.0), Vec3::ZERO).unwrap();
        let falling = scene.spawn_body(crate_shape, 1.0, Vec3::new(8.0, 200.0, 0.0), Vec3::ZERO).unwrap();

        for _ in 0..60 {
            scene.update(FRAME);
        }
        let resting = scene.body_of(resting).unwrap();
        let falling = scene.body_of(falling).unwrap();
        let physics = scene.physics();
        assert!(physics.is_on_ground(resting));
        assert!(!physics.is_on_ground(falling));
    }

    #[test]
    fn test_sync_transforms_follows_body() {
        let mut scene = scene();
        let shape = scene.physics().sphere_shape(1.0);
        let entity = scene.spawn_body(shape, 1.0, Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO).unwrap();
        for _ in 0..30 {
            scene.update(FRAME);
        }
        scene.sync_transforms();
        let y = scene.registry().try_get::<Transform>(entity).unwrap().position.y;
        assert!(y < 50.0);
    }

    #[test]
    fn test_raycast_filter_by_mass() {
        let mut scene = scene();
        let shape = scene.physics().box_shape(Vec3::ONE);
        scene.spawn_body(shape.clone(), 0.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let movable = scene.spawn_body(shape, 10.0, Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO).unwrap();

        let hits = scene.raycast_filtered(
            Vec3::new(0.0, 100.0, 0.0),
            Vec3::new(0.0, -100.0, 0.0),
            true,
            |world, hit| world.mass(hit.body).map_or(false, |m| m != 0.0),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity, movable);
    }

    #[test]
    fn test_attach_body_replaces_previous() {
        let mut scene = scene();
        let shape = scene.physics().sphere_shape(1.0);
        let entity = scene.spawn_body(shape.clone(), 1.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let first = scene.body_of(entity).unwrap();

        let second = scene.attach_body(entity, shape, 2.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        assert_ne!(first, second);
        let physics = scene.physics();
        assert!(!physics.contains_body(first));
        assert_eq!(physics.body_count(), 1);
        assert_eq!(physics.entity_of(second), Some(entity));
    }

    #[test]
    fn test_decoupled_policy_steps_every_frame() {
        let cfg = PhysicsConfig { step: StepPolicy::decoupled(2.0), ..PhysicsConfig::default() };
        let mut scene = Scene::new(cfg).unwrap();
        assert_eq!(scene.update(Duration::from_millis(5)), 1);
        assert_eq!(scene.update(Duration::from_millis(100)), 1);
        assert_eq!(scene.physics().stats().steps_taken, 2);
    }

    #[test]
    fn test_raycast_skips_body_of_dead_entity() {
        let mut scene = scene();
        let ghost = scene.registry_mut().create();
        scene.destroy_entity(ghost);
        {
            let mut physics = scene.physics();
            let shape = physics.box_shape(Vec3::ONE);
            physics.create_rigid_body(ghost, shape, 0.0, Vec3::ZERO, Vec3::ZERO);
            // The world alone still reports it.
            assert_eq!(
                physics.raycast(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, -100.0, 0.0), true).len(),
                1
            );
        }
        assert!(down_ray(&scene).is_empty());
    }

    #[test]
    fn test_swapped_components_cannot_orphan_bodies() {
        let mut scene = scene();
        let shape = scene.physics().sphere_shape(1.0);
        let a = scene.spawn_body(shape.clone(), 1.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let b = scene.spawn_body(shape, 1.0, Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO).unwrap();
        let body_a = scene.body_of(a).unwrap();
        let body_b = scene.body_of(b).unwrap();

        {
            let mut components: Vec<&mut RigidBodyComponent> = scene
                .registry_mut()
                .view_mut::<&mut RigidBodyComponent>()
                .into_iter()
                .map(|(_, c)| c)
                .collect();
            let (first, rest) = components.split_at_mut(1);
            std::mem::swap(&mut *first[0], &mut *rest[0]);
        }
        assert_eq!(scene.body_of(a), Some(body_b));

        assert!(scene.destroy_entity(a));
        {
            let physics = scene.physics();
            assert!(!physics.contains_body(body_a));
            assert!(physics.contains_body(body_b));
            assert_eq!(physics.entity_of(body_b), Some(b));
            assert_eq!(physics.body_count(), 1);
        }

        assert!(scene.destroy_entity(b));
        assert_eq!(scene.physics().body_count(), 0);
    }

    #[test]
    fn test_attach_body_over_foreign_handle_keeps_new_body() {
        let mut scene = scene();
        let shape = scene.physics().sphere_shape(1.0);
        let a = scene.spawn_body(shape.clone(), 1.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let b = scene.spawn_body(shape.clone(), 1.0, Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO).unwrap();
        let body_a = scene.body_of(a).unwrap();
        let body_b = scene.body_of(b).unwrap();
        {
            let mut components: Vec<&mut RigidBodyComponent> = scene
                .registry_mut()
                .view_mut::<&mut RigidBodyComponent>()
                .into_iter()
                .map(|(_, c)| c)
                .collect();
            let (first, rest) = components.split_at_mut(1);
            std::mem::swap(&mut *first[0], &mut *rest[0]);
        }

        let fresh = scene.attach_body(a, shape, 2.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let physics = scene.physics();
        assert!(physics.contains_body(fresh));
        assert!(!physics.contains_body(body_a));
        assert!(physics.contains_body(body_b));
        assert_eq!(physics.bodies_owned_by(a), vec![fresh]);
    }

    #[test]
    fn test_drop_releases_bodies() {
        let mut scene = scene();
        let shape = scene.physics().box_shape(Vec3::ONE);
        let weak = Arc::downgrade(&shape.0);
        scene.spawn_body(shape, 1.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        let physics = Arc::clone(&scene.physics);
        drop(scene);

        assert_eq!(physics.lock().body_count(), 0);
        assert!(weak.upgrade().is_none());
    }
}
