// src/physics.rs
//! Rapier 3D dynamics world wrapper and rigid body factory.
//!
//! ## Features
//! - Owns the full Rapier pipeline (broad phase, narrow phase, solver, islands, CCD)
//! - Bullet-style sub-stepping: `step(max_substeps, fixed_timestep, elapsed)`
//! - Rigid bodies bound to an entity, with a side table of body user data
//!   (`entity`, strong shape reference, `on_ground`) instead of raw user pointers
//! - Shared collision shapes through the weak-entry `ShapeCache`
//! - Ground contact sweep for movement logic
//!
//! Single writer: only the owning scene mutates the world. Raycasts live in `raycast.rs`.

use std::collections::HashMap;
use std::time::Instant;

use glam::{Quat, Vec3};
use nalgebra::Vector3;
use rapier3d::prelude::*;

use crate::config::PhysicsConfig;
use crate::ecs::EntityId;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math;
use crate::shape_cache::{ShapeCache, ShapeCacheStats};

/// Opaque, generation-checked body handle. A destroyed body's handle never resolves again.
pub type BodyHandle = RigidBodyHandle;

/// Out-of-band data carried by every simulated body.
#[derive(Clone)]
pub struct BodyUserData {
    pub entity: EntityId,
    /// Strong reference; the shape cache only keeps a weak one.
    pub shape: SharedShape,
    pub on_ground: bool,
}

impl std::fmt::Debug for BodyUserData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyUserData")
            .field("entity", &self.entity)
            .field("shape", &self.shape.shape_type())
            .field("on_ground", &self.on_ground)
            .finish()
    }
}

/// Performance and occupancy counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicsStats {
    pub bodies: usize,
    pub colliders: usize,
    pub steps_taken: u64,
    pub last_step_ms: f32,
    pub shapes: ShapeCacheStats,
}

pub struct PhysicsWorld {
    pub(crate) gravity: Vector3<f32>,
    pub(crate) integration_parameters: IntegrationParameters,
    pub(crate) pipeline: PhysicsPipeline,
    pub(crate) islands: IslandManager,
    pub(crate) broad_phase: BroadPhase,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    pub(crate) impulse_joints: ImpulseJointSet,
    pub(crate) multibody_joints: MultibodyJointSet,
    pub(crate) ccd_solver: CCDSolver,
    pub(crate) query_pipeline: QueryPipeline,

    shapes: ShapeCache,
    pub(crate) user_data: HashMap<BodyHandle, BodyUserData>,

    /// Unconsumed simulation time carried between `step` calls.
    local_time: f32,
    ground_contact_epsilon: f32,
    ground_normal_min_y: f32,
    steps_taken: u64,
    last_step_ms: f32,
}

impl PhysicsWorld {
    /// Builds the world. Fails fast on a configuration the solver cannot run with.
    pub fn new(config: &PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;
        let [gx, gy, gz] = config.gravity;

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.step.fixed_timestep;

        log::info!(
            "Physics world created: gravity=({}, {}, {}), fixed_dt={}",
            gx, gy, gz, config.step.fixed_timestep
        );

        Ok(Self {
            gravity: Vector3::new(gx, gy, gz),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            shapes: ShapeCache::new(),
            user_data: HashMap::new(),
            local_time: 0.0,
            ground_contact_epsilon: config.ground_contact_epsilon,
            ground_normal_min_y: config.ground_normal_min_y,
            steps_taken: 0,
            last_step_ms: 0.0,
        })
    }

    // -------------------------------------------------------------------------
    // Shapes
    // -------------------------------------------------------------------------

    pub fn box_shape(&mut self, half_extents: Vec3) -> SharedShape {
        self.shapes.box_shape(half_extents)
    }

    pub fn sphere_shape(&mut self, radius: f32) -> SharedShape {
        self.shapes.sphere_shape(radius)
    }

    pub fn capsule_shape(&mut self, radius: f32, height: f32) -> SharedShape {
        self.shapes.capsule_shape(radius, height)
    }

    /// Prunes shape-cache entries no body uses any more. Returns the number removed.
    pub fn collect_garbage(&mut self) -> usize {
        self.shapes.compact()
    }

    // -------------------------------------------------------------------------
    // Body Management
    // -------------------------------------------------------------------------

    /// Creates a body for `entity` and adds it to the world.
    /// `mass == 0` makes a fixed body that only participates in collision.
    /// Outside the crate bodies are created through `Scene`, so each one has an owning entity.
    pub(crate) fn create_rigid_body(
        &mut self,
        entity: EntityId,
        shape: SharedShape,
        mass: f32,
        position: Vec3,
        rotation_degrees: Vec3,
    ) -> BodyHandle {
        let is_static = mass <= 0.0;
        if mass < 0.0 {
            log::warn!("Negative mass {} for {:?}, creating a static body", mass, entity);
        }

        let builder = if is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let body = builder
            .position(math::isometry(position, rotation_degrees))
            .build();

        let mut collider = ColliderBuilder::new(shape.clone());
        if !is_static {
            collider = collider.mass(mass);
        }

        let handle = self.bodies.insert(body);
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);
        self.user_data.insert(
            handle,
            BodyUserData { entity, shape, on_ground: false },
        );
        self.refresh_queries();

        log::trace!("Created body {:?} for {:?} (mass {})", handle, entity, mass);
        handle
    }

    /// Removes a body and its collider, releasing its shape reference.
    /// Stale handles are ignored and reported with `false`.
    pub(crate) fn destroy_rigid_body(&mut self, handle: BodyHandle) -> bool {
        let removed = self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.user_data.remove(&handle);

        if removed.is_none() {
            log::warn!("destroy_rigid_body: stale handle {:?}", handle);
            return false;
        }
        self.refresh_queries();
        log::trace!("Destroyed body {:?}", handle);
        true
    }

    #[inline]
    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains(handle)
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Read-only access to the underlying Rapier body.
    #[inline]
    pub fn rigid_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    #[inline]
    pub fn user_data(&self, handle: BodyHandle) -> Option<&BodyUserData> {
        self.user_data.get(&handle)
    }

    #[inline]
    pub fn entity_of(&self, handle: BodyHandle) -> Option<EntityId> {
        self.user_data.get(&handle).map(|d| d.entity)
    }

    #[inline]
    pub fn is_on_ground(&self, handle: BodyHandle) -> bool {
        self.user_data.get(&handle).map_or(false, |d| d.on_ground)
    }

    /// Every body whose user data names `entity`.
    pub fn bodies_owned_by(&self, entity: EntityId) -> Vec<BodyHandle> {
        self.user_data
            .iter()
            .filter(|(_, d)| d.entity == entity)
            .map(|(h, _)| *h)
            .collect()
    }

    /// Iterate `(handle, user data)` for every body in the world.
    pub fn iter_bodies(&self) -> impl Iterator<Item = (BodyHandle, &BodyUserData)> {
        self.user_data.iter().map(|(h, d)| (*h, d))
    }

    // -------------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------------

    /// Advances the simulation, Bullet style.
    ///
    /// `elapsed` is added to an internal clock which is consumed in whole
    /// `fixed_timestep` steps, at most `max_substeps` of them; any excess is dropped.
    /// `max_substeps == 0` takes a single variable step of exactly `elapsed`.
    /// Returns the number of solver steps taken.
    pub fn step(&mut self, max_substeps: u32, fixed_timestep: f32, elapsed: f32) -> u32 {
        let elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };

        let (count, dt) = if max_substeps == 0 {
            self.local_time = 0.0;
            (u32::from(elapsed > f32::EPSILON), elapsed)
        } else {
            if !(fixed_timestep.is_finite() && fixed_timestep > 0.0) {
                log::warn!("step: ignoring non-positive fixed timestep {}", fixed_timestep);
                return 0;
            }
            self.local_time += elapsed;
            let mut substeps = 0;
            if self.local_time >= fixed_timestep {
                substeps = (self.local_time / fixed_timestep) as u32;
                self.local_time -= substeps as f32 * fixed_timestep;
            }
            (substeps.min(max_substeps), fixed_timestep)
        };

        if count == 0 {
            return 0;
        }

        let start = Instant::now();
        for _ in 0..count {
            self.step_once(dt);
        }
        self.refresh_queries();

        self.steps_taken += u64::from(count);
        self.last_step_ms = start.elapsed().as_secs_f32() * 1000.0;
        count
    }

    fn step_once(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// Rebuilds the ray-query acceleration structure from current collider poses.
    pub(crate) fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.bodies, &self.colliders);
    }

    // -------------------------------------------------------------------------
    // Ground Contacts
    // -------------------------------------------------------------------------

    /// Recomputes every body's `on_ground` flag from the current contact manifolds.
    /// A body is on ground when it touches something below it (contact normal mostly
    /// vertical) within `ground_contact_epsilon`. Run after `step`.
    pub fn update_ground_contacts(&mut self) {
        for data in self.user_data.values_mut() {
            data.on_ground = false;
        }

        let epsilon = self.ground_contact_epsilon;
        let min_y = self.ground_normal_min_y;

        for pair in self.narrow_phase.contact_pairs() {
            let (Some(co1), Some(co2)) = (self.colliders.get(pair.collider1), self.colliders.get(pair.collider2)) else {
                continue;
            };

            for manifold in &pair.manifolds {
                if !manifold.points.iter().any(|p| p.dist <= epsilon) {
                    continue;
                }
                // Outward normal of collider1, in world space.
                let normal = co1.position().rotation * manifold.local_n1;
                let resting = if normal.y >= min_y {
                    co2.parent()
                } else if normal.y <= -min_y {
                    co1.parent()
                } else {
                    None
                };
                if let Some(data) = resting.and_then(|h| self.user_data.get_mut(&h)) {
                    data.on_ground = true;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Body State
    // -------------------------------------------------------------------------

    fn body(&self, handle: BodyHandle) -> PhysicsResult<&RigidBody> {
        self.bodies.get(handle).ok_or(PhysicsError::InvalidHandle)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> PhysicsResult<&mut RigidBody> {
        self.bodies.get_mut(handle).ok_or(PhysicsError::InvalidHandle)
    }

    /// World position and rotation.
    pub fn body_transform(&self, handle: BodyHandle) -> PhysicsResult<(Vec3, Quat)> {
        let pos = self.body(handle)?.position();
        Ok((
            math::from_vector(&pos.translation.vector),
            math::from_rotation(&pos.rotation),
        ))
    }

    /// Teleports a body. Refreshes ray queries so the move is visible immediately.
    pub fn set_body_transform(&mut self, handle: BodyHandle, position: Vec3, rotation_degrees: Vec3) -> PhysicsResult<()> {
        self.body_mut(handle)?
            .set_position(math::isometry(position, rotation_degrees), true);
        // Colliders follow their parent only during a step; sync them now for queries.
        let collider_handles = self.body(handle)?.colliders().to_vec();
        let body_pos = *self.body(handle)?.position();
        for ch in collider_handles {
            if let Some(collider) = self.colliders.get_mut(ch) {
                let local = collider.position_wrt_parent().copied().unwrap_or_else(Isometry::identity);
                collider.set_position(body_pos * local);
            }
        }
        self.refresh_queries();
        Ok(())
    }

    pub fn mass(&self, handle: BodyHandle) -> PhysicsResult<f32> {
        let body = self.body(handle)?;
        Ok(if body.is_fixed() { 0.0 } else { body.mass() })
    }

    pub fn is_static(&self, handle: BodyHandle) -> PhysicsResult<bool> {
        Ok(self.body(handle)?.is_fixed())
    }

    pub fn linear_velocity(&self, handle: BodyHandle) -> PhysicsResult<Vec3> {
        Ok(math::from_vector(self.body(handle)?.linvel()))
    }

    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> PhysicsResult<()> {
        self.body_mut(handle)?.set_linvel(math::to_vector(velocity), true);
        Ok(())
    }

    pub fn angular_velocity(&self, handle: BodyHandle) -> PhysicsResult<Vec3> {
        Ok(math::from_vector(self.body(handle)?.angvel()))
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) -> PhysicsResult<()> {
        self.body_mut(handle)?.set_angvel(math::to_vector(velocity), true);
        Ok(())
    }

    /// Applies an impulse (instant velocity change) at the centre of mass.
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec3) -> PhysicsResult<()> {
        self.body_mut(handle)?.apply_impulse(math::to_vector(impulse), true);
        Ok(())
    }

    pub fn wake_up(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        self.body_mut(handle)?.wake_up(true);
        Ok(())
    }

    /// Stops a body from rotating (e.g. an upright character capsule).
    pub fn lock_rotations(&mut self, handle: BodyHandle, locked: bool) -> PhysicsResult<()> {
        self.body_mut(handle)?.lock_rotations(locked, true);
        Ok(())
    }

    pub fn set_gravity_scale(&mut self, handle: BodyHandle, scale: f32) -> PhysicsResult<()> {
        self.body_mut(handle)?.set_gravity_scale(scale, true);
        Ok(())
    }

    pub fn set_gravity_enabled(&mut self, handle: BodyHandle, enabled: bool) -> PhysicsResult<()> {
        self.set_gravity_scale(handle, if enabled { 1.0 } else { 0.0 })
    }

    pub fn set_friction(&mut self, handle: BodyHandle, friction: f32) -> PhysicsResult<()> {
        let collider_handles = self.body(handle)?.colliders().to_vec();
        for ch in collider_handles {
            if let Some(collider) = self.colliders.get_mut(ch) {
                collider.set_friction(friction);
            }
        }
        Ok(())
    }

    /// Disabled bodies neither collide nor show up in raycasts.
    pub fn set_collisions_enabled(&mut self, handle: BodyHandle, enabled: bool) -> PhysicsResult<()> {
        let collider_handles = self.body(handle)?.colliders().to_vec();
        for ch in collider_handles {
            if let Some(collider) = self.colliders.get_mut(ch) {
                collider.set_enabled(enabled);
            }
        }
        self.refresh_queries();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Global State
    // -------------------------------------------------------------------------

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = math::to_vector(gravity);
    }

    pub fn gravity(&self) -> Vec3 {
        math::from_vector(&self.gravity)
    }

    pub fn shape_cache_stats(&self) -> ShapeCacheStats {
        self.shapes.stats()
    }

    pub fn stats(&self) -> PhysicsStats {
        PhysicsStats {
            bodies: self.bodies.len(),
            colliders: self.colliders.len(),
            steps_taken: self.steps_taken,
            last_step_ms: self.last_step_ms,
            shapes: self.shapes.stats(),
        }
    }
}
