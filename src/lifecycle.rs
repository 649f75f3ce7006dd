// src/lifecycle.rs
//! Entity <-> body lifecycle bridge.
//!
//! Once connected, a `RigidBodyComponent` leaving an entity (entity destroyed,
//! component removed or replaced, registry cleared) destroys its body, so the
//! world never holds a body whose owner is gone.
//!
//! The body side table is authoritative: the hook only destroys bodies whose
//! user data names the dying entity, so a component pointing at another entity's
//! body can neither kill that body nor strand its own.
//!
//! Hooks lock the shared world: never destroy entities while holding that lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::components::RigidBodyComponent;
use crate::ecs::Registry;
use crate::physics::PhysicsWorld;

/// Physics world shared between a scene and its destroy hook.
pub type SharedPhysics = Arc<Mutex<PhysicsWorld>>;

pub fn connect_body_cleanup(registry: &mut Registry, physics: &SharedPhysics) {
    let physics = Arc::clone(physics);
    registry.on_destroy::<RigidBodyComponent>(move |entity, component| {
        let mut world = physics.lock();
        let body = component.body();

        if world.entity_of(body) == Some(entity) {
            world.destroy_rigid_body(body);
            log::trace!("Released body {:?} of {:?}", body, entity);
            return;
        }

        let owned = world.bodies_owned_by(entity);
        log::warn!(
            "{:?} held body {:?} it does not own; releasing its {} own bodies instead",
            entity,
            body,
            owned.len()
        );
        for handle in owned {
            world.destroy_rigid_body(handle);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use glam::Vec3;

    fn setup() -> (Registry, SharedPhysics) {
        let physics = Arc::new(Mutex::new(PhysicsWorld::new(&PhysicsConfig::default()).unwrap()));
        let mut registry = Registry::new();
        connect_body_cleanup(&mut registry, &physics);
        (registry, physics)
    }

    fn attach(registry: &mut Registry, physics: &SharedPhysics) -> (crate::ecs::EntityId, crate::physics::BodyHandle) {
        let entity = registry.create();
        let body = {
            let mut world = physics.lock();
            let shape = world.box_shape(Vec3::ONE);
            world.create_rigid_body(entity, shape, 1.0, Vec3::ZERO, Vec3::ZERO)
        };
        registry.emplace(entity, RigidBodyComponent::new(body)).unwrap();
        (entity, body)
    }

    #[test]
    fn test_destroying_entity_destroys_body() {
        let (mut registry, physics) = setup();
        let (entity, body) = attach(&mut registry, &physics);

        assert!(registry.destroy(entity));
        let world = physics.lock();
        assert!(!world.contains_body(body));
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_removing_component_destroys_body() {
        let (mut registry, physics) = setup();
        let (entity, body) = attach(&mut registry, &physics);

        assert!(registry.remove::<RigidBodyComponent>(entity).is_some());
        assert!(registry.valid(entity));
        assert!(!physics.lock().contains_body(body));
    }

    #[test]
    fn test_replacing_component_destroys_old_body() {
        let (mut registry, physics) = setup();
        let (entity, old) = attach(&mut registry, &physics);
        let new = {
            let mut world = physics.lock();
            let shape = world.sphere_shape(1.0);
            world.create_rigid_body(entity, shape, 1.0, Vec3::ZERO, Vec3::ZERO)
        };
        registry.emplace(entity, RigidBodyComponent::new(new)).unwrap();

        let world = physics.lock();
        assert!(!world.contains_body(old));
        assert!(world.contains_body(new));
    }

    #[test]
    fn test_clear_releases_every_body() {
        let (mut registry, physics) = setup();
        for _ in 0..4 {
            attach(&mut registry, &physics);
        }
        registry.clear();
        let mut world = physics.lock();
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.collect_garbage(), 1);
    }

    #[test]
    fn test_body_already_gone_is_tolerated() {
        let (mut registry, physics) = setup();
        let (entity, body) = attach(&mut registry, &physics);
        physics.lock().destroy_rigid_body(body);
        assert!(registry.destroy(entity));
    }
}
