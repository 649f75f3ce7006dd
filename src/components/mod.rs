//! Scene components understood by the physics bridge.

use glam::Vec3;

use crate::physics::BodyHandle;

/// Binds an entity to its simulated body. Removing it (or destroying the entity)
/// destroys the body once the lifecycle bridge is connected.
///
/// Only the scene creates these, and the handle is read-only, so a component
/// always names the body made for its entity.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RigidBodyComponent {
    body: BodyHandle,
}

impl RigidBodyComponent {
    #[inline(always)]
    pub(crate) fn new(body: BodyHandle) -> Self {
        Self { body }
    }

    #[inline(always)]
    pub fn body(&self) -> BodyHandle {
        self.body
    }
}

/// World transform mirrored from the simulation by `Scene::sync_transforms`.
/// Rotation is XYZ Euler in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_degrees: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self { position: Vec3::ZERO, rotation_degrees: Vec3::ZERO, scale: Vec3::ONE }
    }

    pub fn from_position_rotation(position: Vec3, rotation_degrees: Vec3) -> Self {
        Self { position, rotation_degrees, scale: Vec3::ONE }
    }
}
