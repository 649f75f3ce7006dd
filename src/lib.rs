// src/lib.rs
//! Rigid-body physics bridge for entity-based scenes.
//!
//! - `shape_cache`: deduplicated, weakly cached collision shapes
//! - `physics`: Rapier world wrapper, body factory, stepping, ground contacts
//! - `raycast`: all-hits segment queries
//! - `lifecycle`: entity destruction releases the entity's body
//! - `scene`: owns registry + world and drives them per frame

pub mod components;
pub mod config;
pub mod ecs;
pub mod error;
pub mod lifecycle;
pub mod math;
pub mod physics;
pub mod raycast;
pub mod scene;
pub mod shape_cache;
pub mod time;

pub use components::{RigidBodyComponent, Transform};
pub use config::{CompactionPolicy, PhysicsConfig, StepMode, StepPolicy};
pub use ecs::{EntityId, Registry};
pub use error::{PhysicsError, PhysicsResult};
pub use lifecycle::{connect_body_cleanup, SharedPhysics};
pub use physics::{BodyHandle, BodyUserData, PhysicsStats, PhysicsWorld};
pub use raycast::RaycastHit;
pub use scene::Scene;
pub use shape_cache::{ShapeCache, ShapeCacheStats};
pub use time::IntervalTimer;

pub use rapier3d::prelude::SharedShape;

pub mod prelude {
    pub use crate::components::{RigidBodyComponent, Transform};
    pub use crate::config::{PhysicsConfig, StepMode, StepPolicy};
    pub use crate::ecs::{EntityId, Registry};
    pub use crate::error::{PhysicsError, PhysicsResult};
    pub use crate::physics::{BodyHandle, PhysicsWorld};
    pub use crate::raycast::RaycastHit;
    pub use crate::scene::Scene;
    pub use glam::{Quat, Vec3};
    pub use rapier3d::prelude::SharedShape;
}
