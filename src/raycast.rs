// src/raycast.rs
//! Segment raycasts against the dynamics world.
//!
//! Returns *every* body the segment `from -> to` crosses, not just the closest.
//! Hits are surface entries: a body containing `from` is not reported.
//! Pure query: never mutates the world.

use glam::Vec3;
use rapier3d::prelude::*;

use crate::ecs::EntityId;
use crate::math;
use crate::physics::{BodyHandle, PhysicsWorld};

/// One body crossed by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: EntityId,
    pub body: BodyHandle,
    /// World-space entry point.
    pub point: Vec3,
    /// Surface normal at `point`.
    pub normal: Vec3,
    /// Distance from the ray origin to `point`.
    pub distance: f32,
}

impl PhysicsWorld {
    /// All hits along `from -> to`. Sorted nearest-first when `sort_by_distance` is set,
    /// otherwise in unspecified order.
    pub fn raycast(&self, from: Vec3, to: Vec3, sort_by_distance: bool) -> Vec<RaycastHit> {
        self.raycast_filtered(from, to, sort_by_distance, |_, _, _, _| true)
    }

    /// Like [`raycast`](Self::raycast), keeping only hits for which
    /// `filter(entity, body, point, normal)` returns `true`.
    ///
    /// The filter may borrow the world immutably (e.g. to check `mass`).
    pub fn raycast_filtered<F>(&self, from: Vec3, to: Vec3, sort_by_distance: bool, mut filter: F) -> Vec<RaycastHit>
    where
        F: FnMut(EntityId, BodyHandle, Vec3, Vec3) -> bool,
    {
        let mut hits = Vec::new();
        let dir = to - from;
        if !dir.is_finite() || dir.length_squared() <= f32::EPSILON {
            return hits;
        }

        // Unnormalized direction with max_toi = 1 spans exactly the segment.
        let ray = Ray::new(math::to_point(from), math::to_vector(dir));

        self.query_pipeline.intersections_with_ray(
            &self.bodies,
            &self.colliders,
            &ray,
            1.0,
            true,
            QueryFilter::default(),
            |collider, intersection| {
                // Ray starts inside this collider: there is no entry surface to report.
                if intersection.toi <= 0.0 {
                    return true;
                }
                let Some(body) = self.colliders.get(collider).and_then(|c| c.parent()) else {
                    return true;
                };
                // Bodies without user data are not ours to report.
                let Some(data) = self.user_data.get(&body) else {
                    return true;
                };

                let point = math::from_point(&ray.point_at(intersection.toi));
                let normal = math::from_vector(&intersection.normal);
                if filter(data.entity, body, point, normal) {
                    hits.push(RaycastHit {
                        entity: data.entity,
                        body,
                        point,
                        normal,
                        distance: point.distance(from),
                    });
                }
                true
            },
        );

        if sort_by_distance {
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }
        hits
    }

    /// Closest hit along `from -> to`, if any.
    pub fn raycast_closest(&self, from: Vec3, to: Vec3) -> Option<RaycastHit> {
        self.raycast(from, to, false)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}
