// src/shape_cache.rs
//! Collision shape cache.
//! - Deduplication: one `SharedShape` per exact descriptor (box / sphere / capsule)
//! - Weak entries: the cache never keeps a shape alive, bodies do
//! - Lazy eviction: dead entries are only pruned by `compact()`
//!
//! Descriptors are keyed by their bit pattern (`-0.0` folded into `0.0`), so only
//! bit-identical values deduplicate. Callers are expected to pass canonical values.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use glam::Vec3;
use rapier3d::parry::shape::Shape;
use rapier3d::prelude::SharedShape;

#[inline(always)]
fn key_bits(v: f32) -> u32 {
    // +0.0 and -0.0 compare equal by value, keep them on one entry.
    if v == 0.0 { 0 } else { v.to_bits() }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct BoxKey([u32; 3]);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct SphereKey(u32);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct CapsuleKey([u32; 2]);

type WeakShape = Weak<dyn Shape>;

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeCacheStats {
    pub boxes: usize,
    pub spheres: usize,
    pub capsules: usize,
    /// Entries whose shape is still referenced by at least one body.
    pub live: usize,
}

impl ShapeCacheStats {
    #[inline]
    pub fn entries(&self) -> usize {
        self.boxes + self.spheres + self.capsules
    }
}

#[derive(Default)]
pub struct ShapeCache {
    boxes: HashMap<BoxKey, WeakShape>,
    spheres: HashMap<SphereKey, WeakShape>,
    capsules: HashMap<CapsuleKey, WeakShape>,
}

/// Returns the live shape under `key`, or builds one and remembers it weakly.
fn get_or_create<K: Eq + Hash>(
    map: &mut HashMap<K, WeakShape>,
    key: K,
    build: impl FnOnce() -> SharedShape,
) -> SharedShape {
    if let Some(shape) = map.get(&key).and_then(Weak::upgrade) {
        return SharedShape(shape);
    }
    let shape = build();
    map.insert(key, Arc::downgrade(&shape.0));
    shape
}

/// Drops entries whose shape has no remaining strong owner. Returns how many were removed.
fn prune<K>(map: &mut HashMap<K, WeakShape>) -> usize {
    let before = map.len();
    map.retain(|_, weak| weak.strong_count() > 0);
    before - map.len()
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn box_shape(&mut self, half_extents: Vec3) -> SharedShape {
        debug_assert!(half_extents.is_finite(), "box half-extents must be finite");
        let key = BoxKey([key_bits(half_extents.x), key_bits(half_extents.y), key_bits(half_extents.z)]);
        get_or_create(&mut self.boxes, key, || {
            log::trace!("Creating box shape {:?}", half_extents);
            SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
        })
    }

    pub fn sphere_shape(&mut self, radius: f32) -> SharedShape {
        debug_assert!(radius.is_finite(), "sphere radius must be finite");
        get_or_create(&mut self.spheres, SphereKey(key_bits(radius)), || {
            log::trace!("Creating sphere shape r={}", radius);
            SharedShape::ball(radius)
        })
    }

    /// Y-aligned capsule. `height` is the distance between the two hemisphere centres.
    pub fn capsule_shape(&mut self, radius: f32, height: f32) -> SharedShape {
        debug_assert!(radius.is_finite() && height.is_finite(), "capsule dimensions must be finite");
        let key = CapsuleKey([key_bits(radius), key_bits(height)]);
        get_or_create(&mut self.capsules, key, || {
            log::trace!("Creating capsule shape r={} h={}", radius, height);
            SharedShape::capsule_y(height * 0.5, radius)
        })
    }

    /// Erases every entry whose shape is no longer used by any body.
    /// Never invalidates a live `SharedShape`. Cheap enough for a seconds-scale cadence.
    pub fn compact(&mut self) -> usize {
        let removed = prune(&mut self.boxes) + prune(&mut self.spheres) + prune(&mut self.capsules);
        if removed > 0 {
            log::debug!("Shape cache compacted: {} expired entries removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> ShapeCacheStats {
        let live = self
            .boxes
            .values()
            .chain(self.spheres.values())
            .chain(self.capsules.values())
            .filter(|w| w.strong_count() > 0)
            .count();
        ShapeCacheStats {
            boxes: self.boxes.len(),
            spheres: self.spheres.len(),
            capsules: self.capsules.len(),
            live,
        }
    }
}
