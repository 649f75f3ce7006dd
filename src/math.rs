// src/math.rs
//! glam <-> nalgebra conversions at the Rapier boundary.
//! Public API speaks glam; Rapier speaks nalgebra (f32 `Real`).

use glam::{EulerRot, Quat, Vec3};
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};

#[inline(always)]
pub fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

#[inline(always)]
pub fn to_point(v: Vec3) -> Point3<f32> {
    Point3::new(v.x, v.y, v.z)
}

#[inline(always)]
pub fn from_vector(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[inline(always)]
pub fn from_point(p: &Point3<f32>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

#[inline(always)]
pub fn to_rotation(q: Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[inline(always)]
pub fn from_rotation(r: &UnitQuaternion<f32>) -> Quat {
    Quat::from_xyzw(r.i, r.j, r.k, r.w)
}

/// XYZ Euler angles in degrees -> quaternion.
pub fn euler_degrees_to_quat(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
}

/// Quaternion -> XYZ Euler angles in degrees.
pub fn quat_to_euler_degrees(q: Quat) -> Vec3 {
    let (x, y, z) = q.to_euler(EulerRot::XYZ);
    Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees())
}

/// World transform from a position and XYZ Euler rotation in degrees.
pub fn isometry(position: Vec3, rotation_degrees: Vec3) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(position.x, position.y, position.z),
        to_rotation(euler_degrees_to_quat(rotation_degrees)),
    )
}
