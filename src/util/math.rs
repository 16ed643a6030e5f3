//! Vector/quaternion helpers on top of the physics engine's nalgebra types

use rand::Rng;
pub use rapier3d::na::{Point3, Quaternion, UnitQuaternion, Vector3};

pub type Vec3 = Vector3<f32>;
pub type Quat = UnitQuaternion<f32>;

/// Unit forward axis in entity space (entities look down -Z)
pub fn forward_axis() -> Vec3 {
    Vec3::new(0.0, 0.0, -1.0)
}

/// Heading of `rotation` around +Y, zero when looking down -Z
pub fn yaw_of(rotation: &Quat) -> f32 {
    let f = rotation * forward_axis();
    (-f.x).atan2(-f.z)
}

/// Heading that looks along `direction` on the XZ plane
pub fn yaw_towards(direction: &Vec3) -> f32 {
    (-direction.x).atan2(-direction.z)
}

pub fn yaw_rotation(yaw: f32) -> Quat {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

pub fn to_array3(v: &Vec3) -> [f32; 3] {
    [v.x, v.y, v.z]
}

/// Quaternion as `[x, y, z, w]`
pub fn to_array4(q: &Quat) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

pub fn vec_from_array(a: [f32; 3]) -> Vec3 {
    Vec3::new(a[0], a[1], a[2])
}

/// Build a rotation from `[x, y, z, w]`, falling back to identity on a degenerate input
pub fn quat_from_array(a: [f32; 4]) -> Quat {
    let q = Quaternion::new(a[3], a[0], a[1], a[2]);
    if !q.norm().is_finite() || q.norm() < 1e-6 {
        return Quat::identity();
    }
    UnitQuaternion::from_quaternion(q)
}

/// Distance ignoring height
pub fn planar_distance(a: &Vec3, b: &Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    (dx * dx + dz * dz).sqrt()
}

pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0..0x0100_0000u32))
}

/// Short hex id for lobbies
pub fn short_id<R: Rng>(rng: &mut R) -> String {
    format!("{:08x}", rng.gen::<u32>())
}
