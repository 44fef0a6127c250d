//! Scene components and per-instance payload types.
//!
//! Spatial components use `glam` types. `InstanceMatrix` is the payload the
//! chunked stores hold and the GPU receives.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::handle::EntityHandle;
use crate::properties::{CircuitProperties, ParticleProperties, PinProperties};

/// World-space position.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Position(pub Vec3);

/// World-space rotation as a quaternion.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Rotation(pub Quat);

/// Non-uniform scale.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct Scale(pub Vec3);

/// Marker: entity is live and should be pushed every round.
#[derive(Debug, Clone, Copy)]
pub struct Active;

/// Handle of this entity in its category's build buffer, if pushed this round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSlot(pub Option<EntityHandle>);

/// Which rendering category an entity belongs to and with which properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visual {
    Particle(ParticleProperties),
    Pin(PinProperties),
    Circuit(CircuitProperties),
}

impl Default for Position {
    fn default() -> Self {
        Self(Vec3::ZERO)
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self(Quat::IDENTITY)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self(Vec3::ONE)
    }
}

/// Translation + rotation + scale as handed over by the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// 2D placement: position in the xy-plane, rotation about z, uniform scale.
    pub fn planar(x: f32, y: f32, z: f32, angle: f32, scale: f32) -> Self {
        Self {
            translation: Vec3::new(x, y, z),
            rotation: Quat::from_rotation_z(angle),
            scale: Vec3::splat(scale),
        }
    }

    pub fn from_components(pos: &Position, rot: &Rotation, scale: &Scale) -> Self {
        Self {
            translation: pos.0,
            rotation: rot.0,
            scale: scale.0,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Payload stored per slot. Unused slots hold `SENTINEL`, which must render
/// as nothing when a full chunk is drawn.
pub trait InstanceData: Pod {
    const SENTINEL: Self;
}

/// Off-screen depth used by the sentinel matrix.
pub const OFFSCREEN_Z: f32 = -1.0e6;

/// Column-major 4x4 model matrix, one per instance.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceMatrix(pub [f32; 16]);

impl InstanceMatrix {
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.0[12], self.0[13], self.0[14])
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl InstanceData for InstanceMatrix {
    // Zero scale, translated behind the camera.
    const SENTINEL: Self = Self([
        0.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, OFFSCREEN_Z, 1.0,
    ]);
}

impl From<Transform> for InstanceMatrix {
    fn from(t: Transform) -> Self {
        Self(Mat4::from_scale_rotation_translation(t.scale, t.rotation, t.translation).to_cols_array())
    }
}

impl Default for InstanceMatrix {
    fn default() -> Self {
        Self(Mat4::IDENTITY.to_cols_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_is_one() {
        let s = Scale::default();
        assert_eq!(s.0, Vec3::ONE);
    }

    #[test]
    fn instance_matrix_is_pod() {
        let m = InstanceMatrix::default();
        let bytes = bytemuck::bytes_of(&m);
        assert_eq!(bytes.len(), 64); // 16 floats * 4 bytes
    }

    #[test]
    fn transform_converts_to_column_major_matrix() {
        let m = InstanceMatrix::from(Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(m.translation(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.0[0], 1.0);
        assert!(!m.is_sentinel());
    }

    #[test]
    fn sentinel_has_zero_scale_and_sits_offscreen() {
        let s = InstanceMatrix::SENTINEL;
        let mat = Mat4::from_cols_array(&s.0);
        // Any vertex collapses onto the off-screen translation.
        let p = mat.transform_point3(Vec3::new(5.0, -3.0, 2.0));
        assert_eq!(p, Vec3::new(0.0, 0.0, OFFSCREEN_Z));
    }

    #[test]
    fn planar_transform_rotates_about_z() {
        let t = Transform::planar(1.0, 2.0, 0.0, std::f32::consts::FRAC_PI_2, 2.0);
        let mat = Mat4::from_cols_array(&InstanceMatrix::from(t).0);
        let p = mat.transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 4.0, 0.0)).length() < 1e-5);
    }
}
