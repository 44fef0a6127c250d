//! Property keys that group instances into batches, and the per-batch
//! parameters derived from them.
//!
//! A key is an immutable value; two keys are equal iff all fields are.
//! Parameters are derived once when the batch is created and again only
//! when the global [`RenderSettings`] change.

use std::fmt::Debug;
use std::hash::Hash;

use crate::config::RenderSettings;

/// 8-bit sRGB color with alpha. Hashable, unlike float colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpack `0xRRGGBBAA`.
    pub const fn from_u32(rgba: u32) -> Self {
        Self {
            r: (rgba >> 24) as u8,
            g: (rgba >> 16) as u8,
            b: (rgba >> 8) as u8,
            a: rgba as u8,
        }
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    /// Normalized `[r, g, b, a]` in `0.0..=1.0`.
    pub fn to_f32(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| c as f32 / 255.0)
    }
}

/// Key that selects the batch an instance is drawn with.
pub trait PropertyKey: Clone + Eq + Hash + Debug {
    type Params: BatchParams;

    /// Derive the shared per-batch parameters from this key.
    fn derive_params(&self, settings: &RenderSettings) -> Self::Params;
}

/// Shared per-batch parameters as seen by the draw dispatcher.
pub trait BatchParams {
    /// Invisible batches are skipped by the dispatcher.
    fn is_visible(&self) -> bool {
        true
    }
}

/// Mesh a batch is drawn with; the backend owns the actual mesh objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MeshKind {
    Particle = 0,
    Pin = 1,
    CircuitLine = 2,
    Connector = 3,
}

pub const FLAG_DELAYED: u32 = 1 << 0;
pub const FLAG_BEEPING: u32 = 1 << 1;
pub const FLAG_SINGLETON: u32 = 1 << 2;
pub const FLAG_CONNECTOR: u32 = 1 << 3;

/// Parameter block every category derives. Mirrors a material property
/// block: one per batch, shared by all its instances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedParams {
    pub mesh: MeshKind,
    /// Linear RGBA.
    pub color: [f32; 4],
    pub flags: u32,
    pub pins_per_side: u32,
    /// Fraction of a round the animation of this batch lags behind.
    pub animation_offset: f32,
    pub visible: bool,
}

impl BatchParams for SharedParams {
    fn is_visible(&self) -> bool {
        self.visible
    }
}

fn flag_bits(delayed: bool, beeping: bool, singleton: bool, connector: bool) -> u32 {
    let mut flags = 0;
    if delayed {
        flags |= FLAG_DELAYED;
    }
    if beeping {
        flags |= FLAG_BEEPING;
    }
    if singleton {
        flags |= FLAG_SINGLETON;
    }
    if connector {
        flags |= FLAG_CONNECTOR;
    }
    flags
}

fn shared(
    mesh: MeshKind,
    color: Rgba8,
    flags: u32,
    pins_per_side: u32,
    visible: bool,
    settings: &RenderSettings,
) -> SharedParams {
    let color = if flags & FLAG_BEEPING != 0 && settings.highlight_beeps {
        settings.beep_color
    } else {
        color
    };
    SharedParams {
        mesh,
        color: color.to_f32(),
        flags,
        pins_per_side,
        animation_offset: if flags & FLAG_DELAYED != 0 {
            settings.delay_offset
        } else {
            0.0
        },
        visible,
    }
}

/// Particle body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParticleProperties {
    pub color: Rgba8,
    pub delayed: bool,
    pub beeping: bool,
    pub singleton: bool,
}

impl PropertyKey for ParticleProperties {
    type Params = SharedParams;

    fn derive_params(&self, settings: &RenderSettings) -> SharedParams {
        shared(
            MeshKind::Particle,
            self.color,
            flag_bits(self.delayed, self.beeping, self.singleton, false),
            0,
            settings.show_particles,
            settings,
        )
    }
}

/// Pins drawn around a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PinProperties {
    pub color: Rgba8,
    pub pins_per_side: u8,
    pub delayed: bool,
    pub beeping: bool,
    pub singleton: bool,
}

impl PropertyKey for PinProperties {
    type Params = SharedParams;

    fn derive_params(&self, settings: &RenderSettings) -> SharedParams {
        shared(
            MeshKind::Pin,
            self.color,
            flag_bits(self.delayed, self.beeping, self.singleton, false),
            u32::from(self.pins_per_side),
            settings.show_pins,
            settings,
        )
    }
}

/// Circuit line between pins; `connector` lines join partition sets
/// inside a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CircuitProperties {
    pub color: Rgba8,
    pub delayed: bool,
    pub beeping: bool,
    pub connector: bool,
}

impl PropertyKey for CircuitProperties {
    type Params = SharedParams;

    fn derive_params(&self, settings: &RenderSettings) -> SharedParams {
        let (mesh, visible) = if self.connector {
            (
                MeshKind::Connector,
                settings.show_circuits && settings.show_connectors,
            )
        } else {
            (MeshKind::CircuitLine, settings.show_circuits)
        };
        shared(
            mesh,
            self.color,
            flag_bits(self.delayed, self.beeping, false, self.connector),
            0,
            visible,
            settings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba8 = Rgba8::new(255, 0, 0, 255);

    #[test]
    fn rgba_round_trips_through_u32() {
        let c = Rgba8::from_u32(0x11223344);
        assert_eq!(c, Rgba8::new(0x11, 0x22, 0x33, 0x44));
        assert_eq!(c.to_u32(), 0x11223344);
    }

    #[test]
    fn keys_differing_in_one_flag_are_distinct() {
        let a = PinProperties {
            color: RED,
            pins_per_side: 2,
            ..Default::default()
        };
        let b = PinProperties { beeping: true, ..a };
        assert_ne!(a, b);
        assert_eq!(a, PinProperties { ..a });
    }

    #[test]
    fn beeping_uses_highlight_color() {
        let settings = RenderSettings::default();
        let key = ParticleProperties {
            color: RED,
            beeping: true,
            ..Default::default()
        };
        let params = key.derive_params(&settings);
        assert_eq!(params.color, settings.beep_color.to_f32());
        assert_eq!(params.flags, FLAG_BEEPING);

        let plain = RenderSettings {
            highlight_beeps: false,
            ..settings
        };
        assert_eq!(key.derive_params(&plain).color, RED.to_f32());
    }

    #[test]
    fn delayed_batches_get_animation_offset() {
        let settings = RenderSettings::default();
        let key = CircuitProperties {
            delayed: true,
            ..Default::default()
        };
        let params = key.derive_params(&settings);
        assert_eq!(params.animation_offset, settings.delay_offset);
        assert_eq!(params.mesh, MeshKind::CircuitLine);
    }

    #[test]
    fn connector_visibility_follows_both_toggles() {
        let key = CircuitProperties {
            connector: true,
            ..Default::default()
        };
        let hidden = RenderSettings {
            show_connectors: false,
            ..Default::default()
        };
        assert!(!key.derive_params(&hidden).is_visible());
        assert!(key.derive_params(&RenderSettings::default()).is_visible());
        assert_eq!(
            key.derive_params(&RenderSettings::default()).mesh,
            MeshKind::Connector
        );
    }
}
