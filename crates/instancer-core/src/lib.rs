use wasm_bindgen::prelude::*;

pub mod chunked_store;
pub mod components;
pub mod config;
pub mod double_buffer;
pub mod draw;
pub mod engine;
pub mod error;
pub mod handle;
pub mod instance_set;
pub mod properties;
pub mod registry;
pub mod systems;

pub use chunked_store::ChunkedStore;
pub use components::{InstanceData, InstanceMatrix, Transform, Visual};
pub use config::{PoolConfig, RenderSettings};
pub use draw::{DrawBackend, DrawCall, DrawStats, FlatDrawList, FrameContext};
pub use engine::Engine;
pub use error::PoolError;
pub use handle::{BatchId, EntityHandle, Handle, HandleSink};
pub use instance_set::InstanceSet;
pub use properties::{CircuitProperties, ParticleProperties, PinProperties, PropertyKey, Rgba8};

use config::MAX_INSTANCES_PER_DRAW;
use properties::{FLAG_BEEPING, FLAG_CONNECTOR, FLAG_DELAYED, FLAG_SINGLETON};

/// Build a [`Visual`] from the flat values the host passes across the
/// boundary. `category`: 0 particle, 1 pin, 2 circuit line.
pub fn visual_from_raw(category: u8, rgba: u32, flags: u32, pins_per_side: u8) -> Option<Visual> {
    let color = Rgba8::from_u32(rgba);
    let delayed = flags & FLAG_DELAYED != 0;
    let beeping = flags & FLAG_BEEPING != 0;
    match category {
        0 => Some(Visual::Particle(ParticleProperties {
            color,
            delayed,
            beeping,
            singleton: flags & FLAG_SINGLETON != 0,
        })),
        1 => Some(Visual::Pin(PinProperties {
            color,
            pins_per_side,
            delayed,
            beeping,
            singleton: flags & FLAG_SINGLETON != 0,
        })),
        2 => Some(Visual::Circuit(CircuitProperties {
            color,
            delayed,
            beeping,
            connector: flags & FLAG_CONNECTOR != 0,
        })),
        _ => None,
    }
}

/// Engine handle owned by the host. Each renderer is independent.
#[wasm_bindgen]
pub struct WasmRenderer {
    engine: Engine,
    draws: FlatDrawList,
}

#[wasm_bindgen]
impl WasmRenderer {
    /// `chunk_capacity` of 0 selects the default of 1023 instances per draw.
    /// Larger values than the per-draw limit fall back to the default.
    #[wasm_bindgen(constructor)]
    pub fn new(chunk_capacity: u32) -> WasmRenderer {
        let config = match chunk_capacity as usize {
            0 => PoolConfig::default(),
            n if n > MAX_INSTANCES_PER_DRAW => {
                tracing::warn!(chunk_capacity, "capacity above draw limit, using default");
                PoolConfig::default()
            }
            n => PoolConfig::new(n).unwrap_or_default(),
        };
        WasmRenderer {
            engine: Engine::with_config(config, RenderSettings::default()),
            draws: FlatDrawList::new(),
        }
    }

    /// Returns false if `category` is unknown or the ID is out of range.
    pub fn spawn(&mut self, external_id: u32, category: u8, rgba: u32, flags: u32, pins_per_side: u8) -> bool {
        match visual_from_raw(category, rgba, flags, pins_per_side) {
            Some(visual) => self
                .engine
                .spawn(external_id, visual, Transform::IDENTITY)
                .is_ok(),
            None => false,
        }
    }

    pub fn set_visual(&mut self, external_id: u32, category: u8, rgba: u32, flags: u32, pins_per_side: u8) -> bool {
        match visual_from_raw(category, rgba, flags, pins_per_side) {
            Some(visual) => self.engine.set_visual(external_id, visual).is_ok(),
            None => false,
        }
    }

    pub fn set_transform(&mut self, external_id: u32, x: f32, y: f32, z: f32, angle: f32, scale: f32) -> bool {
        self.engine
            .set_transform(external_id, Transform::planar(x, y, z, angle, scale))
            .is_ok()
    }

    /// Returns false if no entity has this ID.
    pub fn despawn(&mut self, external_id: u32) -> bool {
        self.engine.despawn(external_id).is_ok()
    }

    /// Publish the round. Returns the number of entities pushed at the end.
    pub fn end_round(&mut self) -> u32 {
        self.engine.end_round() as u32
    }

    /// Advance the frame clock. `dt` is seconds since last frame.
    pub fn update(&mut self, dt: f32) {
        self.engine.update(dt);
    }

    pub fn round_progress(&self) -> f32 {
        self.engine.round_progress()
    }

    pub fn round_count(&self) -> u64 {
        self.engine.round_count()
    }

    /// Rebuild the draw list for this frame. Returns the number of calls.
    pub fn collect_draws(&mut self) -> u32 {
        self.draws.begin_frame();
        self.engine.draw(&mut self.draws);
        self.draws.call_count()
    }

    /// Pointer to the draw table, 8 u32 per call. Null if empty.
    pub fn draw_table_ptr(&self) -> *const u32 {
        self.draws.table_ptr()
    }

    pub fn draw_table_len(&self) -> u32 {
        self.draws.table().len() as u32
    }

    /// Pointer to the packed instance matrices, 16 f32 per instance.
    pub fn instances_ptr(&self) -> *const f32 {
        self.draws.matrices_ptr()
    }

    pub fn instances_f32_len(&self) -> u32 {
        self.draws.matrices().len() as u32
    }

    pub fn set_display(&mut self, particles: bool, pins: bool, circuits: bool, connectors: bool, beeps: bool) {
        let settings = RenderSettings {
            show_particles: particles,
            show_pins: pins,
            show_circuits: circuits,
            show_connectors: connectors,
            highlight_beeps: beeps,
            ..*self.engine.settings()
        };
        self.engine.set_settings(settings);
    }

    pub fn release_spare_chunks(&mut self) -> u32 {
        self.engine.release_spare_chunks() as u32
    }
}
