//! Draw dispatch: one instanced draw call per in-use chunk of every batch.
//!
//! The dispatcher owns no GPU state. Meshes, materials and the actual draw
//! primitive live behind [`DrawBackend`].

use crate::components::{InstanceData, InstanceMatrix};
use crate::handle::BatchId;
use crate::properties::{BatchParams, PropertyKey, SharedParams};
use crate::registry::Registry;

/// Per-frame values shared by every call of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    /// Progress through the current round, `0.0..=1.0`.
    pub round_progress: f32,
}

/// One instanced draw.
pub struct DrawCall<'a, P, T> {
    pub batch: BatchId,
    pub chunk: usize,
    pub params: &'a P,
    /// The whole chunk; slots past `count` hold the sentinel.
    pub instances: &'a [T],
    pub count: usize,
    pub frame: FrameContext,
}

pub trait DrawBackend<P, T> {
    fn draw_instanced(&mut self, call: DrawCall<'_, P, T>);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draw_calls: usize,
    pub instances: usize,
    /// Batches with live instances that were hidden by their parameters.
    pub skipped_batches: usize,
}

impl std::ops::AddAssign for DrawStats {
    fn add_assign(&mut self, rhs: Self) {
        self.draw_calls += rhs.draw_calls;
        self.instances += rhs.instances;
        self.skipped_batches += rhs.skipped_batches;
    }
}

/// Issue the draw calls for every live batch of `registry`.
///
/// Chunk `i` is drawn with `capacity` instances unless it is the last in-use
/// chunk, which is drawn with its live length. Empty batches issue nothing.
pub fn dispatch<K, T, O, B>(
    registry: &Registry<K, T, O>,
    frame: FrameContext,
    backend: &mut B,
) -> DrawStats
where
    K: PropertyKey,
    T: InstanceData,
    O: Copy,
    B: DrawBackend<K::Params, T> + ?Sized,
{
    let mut stats = DrawStats::default();
    for batch in registry.iter() {
        let store = batch.store();
        if store.is_empty() {
            continue;
        }
        if !batch.params().is_visible() {
            stats.skipped_batches += 1;
            continue;
        }
        for (chunk, (instances, count)) in store.iter_chunks().enumerate() {
            backend.draw_instanced(DrawCall {
                batch: batch.id(),
                chunk,
                params: batch.params(),
                instances,
                count,
                frame,
            });
            stats.draw_calls += 1;
            stats.instances += count;
        }
    }
    stats
}

/// u32 words per draw-table entry of [`FlatDrawList`].
pub const DRAW_ENTRY_U32: usize = 8;

/// Backend that packs every call into two contiguous buffers for a host
/// renderer to upload: live instance matrices back to back, and a draw
/// table of `DRAW_ENTRY_U32` words per call:
///
/// `[mesh, batch, chunk, first_instance, instance_count, rgba, flags, pins_per_side]`
#[derive(Debug, Default)]
pub struct FlatDrawList {
    table: Vec<u32>,
    matrices: Vec<f32>,
    round_progress: f32,
}

impl FlatDrawList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the previous frame's contents, keeping capacity.
    pub fn begin_frame(&mut self) {
        self.table.clear();
        self.matrices.clear();
    }

    pub fn call_count(&self) -> u32 {
        (self.table.len() / DRAW_ENTRY_U32) as u32
    }

    pub fn table(&self) -> &[u32] {
        &self.table
    }

    pub fn matrices(&self) -> &[f32] {
        &self.matrices
    }

    pub fn matrix_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.matrices)
    }

    pub fn round_progress(&self) -> f32 {
        self.round_progress
    }

    /// Pointer to the draw table for WASM export. Returns null if empty.
    pub fn table_ptr(&self) -> *const u32 {
        if self.table.is_empty() {
            std::ptr::null()
        } else {
            self.table.as_ptr()
        }
    }

    /// Pointer to the matrix buffer for WASM export. Returns null if empty.
    pub fn matrices_ptr(&self) -> *const f32 {
        if self.matrices.is_empty() {
            std::ptr::null()
        } else {
            self.matrices.as_ptr()
        }
    }
}

fn pack_color(color: [f32; 4]) -> u32 {
    let [r, g, b, a] = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    u32::from_be_bytes([r, g, b, a])
}

impl DrawBackend<SharedParams, InstanceMatrix> for FlatDrawList {
    fn draw_instanced(&mut self, call: DrawCall<'_, SharedParams, InstanceMatrix>) {
        let first = (self.matrices.len() / 16) as u32;
        self.matrices
            .extend_from_slice(bytemuck::cast_slice(&call.instances[..call.count]));
        self.table.extend_from_slice(&[
            call.params.mesh as u32,
            call.batch.0,
            call.chunk as u32,
            first,
            call.count as u32,
            pack_color(call.params.color),
            call.params.flags,
            call.params.pins_per_side,
        ]);
        self.round_progress = call.frame.round_progress;
    }
}
