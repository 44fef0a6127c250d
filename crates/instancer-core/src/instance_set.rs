//! Double-buffered instance set for one rendering category.
//!
//! The simulation pushes a round into the build registry while every frame
//! keeps drawing the active registry. `switch_instances` publishes the
//! round: the previously active registry is emptied (chunks kept) and
//! becomes the next build target.
//!
//! Per-buffer lifecycle:
//!
//! ```text
//!   Idle ──add──► Building ──finish_build──► Ready
//!     ▲                 └────────switch─────────┴──► Drawing
//!     └──────────────── switch (reset) ◄─────────────┘
//! ```

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::{debug, error, warn};

use crate::components::InstanceData;
use crate::config::{PoolConfig, RenderSettings};
use crate::double_buffer::{DoubleBuffer, MultiBuffer, Reset};
use crate::draw::{DrawBackend, DrawStats, FrameContext, dispatch};
use crate::error::PoolError;
use crate::handle::{EntityHandle, HandleSink};
use crate::properties::PropertyKey;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Empty, nothing pushed since the last reset.
    Idle,
    Building,
    /// Build declared complete; waiting for the switch.
    Ready,
    Drawing,
}

/// Summary of one registry, for debug overlays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub batches: usize,
    pub live_instances: usize,
    pub chunks_in_use: usize,
    pub allocated_chunks: usize,
}

impl<K: PropertyKey, T: InstanceData, O: Copy> Reset for Registry<K, T, O> {
    fn reset(&mut self) {
        self.clear_all();
    }
}

pub struct InstanceSet<K: PropertyKey, T: InstanceData, O> {
    buffers: DoubleBuffer<Registry<K, T, O>>,
    states: [BufferState; 2],
    /// Owners pushed into the build registry since the last switch.
    registered: HashSet<O>,
    switches: u64,
}

impl<K, T, O> InstanceSet<K, T, O>
where
    K: PropertyKey,
    T: InstanceData,
    O: Copy + Eq + Hash + Debug,
{
    pub fn new(config: PoolConfig, settings: RenderSettings) -> Self {
        Self {
            buffers: MultiBuffer::from_fn(|_| Registry::new(config, settings)),
            states: [BufferState::Idle; 2],
            registered: HashSet::new(),
            switches: 0,
        }
    }

    /// Push one instance for this round into the build registry.
    pub fn add_entity(&mut self, key: &K, value: T, owner: O) -> Result<EntityHandle, PoolError> {
        let build = self.buffers.build_index();
        if self.states[build] == BufferState::Ready {
            warn!(?owner, "push into sealed build buffer ignored");
            return Err(PoolError::BuildSealed);
        }
        if !self.registered.insert(owner) {
            warn!(?owner, "duplicate registration ignored");
            return Err(PoolError::DuplicateRegistration(format!("{owner:?}")));
        }
        let batch = self.buffers.build().get_or_create(key);
        let slot = batch.store_mut().add(value, owner);
        self.states[build] = BufferState::Building;
        Ok(EntityHandle {
            batch: batch.id(),
            slot,
            round: self.switches,
        })
    }

    /// Overwrite an instance pushed earlier in this round.
    pub fn update(&mut self, handle: EntityHandle, value: T) -> Result<(), PoolError> {
        self.build_batch(handle)?
            .store_mut()
            .update(handle.slot, value)
    }

    /// Remove an instance pushed earlier in this round. If another instance
    /// had to move, its owner's new handle is sent to `sink`.
    pub fn remove(
        &mut self,
        handle: EntityHandle,
        sink: &mut impl HandleSink<O>,
    ) -> Result<O, PoolError> {
        let removed = self.build_batch(handle)?.store_mut().remove(handle.slot)?;
        self.registered.remove(&removed.owner);
        if let Some(moved) = removed.relocated {
            sink.relocate(
                moved.owner,
                EntityHandle {
                    batch: handle.batch,
                    slot: moved.to,
                    round: handle.round,
                },
            );
        }
        Ok(removed.owner)
    }

    /// Payload of an instance pushed earlier in this round.
    pub fn get(&self, handle: EntityHandle) -> Option<&T> {
        if handle.round != self.switches {
            return None;
        }
        self.buffers
            .build_ref()
            .batch(handle.batch)?
            .store()
            .get(handle.slot)
    }

    fn build_batch(
        &mut self,
        handle: EntityHandle,
    ) -> Result<&mut crate::registry::Batch<K, T, O>, PoolError> {
        if handle.round != self.switches {
            let (chunk, slot, global) = handle.slot.raw_parts();
            let live = self.buffers.build_ref().live_count();
            error!(
                round = handle.round,
                current = self.switches,
                "handle issued in an earlier round"
            );
            return Err(PoolError::StaleHandle {
                chunk,
                slot,
                global,
                live,
            });
        }
        self.buffers.build().batch_mut(handle.batch).ok_or_else(|| {
            error!(batch = handle.batch.0, "handle names unknown batch");
            PoolError::UnknownBatch(handle.batch.0)
        })
    }

    /// Declare the round complete. Further pushes are rejected until the
    /// switch; updates and removals stay allowed.
    pub fn finish_build(&mut self) {
        let build = self.buffers.build_index();
        self.states[build] = BufferState::Ready;
    }

    /// Publish the build registry and recycle the previously drawn one.
    /// Call once per round, after every push for that round.
    pub fn switch_instances(&mut self) {
        let published = self.buffers.build_index();
        self.states[published] = BufferState::Drawing;
        self.buffers.switch();
        self.states[self.buffers.build_index()] = BufferState::Idle;
        self.registered.clear();
        self.switches += 1;
        debug!(
            round = self.switches,
            live = self.buffers.active().live_count(),
            batches = self.buffers.active().len(),
            "switched instance buffers"
        );
    }

    /// Draw the active registry. Before the first switch this draws nothing.
    pub fn draw<B>(&self, frame: FrameContext, backend: &mut B) -> DrawStats
    where
        B: DrawBackend<K::Params, T> + ?Sized,
    {
        dispatch(self.buffers.active(), frame, backend)
    }

    pub fn active(&self) -> &Registry<K, T, O> {
        self.buffers.active()
    }

    pub fn build_state(&self) -> BufferState {
        self.states[self.buffers.build_index()]
    }

    pub fn active_state(&self) -> BufferState {
        self.states[self.buffers.draw_index()]
    }

    /// Completed switches.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Instances pushed into the build registry this round.
    pub fn pending_count(&self) -> usize {
        self.registered.len()
    }

    /// Re-derive every batch's parameters in both registries.
    pub fn set_settings(&mut self, settings: &RenderSettings) {
        self.buffers.for_each_mut(|r| r.reinit_all(settings));
    }

    pub fn release_spare_chunks(&mut self) -> usize {
        let mut released = 0;
        self.buffers
            .for_each_mut(|r| released += r.release_spare_chunks());
        released
    }

    pub fn active_stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        self.buffers.active().for_each(|b| {
            stats.batches += 1;
            stats.live_instances += b.store().live_count();
            stats.chunks_in_use += b.store().chunk_count();
            stats.allocated_chunks += b.store().allocated_chunks();
        });
        stats
    }

    /// Check every store of both registries.
    pub fn check_invariants(&self) -> Result<(), PoolError> {
        for registry in self.buffers.iter() {
            for batch in registry.iter() {
                batch.store().check_invariants()?;
            }
        }
        Ok(())
    }
}
