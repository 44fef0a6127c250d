//! Fixed-capacity chunked slab of instance payloads.
//!
//! Live instances are densely packed: global indices `0..live` are occupied,
//! everything after holds `T::SENTINEL`. Each chunk is one instanced draw
//! call, so every chunk but the last is always full.
//!
//! Removal is swap-with-last: the last live instance moves into the vacated
//! slot and its owner is reported back, so at most one handle changes per
//! removal. Chunks that fall out of use stay allocated as spares and are
//! re-used on growth; the store never allocates after it has reached its
//! peak size unless `release_spare_chunks` is called.

use tracing::{debug, error, trace};

use crate::components::InstanceData;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::{Handle, Relocation, Removed};

pub struct ChunkedStore<T: InstanceData, O> {
    capacity: usize,
    /// Allocated chunks; the first `chunk_count()` are in use.
    chunks: Vec<Box<[T]>>,
    /// Owner of each live instance, indexed by global index.
    owners: Vec<O>,
}

impl<T: InstanceData, O: Copy> ChunkedStore<T, O> {
    /// Create a store with chunks of `config.chunk_capacity` slots.
    /// The config must already be validated.
    pub fn new(config: &PoolConfig) -> Self {
        debug_assert!(config.validate().is_ok());
        let capacity = config.chunk_capacity.max(1);
        let mut store = Self {
            capacity,
            chunks: Vec::with_capacity(config.prewarm_chunks),
            owners: Vec::with_capacity(config.prewarm_chunks * capacity),
        };
        for _ in 0..config.prewarm_chunks {
            store.chunks.push(Self::sentinel_chunk(capacity));
        }
        store
    }

    fn sentinel_chunk(capacity: usize) -> Box<[T]> {
        vec![T::SENTINEL; capacity].into_boxed_slice()
    }

    /// Slots per chunk.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Chunks holding at least one live instance: `ceil(live / capacity)`.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.live_count().div_ceil(self.capacity)
    }

    /// Chunks currently allocated, in use or spare.
    #[inline]
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Live instances in the last in-use chunk, 0 when the store is empty.
    pub fn last_chunk_live_len(&self) -> usize {
        match self.chunk_count() {
            0 => 0,
            n => self.live_count() - (n - 1) * self.capacity,
        }
    }

    /// Live instances in chunk `index`.
    pub fn chunk_live_len(&self, index: usize) -> usize {
        let count = self.chunk_count();
        if index + 1 < count {
            self.capacity
        } else if index + 1 == count {
            self.last_chunk_live_len()
        } else {
            0
        }
    }

    /// Append an instance. O(1) amortized; only allocates when a new chunk
    /// is needed and no spare is available.
    pub fn add(&mut self, value: T, owner: O) -> Handle {
        let global = self.live_count();
        let handle = Handle::from_global(global, self.capacity);
        if handle.slot() == 0 && handle.chunk() == self.chunks.len() {
            self.chunks.push(Self::sentinel_chunk(self.capacity));
            debug!(
                chunks = self.chunks.len(),
                capacity = self.capacity,
                "allocated instance chunk"
            );
        }
        self.chunks[handle.chunk()][handle.slot()] = value;
        self.owners.push(owner);
        handle
    }

    /// Overwrite the payload at `handle` in place.
    pub fn update(&mut self, handle: Handle, value: T) -> Result<(), PoolError> {
        self.validate(handle)?;
        self.chunks[handle.chunk()][handle.slot()] = value;
        Ok(())
    }

    /// Swap-remove the instance at `handle`.
    ///
    /// The last live instance is moved into the vacated slot, the old last
    /// slot is reset to the sentinel and the live count drops by one.
    pub fn remove(&mut self, handle: Handle) -> Result<Removed<O>, PoolError> {
        self.validate(handle)?;

        let last = Handle::from_global(self.live_count() - 1, self.capacity);
        let relocated = if handle.global() != last.global() {
            let moved = self.chunks[last.chunk()][last.slot()];
            self.chunks[handle.chunk()][handle.slot()] = moved;
            let owner = self.owners[last.global()];
            trace!(from = last.global(), to = handle.global(), "relocated instance");
            Some(Relocation {
                owner,
                from: last,
                to: handle,
            })
        } else {
            None
        };
        self.chunks[last.chunk()][last.slot()] = T::SENTINEL;
        let owner = self.owners.swap_remove(handle.global());

        if last.slot() == 0 {
            trace!(chunk = last.chunk(), "trailing chunk emptied");
        }

        Ok(Removed { owner, relocated })
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.validate_quiet(handle)
            .then(|| &self.chunks[handle.chunk()][handle.slot()])
    }

    pub fn owner(&self, handle: Handle) -> Option<O> {
        self.validate_quiet(handle)
            .then(|| self.owners[handle.global()])
    }

    /// Payload at a dense global index.
    pub fn get_global(&self, global: usize) -> Option<&T> {
        (global < self.live_count()).then(|| {
            let h = Handle::from_global(global, self.capacity);
            &self.chunks[h.chunk()][h.slot()]
        })
    }

    /// Full slice of chunk `index`, tail slots included.
    pub fn chunk(&self, index: usize) -> Option<&[T]> {
        self.chunks.get(index).map(|c| &c[..])
    }

    /// Number of chunks the draw pass may read, clamped to what is allocated.
    pub fn drawable_chunks(&self) -> usize {
        let needed = self.chunk_count();
        debug_assert!(
            needed <= self.chunks.len(),
            "{needed} chunks needed, {} allocated",
            self.chunks.len()
        );
        if needed > self.chunks.len() {
            error!(
                live = self.live_count(),
                chunks = self.chunks.len(),
                "capacity invariant violated, clamping draw range"
            );
            return self.chunks.len();
        }
        needed
    }

    /// Iterate in-use chunks as `(full chunk slice, live instances)`.
    pub fn iter_chunks(&self) -> impl Iterator<Item = (&[T], usize)> + '_ {
        (0..self.drawable_chunks()).map(move |i| (&self.chunks[i][..], self.chunk_live_len(i)))
    }

    /// Owners in global-index order.
    pub fn owners(&self) -> &[O] {
        &self.owners
    }

    /// Mark the store empty. Live slots are reset to the sentinel; chunks
    /// stay allocated.
    pub fn clear(&mut self) {
        let live = self.live_count();
        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            let start = i * self.capacity;
            if start >= live {
                break;
            }
            let end = (live - start).min(self.capacity);
            chunk[..end].fill(T::SENTINEL);
        }
        self.owners.clear();
    }

    /// Free chunks beyond those in use. Returns how many were released.
    pub fn release_spare_chunks(&mut self) -> usize {
        let keep = self.chunk_count();
        let released = self.chunks.len().saturating_sub(keep);
        self.chunks.truncate(keep);
        self.chunks.shrink_to_fit();
        self.owners.shrink_to_fit();
        released
    }

    /// Full consistency check: chunk count, chunk sizes, sentinel tail.
    pub fn check_invariants(&self) -> Result<(), PoolError> {
        let violation = || PoolError::CapacityInvariant {
            live: self.live_count(),
            chunks: self.chunks.len(),
            capacity: self.capacity,
        };
        if self.chunk_count() > self.chunks.len() {
            return Err(violation());
        }
        if self.chunks.iter().any(|c| c.len() != self.capacity) {
            return Err(violation());
        }
        let live = self.live_count();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let first_free = live.saturating_sub(i * self.capacity).min(self.capacity);
            if chunk[first_free..]
                .iter()
                .any(|v| bytemuck::bytes_of(v) != bytemuck::bytes_of(&T::SENTINEL))
            {
                return Err(violation());
            }
        }
        Ok(())
    }

    fn validate_quiet(&self, handle: Handle) -> bool {
        handle.global() < self.live_count() && handle.is_consistent(self.capacity)
    }

    fn validate(&self, handle: Handle) -> Result<(), PoolError> {
        if self.validate_quiet(handle) {
            return Ok(());
        }
        let (chunk, slot, global) = handle.raw_parts();
        error!(chunk, slot, global, live = self.live_count(), "stale instance handle");
        Err(PoolError::StaleHandle {
            chunk,
            slot,
            global,
            live: self.live_count(),
        })
    }
}
