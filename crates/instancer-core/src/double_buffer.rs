//! N-way buffer rotation with exactly one build slot and one draw slot.
//!
//! ```text
//!   build_index ──► [ R ]  written by the round being assembled
//!   draw_index  ──► [ R ]  read by every visual frame
//!
//!   switch(): reset the slot that becomes the next build target,
//!             then advance build_index.
//! ```
//!
//! `draw_index = (build_index - 1 + N) mod N`, so for `N == 2` the slot that
//! gets reset on a switch is the one that was being drawn.

/// Contents that can be emptied for re-use without freeing storage.
pub trait Reset {
    fn reset(&mut self);
}

pub struct MultiBuffer<R, const N: usize> {
    buffers: [R; N],
    build_index: usize,
}

/// The common case: one buffer built while the other is drawn.
pub type DoubleBuffer<R> = MultiBuffer<R, 2>;

impl<R: Reset, const N: usize> MultiBuffer<R, N> {
    /// Build from pre-constructed slots. Slot 0 is the first build target.
    pub fn new(buffers: [R; N]) -> Self {
        const { assert!(N >= 2, "a multi-buffer needs at least two slots") };
        Self {
            buffers,
            build_index: 0,
        }
    }

    pub fn from_fn(f: impl FnMut(usize) -> R) -> Self {
        Self::new(std::array::from_fn(f))
    }

    /// The slot currently being written.
    #[inline]
    pub fn build(&mut self) -> &mut R {
        &mut self.buffers[self.build_index]
    }

    /// Read-only view of the slot currently being written.
    #[inline]
    pub fn build_ref(&self) -> &R {
        &self.buffers[self.build_index]
    }

    /// The slot currently being drawn. Never the build slot.
    #[inline]
    pub fn active(&self) -> &R {
        &self.buffers[self.draw_index()]
    }

    /// Reset the next build target and make the current build slot active.
    pub fn switch(&mut self) {
        let next = (self.build_index + 1) % N;
        self.buffers[next].reset();
        self.build_index = next;
    }

    #[inline]
    pub fn build_index(&self) -> usize {
        self.build_index
    }

    #[inline]
    pub fn draw_index(&self) -> usize {
        (self.build_index + N - 1) % N
    }

    /// Apply `f` to every slot regardless of role.
    pub fn for_each_mut(&mut self, f: impl FnMut(&mut R)) {
        self.buffers.iter_mut().for_each(f);
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.buffers.iter()
    }
}
