//! Error type shared by every pool operation.
//!
//! None of these unwind past a single entity's operation: the failing call is
//! logged where it is detected and becomes a no-op.

use thiserror::Error;

/// Errors reported by the instance pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// `remove`/`update` with a handle outside the store's live range.
    #[error("stale handle: chunk {chunk}, slot {slot} (global {global}) with {live} live instances")]
    StaleHandle {
        chunk: u32,
        slot: u32,
        global: u32,
        live: usize,
    },

    /// The handle names a batch the build registry does not hold.
    #[error("unknown batch {0}")]
    UnknownBatch(u32),

    /// The same owner was pushed twice between two buffer switches.
    #[error("duplicate registration of {0} in the current build phase")]
    DuplicateRegistration(String),

    /// Live count and chunk count disagree.
    #[error("capacity invariant violated: {live} live instances over {chunks} chunks of {capacity}")]
    CapacityInvariant {
        live: usize,
        chunks: usize,
        capacity: usize,
    },

    /// The build buffer was marked ready and no longer accepts pushes.
    #[error("build buffer is sealed until the next switch")]
    BuildSealed,

    /// No scene entity is registered under this external ID.
    #[error("unknown entity id {0}")]
    UnknownEntity(u32),

    /// External IDs index a dense table and must stay below a fixed bound.
    #[error("entity id {id} exceeds maximum {max}")]
    IdOutOfRange { id: u32, max: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
