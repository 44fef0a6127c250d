//! Pool construction parameters and global rendering settings.

use crate::error::PoolError;
use crate::properties::Rgba8;

/// Hardware limit on instances per instanced draw call.
pub const MAX_INSTANCES_PER_DRAW: usize = 1023;

/// Default simulation round length in seconds.
pub const DEFAULT_ROUND_DURATION: f32 = 0.5;

/// Sizing of every chunked store created from this config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Slots per chunk; one chunk is drawn with one instanced call.
    pub chunk_capacity: usize,
    /// Chunks allocated up front by each new store.
    pub prewarm_chunks: usize,
}

impl PoolConfig {
    /// Config with the given chunk capacity and no prewarmed chunks.
    pub fn new(chunk_capacity: usize) -> Result<Self, PoolError> {
        let config = Self {
            chunk_capacity,
            prewarm_chunks: 0,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_prewarm(mut self, chunks: usize) -> Self {
        self.prewarm_chunks = chunks;
        self
    }

    /// Reject capacities the handle encoding cannot address.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.chunk_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "chunk capacity must be at least 1".into(),
            ));
        }
        if self.chunk_capacity > u32::MAX as usize {
            return Err(PoolError::InvalidConfig(format!(
                "chunk capacity {} exceeds u32 slot range",
                self.chunk_capacity
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: MAX_INSTANCES_PER_DRAW,
            prewarm_chunks: 0,
        }
    }
}

/// Global rendering toggles. Batch parameters are derived from these plus
/// the batch's property key; changing them re-derives every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub show_particles: bool,
    pub show_pins: bool,
    pub show_circuits: bool,
    pub show_connectors: bool,
    /// Replace the color of beeping primitives with `beep_color`.
    pub highlight_beeps: bool,
    pub beep_color: Rgba8,
    /// Animation offset (fraction of a round) applied to delayed batches.
    pub delay_offset: f32,
    /// Seconds one simulation round stays on screen.
    pub round_duration: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            show_particles: true,
            show_pins: true,
            show_circuits: true,
            show_connectors: true,
            highlight_beeps: true,
            beep_color: Rgba8::new(255, 255, 255, 255),
            delay_offset: 0.5,
            round_duration: DEFAULT_ROUND_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_hardware_limit() {
        assert_eq!(PoolConfig::default().chunk_capacity, 1023);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            PoolConfig::new(0),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn prewarm_is_recorded() {
        let config = PoolConfig::new(16).unwrap().with_prewarm(3);
        assert_eq!(config.chunk_capacity, 16);
        assert_eq!(config.prewarm_chunks, 3);
    }
}
