use kernel_info::param::{NBUCKET, NBUF};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("the cache needs at least one bucket")]
    NoBuckets,
    #[error("every bucket needs at least one buffer")]
    NoBuffers,
}

/// Geometry of a [`BufferCache`](crate::BufferCache).
///
/// The default is [`NBUCKET`] buckets of [`NBUF`] buffers each. Prime bucket
/// counts spread consecutive block numbers best.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub buckets: usize,
    pub buffers_per_bucket: usize,
}

impl CacheConfig {
    #[must_use]
    pub const fn new(buckets: usize, buffers_per_bucket: usize) -> Self {
        Self {
            buckets,
            buffers_per_bucket,
        }
    }

    /// # Errors
    /// If either dimension is zero.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.buckets == 0 {
            return Err(ConfigError::NoBuckets);
        }
        if self.buffers_per_bucket == 0 {
            return Err(ConfigError::NoBuffers);
        }
        Ok(())
    }

    #[must_use]
    pub const fn total_buffers(&self) -> usize {
        self.buckets.saturating_mul(self.buffers_per_bucket)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(NBUCKET, NBUF)
    }
}
