//! # Config - spill tuning knobs
//!
//! All tuning for the spilling sorted set is supplied programmatically by the
//! host. Nothing in the library reads the environment; the `cli` crate maps
//! its environment variables onto [`SpillConfig`].
//!
//! ```text
//! buffer_persist_threshold   entries buffered in memory before a persist   (1000)
//! max_open_segments          segment count that triggers compaction       (100, 0 = off)
//! retries_per_factory        extra attempts per handle factory            (2)
//! persist_options            post-write verification of every segment
//! ```

use thiserror::Error;

/// Default number of buffered entries that triggers a persist.
pub const DEFAULT_BUFFER_PERSIST_THRESHOLD: usize = 1000;

/// Default number of persisted segments kept open before compaction.
pub const DEFAULT_MAX_OPEN_SEGMENTS: usize = 100;

/// Default number of retries per handle factory (so `retries + 1` attempts).
pub const DEFAULT_RETRIES_PER_FACTORY: usize = 2;

/// Default number of leading elements re-read when verifying a written file.
pub const DEFAULT_ELEMENTS_TO_VERIFY: usize = 100;

/// Errors raised by [`SpillConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer_persist_threshold must be greater than zero")]
    ZeroThreshold,
}

/// Controls what is checked after a sorted set file has been written. A
/// file that comes back empty is always rejected.
///
/// Verification re-opens the file: the first `elements_to_verify` records are
/// decoded and compared against what was written, and the trailing count is
/// compared against the number of records written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOptions {
    pub verify_size: bool,
    pub verify_elements: bool,
    pub elements_to_verify: usize,
}

impl PersistOptions {
    /// Enables or disables both checks at once.
    pub fn verify(verify: bool) -> Self {
        Self {
            verify_size: verify,
            verify_elements: verify,
            elements_to_verify: DEFAULT_ELEMENTS_TO_VERIFY,
        }
    }

    /// Number of elements that will be sampled, `0` if element checks are off.
    #[must_use]
    pub fn sample_len(&self) -> usize {
        if self.verify_elements {
            self.elements_to_verify
        } else {
            0
        }
    }
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self::verify(true)
    }
}

/// Tuning for a spilling sorted set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillConfig {
    pub buffer_persist_threshold: usize,
    pub max_open_segments: usize,
    pub retries_per_factory: usize,
    pub persist_options: PersistOptions,
}

impl SpillConfig {
    pub fn with_buffer_persist_threshold(mut self, threshold: usize) -> Self {
        self.buffer_persist_threshold = threshold;
        self
    }

    pub fn with_max_open_segments(mut self, max: usize) -> Self {
        self.max_open_segments = max;
        self
    }

    pub fn with_retries_per_factory(mut self, retries: usize) -> Self {
        self.retries_per_factory = retries;
        self
    }

    pub fn with_persist_options(mut self, options: PersistOptions) -> Self {
        self.persist_options = options;
        self
    }

    /// Total number of persist attempts made against a single factory.
    #[must_use]
    pub fn attempts_per_factory(&self) -> usize {
        self.retries_per_factory + 1
    }

    /// Rejects configurations the spilling set cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_persist_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        Ok(())
    }
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            buffer_persist_threshold: DEFAULT_BUFFER_PERSIST_THRESHOLD,
            max_open_segments: DEFAULT_MAX_OPEN_SEGMENTS,
            retries_per_factory: DEFAULT_RETRIES_PER_FACTORY,
            persist_options: PersistOptions::default(),
        }
    }
}
