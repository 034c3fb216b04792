//! Store configuration and per-call mutation options.

use serde::{Deserialize, Serialize};

use crate::normalizer::DEFAULT_MAX_DEPTH;

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Nested levels expanded by reads before related records degrade to
    /// `{id}` stubs.
    pub max_depth: usize,
    /// Per-watch-stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            stream_capacity: 1024,
        }
    }
}

/// Options accepted by every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOptions {
    /// Apply the mutation without notifying subscribers or watch streams.
    #[serde(default)]
    pub background: bool,
}

impl MutationOptions {
    /// A mutation that does not notify.
    #[must_use]
    pub const fn background() -> Self {
        Self { background: true }
    }

    /// A mutation that notifies once it has been applied.
    #[must_use]
    pub const fn foreground() -> Self {
        Self { background: false }
    }
}
