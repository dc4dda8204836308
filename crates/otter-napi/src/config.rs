//! Configuration for runtimes created by this crate.

use serde::{Deserialize, Serialize};

/// Largest word count accepted by the bigint word bridge by default.
pub const DEFAULT_BIGINT_MAX_WORDS: usize = 20;

/// Engine-level settings applied when a [`Runtime`](crate::Runtime) is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum native stack the engine may use, in bytes.
    /// Default: 1 GiB
    pub max_stack_size: usize,

    /// Heap limit passed to the engine allocator.
    /// Default: unlimited
    pub memory_limit: Option<usize>,

    /// Allocation volume that triggers an automatic GC cycle.
    /// Default: engine default
    pub gc_threshold: Option<usize>,

    /// Maximum number of 64-bit words accepted or produced by the bigint word bridge.
    /// Default: 20
    pub bigint_max_words: usize,

    /// Install a script-visible `gc()` function on every environment.
    /// Default: true
    pub install_gc_global: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 1024 * 1024 * 1024,
            memory_limit: None,
            gc_threshold: None,
            bigint_max_words: DEFAULT_BIGINT_MAX_WORDS,
            install_gc_global: true,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    pub fn with_bigint_max_words(mut self, words: usize) -> Self {
        self.bigint_max_words = words;
        self
    }

    pub fn with_gc_global(mut self, install: bool) -> Self {
        self.install_gc_global = install;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_stack_size, 1 << 30);
        assert_eq!(config.bigint_max_words, 20);
        assert!(config.install_gc_global);
        assert!(config.memory_limit.is_none());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .with_max_stack_size(512 * 1024)
            .with_memory_limit(64 << 20)
            .with_bigint_max_words(4)
            .with_gc_global(false);
        assert_eq!(config.max_stack_size, 512 * 1024);
        assert_eq!(config.memory_limit, Some(64 << 20));
        assert_eq!(config.bigint_max_words, 4);
        assert!(!config.install_gc_global);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "bigint_max_words": 8 }"#).unwrap();
        assert_eq!(config.bigint_max_words, 8);
        assert_eq!(config.max_stack_size, RuntimeConfig::default().max_stack_size);

        let json = serde_json::to_string(&config).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
