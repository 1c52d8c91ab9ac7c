//! Process-wide configuration for the lazily-initialized singleton in
//! [`crate::registry`].
//!
//! There is no file- or environment-based configuration format at this
//! scope; the only environment input that matters is `RUST_LOG`, and that
//! is consumed by whatever `log` backend the embedding binary installs, not
//! by this crate.

/// Tunables consulted once, by the first call that initializes the
/// process-wide [`crate::registry::Registry`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Hint for the registry's initial hash map capacity.
    pub initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { initial_capacity: 8 }
    }
}
