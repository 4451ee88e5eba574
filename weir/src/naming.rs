//! Default container naming.

use crate::lock;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Process-wide counter keyed by container kind, used to mint unique
/// human-readable default names (`"Parser1"`, `"Parser2"`, ...).
///
/// This is an explicit service rather than hidden static state: the
/// process-wide instance lives behind [`NameRegistry::global`], and tests
/// can build their own instances or [`reset`](NameRegistry::reset) the
/// global one.
pub struct NameRegistry {
    counters: Mutex<HashMap<String, u64>>,
}

impl NameRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static NameRegistry {
        static GLOBAL: OnceLock<NameRegistry> = OnceLock::new();
        GLOBAL.get_or_init(NameRegistry::new)
    }

    /// Mint the next name for `kind`. No two calls for the same kind ever
    /// return the same value for the lifetime of the registry.
    pub fn next_name(&self, kind: &str) -> String {
        let mut counters = lock(&self.counters);
        let count = counters.entry(kind.to_string()).or_insert(0);
        *count += 1;
        format!("{kind}{count}")
    }

    /// The number of names minted so far for `kind`.
    pub fn peek(&self, kind: &str) -> u64 {
        lock(&self.counters).get(kind).copied().unwrap_or(0)
    }

    /// Forget every counter.
    pub fn reset(&self) {
        lock(&self.counters).clear();
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_monotonic_per_kind() {
        let registry = NameRegistry::new();
        assert_eq!(registry.next_name("Parser"), "Parser1");
        assert_eq!(registry.next_name("Parser"), "Parser2");
        assert_eq!(registry.next_name("Writer"), "Writer1");
        assert_eq!(registry.peek("Parser"), 2);
    }

    #[test]
    fn reset_restores_a_clean_slate() {
        let registry = NameRegistry::new();
        registry.next_name("Parser");
        registry.reset();
        assert_eq!(registry.peek("Parser"), 0);
        assert_eq!(registry.next_name("Parser"), "Parser1");
    }

    #[test]
    fn global_registry_is_shared() {
        // Use a kind no other test touches; the global registry is
        // process-wide state.
        let first = NameRegistry::global().next_name("GlobalNamingProbe");
        let second = NameRegistry::global().next_name("GlobalNamingProbe");
        assert_ne!(first, second);
    }
}
