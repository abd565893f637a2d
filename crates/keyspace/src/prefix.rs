//! Key prefixing.
//!
//! Every logical key is namespaced by a prefix before it reaches the store,
//! which lets several environments or tenants share one store. The prefix
//! is either fixed for the lifetime of the client or resolved on every call,
//! so a configuration change mid-run takes effect on the next operation.

use std::{fmt, sync::Arc};

/// Default prefix applied when no configuration overrides it.
pub const DEFAULT_KEY_PREFIX: &str = "DEV|SE|";

/// Source of the namespacing prefix prepended to every logical key.
///
/// # Example
///
/// ```
/// use keyspace_common::KeyPrefix;
///
/// let prefix = KeyPrefix::fixed("PROD|SE|");
/// assert_eq!(prefix.apply("session:42"), "PROD|SE|session:42");
/// ```
#[derive(Clone)]
pub enum KeyPrefix {
    /// Resolved once; identical for every operation.
    Fixed(String),
    /// Resolved on every operation.
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl KeyPrefix {
    /// Creates a prefix that never changes.
    #[must_use]
    pub fn fixed(prefix: impl Into<String>) -> Self {
        Self::Fixed(prefix.into())
    }

    /// Creates a prefix computed by `resolve` each time a key is built.
    #[must_use]
    pub fn dynamic(resolve: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(resolve))
    }

    /// Creates a prefix read from the environment variable `var` on every
    /// call, falling back to `default` while the variable is unset or empty.
    #[must_use]
    pub fn from_env(var: impl Into<String>, default: impl Into<String>) -> Self {
        let var = var.into();
        let default = default.into();
        Self::dynamic(move || {
            std::env::var(&var)
                .ok()
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or_else(|| default.clone())
        })
    }

    /// Returns the prefix currently in effect.
    #[must_use]
    pub fn resolve(&self) -> String {
        match self {
            Self::Fixed(prefix) => prefix.clone(),
            Self::Dynamic(resolve) => resolve(),
        }
    }

    /// Prepends the current prefix to `key`.
    #[must_use]
    pub fn apply(&self, key: &str) -> String {
        format!("{}{key}", self.resolve())
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::fixed(DEFAULT_KEY_PREFIX)
    }
}

impl fmt::Debug for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(prefix) => f.debug_tuple("Fixed").field(prefix).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&self.resolve()).finish(),
        }
    }
}

/// Removes `prefix` from a stored key, leaving keys outside the namespace untouched.
pub(crate) fn strip<'a>(prefix: &str, stored: &'a str) -> &'a str {
    stored.strip_prefix(prefix).unwrap_or(stored)
}

#[cfg(test)]
mod tests {
    use parking_lot::RwLock;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_default_prefix() {
        assert_eq!(KeyPrefix::default().apply("k"), "DEV|SE|k");
    }

    #[test]
    fn test_dynamic_prefix_follows_source() {
        let current = Arc::new(RwLock::new("A|".to_owned()));
        let source = Arc::clone(&current);
        let prefix = KeyPrefix::dynamic(move || source.read().clone());

        assert_eq!(prefix.apply("k"), "A|k");
        *current.write() = "B|".to_owned();
        assert_eq!(prefix.apply("k"), "B|k");
    }

    #[test]
    fn test_from_env_uses_default_when_unset() {
        let prefix = KeyPrefix::from_env("KEYSPACE_TEST_PREFIX_THAT_IS_NEVER_SET", "FALLBACK|");
        assert_eq!(prefix.resolve(), "FALLBACK|");
    }

    #[test]
    fn test_strip_foreign_key_untouched() {
        assert_eq!(strip("DEV|SE|", "DEV|SE|user:1"), "user:1");
        assert_eq!(strip("DEV|SE|", "PROD|SE|user:1"), "PROD|SE|user:1");
    }

    #[test]
    fn test_debug_shows_resolved_value() {
        let prefix = KeyPrefix::dynamic(|| "X|".to_owned());
        assert_eq!(format!("{prefix:?}"), "Dynamic(\"X|\")");
    }

    proptest! {
        /// Stripping the prefix that was applied recovers the logical key.
        #[test]
        fn apply_then_strip_recovers_key(p in "[A-Z|]{0,8}", key in "[a-z:0-9]{0,16}") {
            let prefix = KeyPrefix::fixed(p.clone());
            let stored = prefix.apply(&key);
            prop_assert_eq!(strip(&p, &stored), key.as_str());
        }
    }
}
