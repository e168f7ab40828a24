//! # Configuration
//!
//! A string key/value store with an immutable, typed snapshot. Keys are
//! dotted (`queue.job_timeout_secs`); applications layer defaults,
//! environment variables and anything else on top with [`AssayConfig::set`].
//!
//! ```rust
//! use assay_core::AssayConfig;
//!
//! let mut config = AssayConfig::new();
//! config.set_default("queue.idle_secs", "60");
//! config.set("queue.idle_secs", "5");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get_u64("queue.idle_secs"), Some(5));
//! ```
//!
//! Environment variables are imported with a prefix, double underscores
//! separating segments: `ASSAY__QUEUE__IDLE_SECS=5` becomes `queue.idle_secs`.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct AssayConfig {
    values: HashMap<String, String>,
}

impl AssayConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key, replacing any previous value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only if it has no value yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Import `(name, value)` pairs whose name starts with `prefix`.
    ///
    /// Returns the number of imported keys.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut imported = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if normalized.is_empty() {
                    continue;
                }
                self.set(normalized, value);
                imported += 1;
            }
        }
        imported
    }

    /// Import the process environment, see [`AssayConfig::load_vars`].
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    pub fn snapshot(&self) -> AssayConfigSnapshot {
        AssayConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssayConfigSnapshot {
    map: HashMap<String, String>,
}

impl AssayConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Accepts `true/false`, `1/0`, `yes/no` and `on/off`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Whole seconds stored under `key`.
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }
}
