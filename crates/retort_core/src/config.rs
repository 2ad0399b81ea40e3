//! Connection bootstrap options.
//!
//! # Responsibility
//! - Describe the pragmas applied to every SQLite connection an engine opens.
//!
//! # Invariants
//! - Missing keys fall back to [`EngineOptions::default`].

use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Pragmas applied when a connection is bootstrapped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
    /// Makes `LIKE` predicates case sensitive, matching prefix/substring
    /// filters on other backends.
    pub case_sensitive_like: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            case_sensitive_like: true,
        }
    }
}

impl EngineOptions {
    /// Parses options from a JSON object; absent keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Pragma batch executed right after a connection opens.
    pub(crate) fn pragma_sql(&self) -> String {
        format!(
            "PRAGMA foreign_keys = {}; PRAGMA case_sensitive_like = {};",
            on_off(self.foreign_keys),
            on_off(self.case_sensitive_like)
        )
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}
