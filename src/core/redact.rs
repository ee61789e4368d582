use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sensitive value redaction
// ---------------------------------------------------------------------------

/// A wrapper that redacts its contents when displayed or debug-printed.
///
/// The library API key travels through configuration and into request
/// headers; wrapping it keeps it out of `Debug` dumps and log fields.
///
/// ```ignore
/// let key = Redacted::new("my_access_key".to_string());
/// tracing::info!(api_key = %key, "configured"); // logs: api_key=[REDACTED]
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Access the wrapped value. Call sites should not log the result.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Redact an access key for logging: show only the first 4 chars.
pub fn redact_access_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    let visible: String = key.chars().take(4).collect();
    format!("{}***", visible)
}
