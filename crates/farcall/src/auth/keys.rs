//! Shared-key validation against the configured key sequence.

use tracing::info;

/// Validates presented keys by membership in the operator-configured
/// sequence. The set is small and operator-controlled, so a linear scan
/// is all it takes; rotating keys is appending a new one and later
/// removing the old.
pub struct KeyValidator {
    keys: Vec<String>,
}

impl KeyValidator {
    pub fn new(keys: Vec<String>) -> Self {
        info!("farcall: shared-key validator activated ({} key(s) configured)", keys.len());
        Self { keys }
    }

    pub fn is_valid(&self, key: &str) -> bool {
        if key.trim().is_empty() {
            return false;
        }
        self.keys.iter().any(|k| k == key)
    }
}
