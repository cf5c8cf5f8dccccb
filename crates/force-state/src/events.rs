//! Change notifications emitted after each committed write.

use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEventKind {
    Put,
    Remove,
}

/// One committed change. `key` is `{table}/{system}/{tenant}/...`.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub key: String,
    pub kind: StoreEventKind,
    /// The stored JSON for `Put` events.
    pub value: Option<Vec<u8>>,
}

impl StoreEvent {
    pub fn matches(&self, prefix: &str) -> bool {
        self.key.starts_with(prefix)
    }

    /// Decode the stored value, if any.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        self.value
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}
