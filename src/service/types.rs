//! Service layer types

use std::collections::HashMap;

use crate::engine::InputError;

/// Field names tried after the signature's input name, in order
pub const FALLBACK_PAYLOAD_KEYS: [&str; 2] = ["body", "data"];

/// One item of a request batch: named raw payloads
#[derive(Debug, Clone, Default)]
pub struct RequestItem {
    fields: HashMap<String, Vec<u8>>,
}

impl RequestItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field item, as produced for a raw request body
    pub fn with_body(bytes: Vec<u8>) -> Self {
        Self::new().with_field("body", bytes)
    }

    pub fn with_field(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.fields.insert(name.into(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// Image payload: the declared parameter first, then `body`, then `data`.
    /// The first field present wins, even if it is empty.
    pub fn payload(&self, param_name: &str) -> Result<&[u8], InputError> {
        let payload = std::iter::once(param_name)
            .chain(FALLBACK_PAYLOAD_KEYS)
            .find_map(|key| self.get(key));

        match payload {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(InputError::Empty),
        }
    }
}
