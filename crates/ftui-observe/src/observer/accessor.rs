#![forbid(unsafe_code)]

//! Non-observing get/set adapter for one-time bindings.

use crate::value::{PropertyKey, Value, read_property};

/// Reads and writes one property without subscribing to anything.
#[derive(Debug, Clone)]
pub struct PropertyAccessor {
    target: Value,
    key: PropertyKey,
}

impl PropertyAccessor {
    pub(crate) fn new(target: Value, key: PropertyKey) -> Self {
        Self { target, key }
    }

    #[must_use]
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    #[must_use]
    pub fn get_value(&self) -> Value {
        read_property(&self.target, &self.key)
    }

    /// Write through the target's native assignment. Writes to primitives,
    /// and to keys a collection does not expose, are discarded.
    pub fn set_value(&self, value: Value) {
        match &self.target {
            Value::Object(object) => object.set(&self.key, value),
            Value::Sequence(sequence) => {
                if let Some(index) = self.key.as_index() {
                    sequence.set(index, value);
                } else if self.key.is_name("length")
                    && let Some(n) = value.as_number()
                    && n.is_finite()
                    && n >= 0.0
                {
                    sequence.set_len(n as usize);
                }
            }
            _ => {}
        }
    }
}
