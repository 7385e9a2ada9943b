use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::Result;

/// Scratch map shared by every middleware and handler working on one update.
///
/// The dispatcher creates exactly one bag per inbound update and threads it
/// through all handler attempts, so a middleware of a later candidate sees
/// what an earlier, rejected candidate wrote.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamsBag {
    values: HashMap<String, Value>,
}

impl ParamsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read; `None` when the key is absent or has another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip_and_shape_mismatch() {
        let mut bag = ParamsBag::new();
        bag.insert("lang", "en").unwrap();
        bag.insert("attempts", 3u32).unwrap();

        assert_eq!(bag.get_as::<String>("lang").as_deref(), Some("en"));
        assert_eq!(bag.get_as::<u32>("attempts"), Some(3));
        assert_eq!(bag.get_as::<u32>("lang"), None);
        assert_eq!(bag.len(), 2);

        assert!(bag.remove("lang").is_some());
        assert!(!bag.contains("lang"));
    }
}
