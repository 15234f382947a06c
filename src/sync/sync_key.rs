/// The server-issued synchronization cursor

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// A single `(Key, Val)` entry of the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKeyPair {
    #[serde(rename = "Key")]
    pub key: i64,
    #[serde(rename = "Val")]
    pub val: i64,
}

impl SyncKeyPair {
    pub fn new(key: i64, val: i64) -> Self {
        Self { key, val }
    }
}

/// Structured form sent in JSON bodies: `{"Count": n, "List": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncKeyPayload {
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "List")]
    pub list: Vec<SyncKeyPair>,
}

/// Ordered cursor of key/value pairs.
///
/// Order is significant: the wire string is positional. Every refresh is a
/// full overwrite, and a refresh that fails validation leaves the previous
/// pairs in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncKey {
    pairs: Vec<SyncKeyPair>,
}

impl SyncKey {
    /// An empty, not yet initialized cursor
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        !self.pairs.is_empty()
    }

    /// Replace the whole cursor
    pub fn refresh(&mut self, pairs: Vec<SyncKeyPair>) -> Result<()> {
        if pairs.is_empty() {
            return Err(Error::InvalidState(
                "sync key refresh with no pairs".to_string(),
            ));
        }
        self.pairs = pairs;
        Ok(())
    }

    /// Replace the cursor from a `{Count, List:[{Key,Val}]}` JSON object
    pub fn refresh_from_value(&mut self, value: &Value) -> Result<()> {
        let pairs = pairs_from_value(value)?;
        self.refresh(pairs)
    }

    /// Render `count|k1_v1|k2_v2|...`
    pub fn serialize(&self) -> Result<String> {
        if self.pairs.is_empty() {
            return Err(Error::InvalidState(
                "sync key serialized before initialization".to_string(),
            ));
        }

        let mut out = self.pairs.len().to_string();
        for pair in &self.pairs {
            // Writing into a String cannot fail
            let _ = write!(out, "|{}_{}", pair.key, pair.val);
        }
        Ok(out)
    }

    pub fn raw_pairs(&self) -> &[SyncKeyPair] {
        &self.pairs
    }

    /// Structured body form for sync-detail requests
    pub fn to_payload(&self) -> Result<SyncKeyPayload> {
        if self.pairs.is_empty() {
            return Err(Error::InvalidState(
                "sync key used before initialization".to_string(),
            ));
        }
        Ok(SyncKeyPayload {
            count: self.pairs.len(),
            list: self.pairs.clone(),
        })
    }

    /// Drop all pairs, returning to the uninitialized state
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

/// Validate and extract pairs from a `{Count, List}` object without touching any cursor
pub fn pairs_from_value(value: &Value) -> Result<Vec<SyncKeyPair>> {
    let payload = SyncKeyPayload::deserialize(value)
        .map_err(|e| Error::InvalidState(format!("malformed sync key: {}", e)))?;

    if payload.count != payload.list.len() {
        return Err(Error::InvalidState(format!(
            "sync key Count {} does not match {} listed pairs",
            payload.count,
            payload.list.len()
        )));
    }

    Ok(payload.list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key_of(pairs: &[(i64, i64)]) -> SyncKey {
        let mut key = SyncKey::new();
        key.refresh(pairs.iter().map(|&(k, v)| SyncKeyPair::new(k, v)).collect())
            .unwrap();
        key
    }

    #[test]
    fn test_serialize_layout() {
        let key = key_of(&[(1, 100), (2, 200), (3, 300)]);
        assert_eq!(key.serialize().unwrap(), "3|1_100|2_200|3_300");
        // Stable across calls
        assert_eq!(key.serialize().unwrap(), key.serialize().unwrap());
    }

    #[test]
    fn test_serialize_preserves_order() {
        let key = key_of(&[(1000, 7), (1, 1), (201, 1_475_280_000)]);
        assert_eq!(key.serialize().unwrap(), "3|1000_7|1_1|201_1475280000");
    }

    #[test]
    fn test_serialize_before_init_fails() {
        let key = SyncKey::new();
        assert!(!key.is_initialized());
        assert!(matches!(key.serialize(), Err(Error::InvalidState(_))));
        assert!(matches!(key.to_payload(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_refresh_empty_fails_and_keeps_state() {
        let mut key = key_of(&[(1, 100)]);
        assert!(matches!(key.refresh(Vec::new()), Err(Error::InvalidState(_))));
        assert_eq!(key.serialize().unwrap(), "1|1_100");
    }

    #[test]
    fn test_refresh_fully_replaces() {
        let mut key = key_of(&[(1, 100), (2, 200), (3, 300), (1000, 1)]);
        key.refresh(vec![SyncKeyPair::new(1, 101)]).unwrap();
        assert_eq!(key.raw_pairs(), &[SyncKeyPair::new(1, 101)]);
        assert_eq!(key.serialize().unwrap(), "1|1_101");
    }

    #[test]
    fn test_refresh_from_value_round_trip() {
        let value = json!({
            "Count": 4,
            "List": [
                {"Key": 1, "Val": 650_000_001},
                {"Key": 2, "Val": 650_000_020},
                {"Key": 3, "Val": 650_000_003},
                {"Key": 1000, "Val": 1_475_280_000}
            ]
        });
        let mut key = SyncKey::new();
        key.refresh_from_value(&value).unwrap();

        let wire = key.serialize().unwrap();
        let mut parts = wire.split('|');
        assert_eq!(parts.next(), Some("4"));
        assert_eq!(
            parts.collect::<Vec<_>>(),
            vec!["1_650000001", "2_650000020", "3_650000003", "1000_1475280000"]
        );
    }

    #[test]
    fn test_refresh_from_value_rejects_malformed() {
        let mut key = key_of(&[(9, 9)]);

        let missing_val = json!({"Count": 1, "List": [{"Key": 1}]});
        assert!(matches!(
            key.refresh_from_value(&missing_val),
            Err(Error::InvalidState(_))
        ));

        let missing_key = json!({"Count": 1, "List": [{"Val": 1}]});
        assert!(key.refresh_from_value(&missing_key).is_err());

        let no_list = json!({"Count": 0});
        assert!(key.refresh_from_value(&no_list).is_err());

        let empty = json!({"Count": 0, "List": []});
        assert!(key.refresh_from_value(&empty).is_err());

        let bad_count = json!({"Count": 3, "List": [{"Key": 1, "Val": 2}]});
        assert!(key.refresh_from_value(&bad_count).is_err());

        let no_count = json!({"List": [{"Key": 1, "Val": 2}]});
        assert!(matches!(
            key.refresh_from_value(&no_count),
            Err(Error::InvalidState(_))
        ));

        let negative_count = json!({"Count": -1, "List": [{"Key": 1, "Val": 2}]});
        assert!(key.refresh_from_value(&negative_count).is_err());

        let text_val = json!({"Count": 1, "List": [{"Key": 1, "Val": "2"}]});
        assert!(key.refresh_from_value(&text_val).is_err());

        // Nothing above may have leaked into the cursor
        assert_eq!(key.serialize().unwrap(), "1|9_9");
    }

    #[test]
    fn test_pairs_from_value_reads_payload() {
        let value = json!({"Count": 2, "List": [{"Key": 1, "Val": 100}, {"Key": 2, "Val": 200}], "Extra": true});
        assert_eq!(
            pairs_from_value(&value).unwrap(),
            vec![SyncKeyPair::new(1, 100), SyncKeyPair::new(2, 200)]
        );
    }

    #[test]
    fn test_payload_serializes_to_wire_json() {
        let key = key_of(&[(1, 100), (2, 200)]);
        let body = serde_json::to_value(key.to_payload().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"Count": 2, "List": [{"Key": 1, "Val": 100}, {"Key": 2, "Val": 200}]})
        );
    }

    #[test]
    fn test_clear() {
        let mut key = key_of(&[(1, 1)]);
        key.clear();
        assert!(!key.is_initialized());
    }
}
