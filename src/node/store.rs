use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single stored value and its distance from the primary owner.
/// `hop = 0` means this node is the primary; `1..k-1` mark successive
/// replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub value: String,
    pub hop: u32,
}

/// The sentinel value of a missed query, reused verbatim wherever the wire
/// protocol must say a key wasn't found.
pub const KEY_NOT_FOUND: &str = "Key not found";

/// In-memory map `key -> Record` for the arc this node currently owns or
/// replicates.
#[derive(Debug, Default, Clone)]
pub struct KeyStore {
    entries: HashMap<String, Record>,
}

impl KeyStore {
    pub fn new() -> Self {
        KeyStore {
            entries: HashMap::new(),
        }
    }

    /// Inserts `value` under `key`. If the key already holds a record, `value`
    /// is appended to its comma-separated list unless already present; a
    /// brand new record is created with the given `hop` otherwise.
    /// Re-inserting an existing key never changes its stored `hop` -- only
    /// handoff operations adjust hop.
    pub fn insert(&mut self, key: String, value: String, hop: u32) {
        match self.entries.get_mut(&key) {
            Some(record) => {
                if !record.value.split(", ").any(|existing| existing == value) {
                    record.value.push_str(", ");
                    record.value.push_str(&value);
                }
            }
            None => {
                self.entries.insert(key, Record { value, hop });
            }
        }
    }

    /// Inserts or overwrites a record verbatim, preserving its hop exactly as
    /// given. Used by handoff (transfer_keys/receive_keys), which must not
    /// run the concatenation logic of a client-facing insert.
    pub fn put_record(&mut self, key: String, record: Record) {
        self.entries.insert(key, record);
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|record| record.value.clone())
    }

    pub fn query_or_not_found(&self, key: &str) -> String {
        self.query(key).unwrap_or_else(|| KEY_NOT_FOUND.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.get(key)
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.entries.iter()
    }

    /// Applies the increment-and-trim handoff step to the given keys: each
    /// present key's hop is incremented by one and, if it now exceeds
    /// `max_hop`, the record is dropped. Returns whether anything in
    /// the local store actually changed, the signal used to detect the
    /// "stable fixed point" that stops the downstream `increment_hop` lap.
    /// Used by the handoff node itself, which ages its own retained copies
    /// of a just-computed transfer set (hop 0 included: a primary that just
    /// surrendered a key to a new predecessor becomes its first replica).
    pub fn increment_hops(&mut self, keys: &[String], max_hop: u32) -> bool {
        let mut changed = false;
        for key in keys {
            if let Some(record) = self.entries.get_mut(key) {
                record.hop += 1;
                changed = true;
                if record.hop > max_hop {
                    self.entries.remove(key);
                }
            }
        }
        changed
    }

    /// Same aging step, but only touches existing replica records (`hop >
    /// 0`). Used by the downstream `increment_hop` propagation lap, which
    /// only knows key names, not provenance -- a `hop == 0` match there is
    /// always an unrelated node's own primary copy and must not be aged.
    pub fn age_replicas(&mut self, keys: &[String], max_hop: u32) -> bool {
        let mut changed = false;
        for key in keys {
            if let Some(record) = self.entries.get_mut(key) {
                if record.hop == 0 {
                    continue;
                }
                record.hop += 1;
                changed = true;
                if record.hop > max_hop {
                    self.entries.remove(key);
                }
            }
        }
        changed
    }

    pub fn as_map(&self) -> &HashMap<String, Record> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_creates_new_record_with_given_hop() {
        let mut store = KeyStore::new();
        store.insert("alpha".to_string(), "v1".to_string(), 0);
        assert_eq!(store.get("alpha").unwrap().hop, 0);
        assert_eq!(store.query("alpha").unwrap(), "v1");
    }

    #[test]
    fn repeated_insert_of_same_value_is_idempotent() {
        let mut store = KeyStore::new();
        store.insert("alpha".to_string(), "v1".to_string(), 0);
        store.insert("alpha".to_string(), "v1".to_string(), 0);
        assert_eq!(store.query("alpha").unwrap(), "v1");
    }

    #[test]
    fn distinct_inserts_concatenate_in_submission_order() {
        let mut store = KeyStore::new();
        store.insert("alpha".to_string(), "v1".to_string(), 0);
        store.insert("alpha".to_string(), "v2".to_string(), 0);
        assert_eq!(store.query("alpha").unwrap(), "v1, v2");
    }

    #[test]
    fn insert_does_not_change_hop_of_existing_record() {
        let mut store = KeyStore::new();
        store.insert("alpha".to_string(), "v1".to_string(), 2);
        store.insert("alpha".to_string(), "v2".to_string(), 0);
        assert_eq!(store.get("alpha").unwrap().hop, 2);
    }

    #[test]
    fn query_missing_key_returns_none() {
        let store = KeyStore::new();
        assert_eq!(store.query("nope"), None);
        assert_eq!(store.query_or_not_found("nope"), KEY_NOT_FOUND);
    }

    #[test]
    fn delete_removes_entry() {
        let mut store = KeyStore::new();
        store.insert("alpha".to_string(), "v1".to_string(), 0);
        store.delete("alpha");
        assert!(!store.contains("alpha"));
    }

    #[test]
    fn increment_hops_ages_and_trims_over_limit() {
        let mut store = KeyStore::new();
        store.put_record(
            "alpha".to_string(),
            Record {
                value: "v1".to_string(),
                hop: 1,
            },
        );
        store.put_record(
            "beta".to_string(),
            Record {
                value: "v2".to_string(),
                hop: 2,
            },
        );
        let keys = vec!["alpha".to_string(), "beta".to_string()];
        let changed = store.increment_hops(&keys, 2);
        assert!(changed);
        assert_eq!(store.get("alpha").unwrap().hop, 2);
        assert!(store.get("beta").is_none()); // hop would become 3 > max_hop(2)
    }

    #[test]
    fn increment_hops_on_absent_keys_reports_no_change() {
        let mut store = KeyStore::new();
        let keys = vec!["ghost".to_string()];
        assert!(!store.increment_hops(&keys, 5));
    }

    #[test]
    fn age_replicas_skips_hop_zero_but_ages_and_trims_replicas() {
        let mut store = KeyStore::new();
        store.put_record(
            "primary".to_string(),
            Record {
                value: "p".to_string(),
                hop: 0,
            },
        );
        store.put_record(
            "replica".to_string(),
            Record {
                value: "r".to_string(),
                hop: 1,
            },
        );
        let keys = vec!["primary".to_string(), "replica".to_string()];
        let changed = store.age_replicas(&keys, 1);
        assert!(changed);
        assert_eq!(store.get("primary").unwrap().hop, 0);
        assert!(store.get("replica").is_none()); // hop would become 2 > max_hop(1)
    }
}
