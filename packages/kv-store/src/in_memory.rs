//! In-memory store.
//!
//! Map-backed store with the same listing semantics as the etcd adapter.
//! Used by tests and by anything that needs a store without a backend.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;

use crate::{Error, KvPair, KvStore};

/// An in-memory key-value store.
///
/// # Example
///
/// ```rust
/// use confvol_store::{InMemoryStore, KvStore};
///
/// let store = InMemoryStore::new();
/// store.insert("/a/f1", "hello");
///
/// let pair = store.get("/a/f1").unwrap();
/// assert_eq!(&pair.value[..], b"hello");
/// ```
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with initial entries.
    pub fn with_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Bytes>,
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::new();
        for (key, value) in entries {
            store.insert(key, value);
        }
        store
    }

    /// Insert or overwrite an entry.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Remove an entry, returning its value if it existed.
    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns true if `key` sits exactly one level below `base`.
///
/// `base` always ends in `/`. The child may carry one trailing `/`, which is
/// how directory keys are commonly written.
fn is_direct_child(base: &str, key: &str) -> bool {
    let Some(rest) = key.strip_prefix(base) else {
        return false;
    };
    let name = rest.strip_suffix('/').unwrap_or(rest);
    !name.is_empty() && !name.contains('/')
}

impl KvStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<KvPair, Error> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|value| KvPair::new(key, value.clone()))
            .ok_or_else(|| Error::NotFound {
                key: key.to_string(),
            })
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, Error> {
        let base = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range(base.clone()..)
            .take_while(|(key, _)| key.starts_with(&base))
            .filter(|(key, _)| is_direct_child(&base, key))
            .map(|(key, value)| KvPair::new(key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryStore {
        InMemoryStore::with_entries([
            ("/a/", ""),
            ("/a/f1", "hello"),
            ("/a/sub/", ""),
            ("/a/sub/f2", "nested"),
            ("/ab", "sibling"),
        ])
    }

    #[test]
    fn get_returns_value() {
        let store = sample();
        let pair = store.get("/a/f1").unwrap();
        assert_eq!(pair.key, "/a/f1");
        assert_eq!(&pair.value[..], b"hello");
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = sample();
        let err = store.get("/missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn list_returns_direct_children_only() {
        let store = sample();
        let keys: Vec<String> = store
            .list("/a/")
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["/a/f1".to_string(), "/a/sub/".to_string()]);
    }

    #[test]
    fn list_without_trailing_slash() {
        let store = sample();
        let keys: Vec<String> = store
            .list("/a/sub")
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["/a/sub/f2".to_string()]);
    }

    #[test]
    fn list_of_unknown_prefix_is_empty() {
        let store = sample();
        assert!(store.list("/nothing/").unwrap().is_empty());
    }

    #[test]
    fn insert_overwrites_and_remove_deletes() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());

        store.insert("/k", "v1");
        store.insert("/k", "v2");
        assert_eq!(store.len(), 1);
        assert_eq!(&store.get("/k").unwrap().value[..], b"v2");

        assert_eq!(store.remove("/k"), Some(Bytes::from_static(b"v2")));
        assert!(store.get("/k").is_err());
    }
}
