//! Core traits for the store layer.

use std::sync::Arc;

use bytes::Bytes;

use crate::Error;

/// A single entry returned by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Bytes,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Zero-length values mark directories.
    ///
    /// A legitimately empty file cannot be told apart from a directory
    /// marker; callers that rely on this accept that limitation.
    pub fn is_directory_marker(&self) -> bool {
        self.value.is_empty()
    }
}

/// Read access to a hierarchical key-value backend.
///
/// Stores are shared between the volume registry and the template helpers,
/// so both operations take `&self` and implementations must be
/// `Send + Sync`.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn KvStore>`.
pub trait KvStore: Send + Sync {
    /// Fetch the entry stored at `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(pair)` - The entry. Directories yield an empty value.
    /// * `Err(Error::NotFound)` - The key does not exist.
    /// * `Err(_)` - The backend could not be reached or answered garbage.
    fn get(&self, key: &str) -> Result<KvPair, Error>;

    /// List the direct children of `prefix`, in backend order.
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, Error>;
}

/// The shared handle every consumer holds.
pub type SharedStore = Arc<dyn KvStore>;

// Blanket implementations for references and smart pointers

impl<T: KvStore + ?Sized> KvStore for &T {
    fn get(&self, key: &str) -> Result<KvPair, Error> {
        (**self).get(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, Error> {
        (**self).list(prefix)
    }
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Result<KvPair, Error> {
        self.as_ref().get(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, Error> {
        self.as_ref().list(prefix)
    }
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<KvPair, Error> {
        self.as_ref().get(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, Error> {
        self.as_ref().list(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A store that only knows one key.
    struct SingleKeyStore;

    impl KvStore for SingleKeyStore {
        fn get(&self, key: &str) -> Result<KvPair, Error> {
            if key == "/only" {
                Ok(KvPair::new("/only", "value"))
            } else {
                Err(Error::NotFound {
                    key: key.to_string(),
                })
            }
        }

        fn list(&self, _prefix: &str) -> Result<Vec<KvPair>, Error> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn directory_marker_is_zero_length() {
        assert!(KvPair::new("/dir/", "").is_directory_marker());
        assert!(!KvPair::new("/file", "x").is_directory_marker());
    }

    #[test]
    fn shared_store_delegates() {
        let store: SharedStore = Arc::new(SingleKeyStore);
        let pair = store.get("/only").unwrap();
        assert_eq!(&pair.value[..], b"value");
        assert!(store.get("/other").unwrap_err().is_not_found());
    }

    #[test]
    fn boxed_and_borrowed_stores_delegate() {
        let boxed: Box<dyn KvStore> = Box::new(SingleKeyStore);
        assert!(boxed.get("/only").is_ok());

        let borrowed = &SingleKeyStore;
        assert!(borrowed.list("/").unwrap().is_empty());
    }
}
