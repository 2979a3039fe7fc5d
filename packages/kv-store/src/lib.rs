//! # confvol-store
//!
//! The store adapter layer of confvol. Everything above this crate only sees
//! two operations over hierarchical string keys:
//!
//! - `get(key)` - fetch a single entry
//! - `list(prefix)` - fetch the direct children of a key
//!
//! Values are raw bytes. By convention a zero-length value marks a directory
//! and any other value is leaf content; this crate does not interpret values,
//! it only moves them.
//!
//! ## Store Types
//!
//! - [`InMemoryStore`] - map-backed store for tests and isolated rendering
//! - [`EtcdStore`] - etcd v2 keys API over a blocking HTTP client
//!
//! # Example
//!
//! ```rust
//! use confvol_store::{InMemoryStore, KvStore};
//!
//! let store = InMemoryStore::new();
//! store.insert("/app/", "");
//! store.insert("/app/port", "8080");
//!
//! let children = store.list("/app/").unwrap();
//! assert_eq!(children.len(), 1);
//! assert_eq!(&children[0].value[..], b"8080");
//! ```

pub use bytes::Bytes;

pub mod error;
pub mod etcd;
pub mod in_memory;
mod traits;

pub use error::Error;
pub use etcd::{EtcdAuth, EtcdStore};
pub use in_memory::InMemoryStore;
pub use traits::{KvPair, KvStore, SharedStore};
