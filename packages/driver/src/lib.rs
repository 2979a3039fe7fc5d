//! # confvol-driver
//!
//! Provisions volumes whose contents are materialized from a key-value
//! store.
//!
//! A volume is a name registered with the [`VolumeRegistry`]. The name
//! doubles as the store key the volume mirrors:
//!
//! - a key ending in `/` is a folder; its subtree becomes a directory tree
//! - any other key is a single file
//!
//! Every mount re-materializes the volume from the store. Nothing is ever
//! deleted by a sync; only [`VolumeRegistry::remove`] deletes files.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use confvol_driver::{CreateOptions, VolumeRegistry};
//! use confvol_store::InMemoryStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = InMemoryStore::with_entries([("/a/", ""), ("/a/f1", "hello")]);
//! let registry = VolumeRegistry::with_mount_base(dir.path(), Arc::new(store));
//!
//! registry.create("/a/", &CreateOptions::default());
//! let mountpoint = registry.mount("/a/").unwrap();
//! assert_eq!(std::fs::read_to_string(mountpoint.join("f1")).unwrap(), "hello");
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod sync;
pub mod volume;

pub use config::{AuthConfig, BackendConfig, ConfigError, Configuration, DriverConfig, GeneratorConfig};
pub use error::{Error, SyncError};
pub use registry::VolumeRegistry;
pub use sync::{Synchronizer, DEFAULT_FILE_MODE};
pub use volume::{Capabilities, CreateOptions, Scope, Volume, VolumeMount};
