use std::io;
use std::path::PathBuf;

/// Registry lookup errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Volume not found: {name}")]
    NotFound { name: String },
}

/// Errors that abort a sync.
///
/// Only failures on the volume's top-level key surface as a `SyncError`;
/// failures further down the tree are logged and skipped.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("store error on {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: confvol_store::Error,
    },

    #[error("filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
