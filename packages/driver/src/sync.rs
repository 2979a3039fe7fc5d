//! Store-to-filesystem materialization.
//!
//! A folder volume lists its key and mirrors every child. A child whose
//! value is empty is a directory marker and recurses; any other child is
//! written as a file. A single-file volume gets its key's value written to
//! the mount root. Sync only ever adds or overwrites.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use confvol_store::{KvPair, KvStore};
use confvol_template::ConfTemplate;

use crate::error::SyncError;
use crate::volume::VolumeMount;

/// Mode for written files unless the volume overrides it.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

pub struct Synchronizer<'a> {
    store: &'a dyn KvStore,
    template: Option<&'a ConfTemplate>,
}

impl<'a> Synchronizer<'a> {
    /// `template` renders every file value before it is written; `None`
    /// copies values verbatim.
    pub fn new(store: &'a dyn KvStore, template: Option<&'a ConfTemplate>) -> Self {
        Self { store, template }
    }

    /// Materialize `volume` below its root.
    ///
    /// Fails only when the volume's own key cannot be read or its single
    /// file cannot be written. Anything deeper is logged and skipped.
    pub fn sync_mount_point(&self, volume: &VolumeMount) -> Result<(), SyncError> {
        if volume.is_folder() {
            self.sync_folder_root(volume)
        } else {
            self.sync_file_root(volume)
        }
    }

    fn sync_folder_root(&self, volume: &VolumeMount) -> Result<(), SyncError> {
        let entries = self
            .store
            .list(&volume.relative)
            .map_err(|source| SyncError::Store {
                key: volume.relative.clone(),
                source,
            })?;
        fs::create_dir_all(&volume.root).map_err(|source| SyncError::Filesystem {
            path: volume.root.clone(),
            source,
        })?;
        self.sync_folder(&entries, &volume.root, &volume.relative);
        Ok(())
    }

    fn sync_file_root(&self, volume: &VolumeMount) -> Result<(), SyncError> {
        let entry = self
            .store
            .get(&volume.relative)
            .map_err(|source| SyncError::Store {
                key: volume.relative.clone(),
                source,
            })?;
        if let Some(parent) = volume.root.parent() {
            create_dir(parent);
        }
        let Some(data) = self.render(&entry.key, entry.value) else {
            return Ok(());
        };
        write_file(&volume.root, &data, volume.mode.unwrap_or(DEFAULT_FILE_MODE)).map_err(|source| {
            SyncError::Filesystem {
                path: volume.root.clone(),
                source,
            }
        })
    }

    fn sync_folder(&self, entries: &[KvPair], base: &Path, relative: &str) {
        for pair in entries {
            log::debug!("Sync source {}", pair.key);
            let Some(name) = pair.key.strip_prefix(relative) else {
                log::error!("Store key {} is not below {}", pair.key, relative);
                continue;
            };
            if name.trim_matches('/').is_empty() {
                continue;
            }
            let dst = join_relative(base, name);

            let entry = match self.store.get(&pair.key) {
                Ok(entry) => entry,
                Err(err) => {
                    log::error!("Skipping {}: {}", pair.key, err);
                    continue;
                }
            };

            if entry.is_directory_marker() {
                create_dir(&dst);
                match self.store.list(&pair.key) {
                    Ok(children) => self.sync_folder(&children, &dst, &pair.key),
                    Err(err) => log::error!("Listing {} failed: {}", pair.key, err),
                }
            } else if let Some(data) = self.render(&pair.key, entry.value) {
                log::debug!("Write {}", dst.display());
                if let Err(err) = write_file(&dst, &data, DEFAULT_FILE_MODE) {
                    log::error!("Writing {} failed: {}", dst.display(), err);
                }
            }
        }
    }

    /// `None` means the value failed to render and must not be written.
    fn render(&self, key: &str, value: Bytes) -> Option<Bytes> {
        let Some(template) = self.template else {
            return Some(value);
        };
        let text = match std::str::from_utf8(&value) {
            Ok(text) => text,
            Err(err) => {
                log::error!("Rendering {} failed, value is not UTF-8: {}", key, err);
                return None;
            }
        };
        match template.parse(text, &()) {
            Ok(out) => Some(Bytes::from(out)),
            Err(err) => {
                log::error!("Rendering {} failed, not writing it: {}", key, err);
                None
            }
        }
    }
}

/// Join a `/`-separated store path below `base`.
///
/// Empty, `.` and `..` components are dropped, so the result never leaves
/// `base`.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|c| !matches!(*c, "" | "." | ".."))
        .fold(base.to_path_buf(), |path, c| path.join(c))
}

fn create_dir(path: &Path) {
    if let Err(err) = fs::create_dir_all(path) {
        log::error!("Creating {} failed: {}", path.display(), err);
    }
}

fn write_file(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    fs::write(path, data)?;
    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
