//! The volume registry.
//!
//! Every operation takes the registry lock for its whole duration, so
//! operations are serialized, a sync included.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use confvol_store::SharedStore;
use confvol_template::ConfTemplate;

use crate::config::Configuration;
use crate::error::Error;
use crate::sync::{join_relative, Synchronizer};
use crate::volume::{Capabilities, CreateOptions, Scope, Volume, VolumeMount};

pub struct VolumeRegistry {
    volumes: Mutex<HashMap<String, VolumeMount>>,
    mount_base: PathBuf,
    store: SharedStore,
    template: ConfTemplate,
    templating_enabled: bool,
}

impl VolumeRegistry {
    pub fn new(config: &Configuration, store: SharedStore) -> Self {
        let mut registry = Self::with_mount_base(&config.driver.root_path, store);
        registry.templating_enabled = !config.generator.disabled;
        registry
    }

    /// A registry with templating enabled, materializing below `mount_base`.
    pub fn with_mount_base(mount_base: impl Into<PathBuf>, store: SharedStore) -> Self {
        Self {
            volumes: Mutex::default(),
            mount_base: mount_base.into(),
            template: ConfTemplate::new(Some(store.clone())),
            store,
            templating_enabled: true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VolumeMount>> {
        self.volumes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a volume. Creating an existing name is a no-op; the first
    /// create's options stay in effect.
    pub fn create(&self, name: &str, options: &CreateOptions) {
        log::debug!("Create volume {} ({:?})", name, options);
        let mut volumes = self.lock();
        if volumes.contains_key(name) {
            return;
        }
        let root = join_relative(&self.mount_base, name);
        volumes.insert(name.to_string(), VolumeMount::new(root, name, options));
    }

    pub fn get(&self, name: &str) -> Result<Volume, Error> {
        log::debug!("Get volume {}", name);
        self.lock()
            .get(name)
            .map(|vm| Volume {
                name: name.to_string(),
                mountpoint: vm.root.clone(),
            })
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    /// All registered volumes, sorted by name.
    pub fn list(&self) -> Vec<Volume> {
        log::debug!("List volumes");
        let mut volumes: Vec<Volume> = self
            .lock()
            .iter()
            .map(|(name, vm)| Volume {
                name: name.clone(),
                mountpoint: vm.root.clone(),
            })
            .collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        volumes
    }

    pub fn path(&self, name: &str) -> Option<PathBuf> {
        log::debug!("Path of volume {}", name);
        self.lock().get(name).map(|vm| vm.root.clone())
    }

    /// Materialize the volume and count the mount.
    ///
    /// Sync failures are logged; the mountpoint is returned regardless.
    pub fn mount(&self, name: &str) -> Option<PathBuf> {
        log::debug!("Mount volume {}", name);
        let mut volumes = self.lock();
        let vm = volumes.get_mut(name)?;

        let template = (vm.template && self.templating_enabled).then_some(&self.template);
        if let Err(err) = Synchronizer::new(self.store.as_ref(), template).sync_mount_point(vm) {
            log::error!("Sync of volume {} failed: {}", name, err);
        }

        vm.reference_counter += 1;
        Some(vm.root.clone())
    }

    /// Count an unmount. Files are left in place.
    pub fn unmount(&self, name: &str) {
        log::debug!("Unmount volume {}", name);
        if let Some(vm) = self.lock().get_mut(name) {
            vm.reference_counter -= 1;
        }
    }

    /// Forget the volume and delete its materialized files.
    ///
    /// The lock is held until the files are gone.
    pub fn remove(&self, name: &str) {
        log::debug!("Remove volume {}", name);
        let mut volumes = self.lock();
        let Some(vm) = volumes.remove(name) else {
            return;
        };
        if let Err(err) = remove_path(&vm.root) {
            log::warn!("Removing {} failed: {}", vm.root.display(), err);
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities { scope: Scope::Local }
    }

    pub fn reference_count(&self, name: &str) -> Option<i64> {
        self.lock().get(name).map(|vm| vm.reference_counter)
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confvol_store::InMemoryStore;
    use std::sync::Arc;

    fn registry(base: &Path, entries: &[(&'static str, &'static str)]) -> VolumeRegistry {
        let store = InMemoryStore::with_entries(entries.iter().copied());
        VolumeRegistry::with_mount_base(base, Arc::new(store))
    }

    #[test]
    fn create_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[]);
        reg.create("/app/", &CreateOptions::default());

        let volume = reg.get("/app/").unwrap();
        assert_eq!(volume.name, "/app/");
        assert_eq!(volume.mountpoint, dir.path().join("app"));
        assert_eq!(reg.path("/app/"), Some(dir.path().join("app")));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[]);
        assert!(matches!(reg.get("/nope/"), Err(Error::NotFound { .. })));
        assert_eq!(reg.path("/nope/"), None);
        assert_eq!(reg.mount("/nope/"), None);
        assert_eq!(reg.reference_count("/nope/"), None);
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[("/a/", ""), ("/a/f", "x")]);
        let tmpl = CreateOptions {
            template: true,
            mode: None,
        };
        reg.create("/a/", &tmpl);
        assert_eq!(reg.mount("/a/"), Some(dir.path().join("a")));

        reg.create(
            "/a/",
            &CreateOptions {
                template: false,
                mode: Some(0o600),
            },
        );
        assert_eq!(reg.list().len(), 1);
        assert_eq!(reg.reference_count("/a/"), Some(1));
        assert_eq!(reg.path("/a/"), Some(dir.path().join("a")));
        let volumes = reg.lock();
        assert!(volumes["/a/"].template);
        assert_eq!(volumes["/a/"].mode, None);
    }

    #[test]
    fn list_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[]);
        for name in ["/c/", "/a/", "/b"] {
            reg.create(name, &CreateOptions::default());
        }
        let names: Vec<String> = reg.list().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["/a/", "/b", "/c/"]);
    }

    #[test]
    fn mount_and_unmount_count_references() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[("/a/", ""), ("/a/f", "x")]);
        reg.create("/a/", &CreateOptions::default());

        assert_eq!(reg.mount("/a/"), Some(dir.path().join("a")));
        reg.mount("/a/");
        assert_eq!(reg.reference_count("/a/"), Some(2));
        reg.unmount("/a/");
        reg.unmount("/a/");
        reg.unmount("/a/");
        assert_eq!(reg.reference_count("/a/"), Some(-1));
        assert!(dir.path().join("a/f").exists());
    }

    #[test]
    fn mount_returns_path_even_when_sync_fails() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[]);
        reg.create("/missing/", &CreateOptions::default());
        assert_eq!(reg.mount("/missing/"), Some(dir.path().join("missing")));
        assert_eq!(reg.reference_count("/missing/"), Some(1));
    }

    #[test]
    fn remove_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[("/a/", ""), ("/a/f", "x"), ("/leaf", "y")]);
        reg.create("/a/", &CreateOptions::default());
        reg.create("/leaf", &CreateOptions::default());
        reg.mount("/a/");
        reg.mount("/leaf");

        reg.remove("/a/");
        reg.remove("/leaf");
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("leaf").exists());
        assert!(reg.list().is_empty());

        reg.remove("/never-created/");
    }

    #[test]
    fn remove_holds_lock_until_files_are_gone() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        store.insert("/big/", "");
        for d in 0..20 {
            store.insert(format!("/big/d{}/", d), "");
            for f in 0..100 {
                store.insert(format!("/big/d{}/f{}", d, f), "x");
            }
        }
        let reg = Arc::new(VolumeRegistry::with_mount_base(dir.path(), Arc::new(store)));
        reg.create("/big/", &CreateOptions::default());
        reg.mount("/big/");
        let root = dir.path().join("big");
        assert!(root.join("d19/f99").exists());

        let remover = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || reg.remove("/big/"))
        };
        // Whenever the lock is free, a forgotten volume has no files left.
        while !remover.is_finished() {
            if let Ok(volumes) = reg.volumes.try_lock() {
                if !volumes.contains_key("/big/") {
                    assert!(!root.exists(), "volume forgotten while its files remain");
                }
            }
            std::thread::yield_now();
        }
        remover.join().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn remove_of_unmounted_volume() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[]);
        reg.create("/a/", &CreateOptions::default());
        reg.remove("/a/");
        assert!(reg.get("/a/").is_err());
    }

    #[test]
    fn templates_follow_volume_option() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[("/t", "{{ \"rendered\" }}"), ("/r", "{{ \"raw\" }}")]);
        reg.create(
            "/t",
            &CreateOptions {
                template: true,
                mode: None,
            },
        );
        reg.create("/r", &CreateOptions::default());
        reg.mount("/t");
        reg.mount("/r");
        assert_eq!(fs::read_to_string(dir.path().join("t")).unwrap(), "rendered");
        assert_eq!(fs::read_to_string(dir.path().join("r")).unwrap(), "{{ \"raw\" }}");
    }

    #[test]
    fn generator_disabled_turns_templates_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::new();
        config.driver.root_path = dir.path().to_path_buf();
        config.generator.disabled = true;

        let store = InMemoryStore::with_entries([("/t", "{{ \"x\" }}")]);
        let reg = VolumeRegistry::new(&config, Arc::new(store));
        reg.create(
            "/t",
            &CreateOptions {
                template: true,
                mode: None,
            },
        );
        reg.mount("/t");
        assert_eq!(fs::read_to_string(dir.path().join("t")).unwrap(), "{{ \"x\" }}");
    }

    #[test]
    fn names_cannot_escape_mount_base() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path(), &[]);
        reg.create("/../../etc/", &CreateOptions::default());
        assert_eq!(reg.path("/../../etc/"), Some(dir.path().join("etc")));
    }

    #[test]
    fn capabilities_are_local() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(registry(dir.path(), &[]).capabilities().scope, Scope::Local);
    }
}
