use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

/// Per-volume state held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Local path the volume materializes to.
    pub root: PathBuf,
    /// Store key the volume mirrors. A trailing `/` marks a folder.
    pub relative: String,
    /// Mounts minus unmounts. May go negative.
    pub reference_counter: i64,
    /// File mode override for a single-file volume.
    pub mode: Option<u32>,
    /// Render store values as templates.
    pub template: bool,
}

impl VolumeMount {
    pub fn new(root: impl Into<PathBuf>, relative: impl Into<String>, options: &CreateOptions) -> Self {
        Self {
            root: root.into(),
            relative: relative.into(),
            reference_counter: 0,
            mode: options.mode,
            template: options.template,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.relative.ends_with('/')
    }
}

/// Options accepted when creating a volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub template: bool,
    pub mode: Option<u32>,
}

impl CreateOptions {
    pub const TEMPLATE: &'static str = "tmpl";
    pub const MODE: &'static str = "mode";

    /// Read options from the string map a volume create request carries.
    ///
    /// Any non-empty `tmpl` value enables templating. `mode` is octal;
    /// unparseable, zero or out-of-range values are ignored. Unknown keys
    /// are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        let template = options.get(Self::TEMPLATE).is_some_and(|v| !v.is_empty());
        let mode = options.get(Self::MODE).and_then(|v| parse_mode(v));
        Self { template, mode }
    }
}

/// Parse an octal file mode, accepting only permission bits.
pub fn parse_mode(value: &str) -> Option<u32> {
    u32::from_str_radix(value.trim(), 8)
        .ok()
        .filter(|mode| (1..=0o7777).contains(mode))
}

/// A volume as reported to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub name: String,
    pub mountpoint: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub scope: Scope,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_options() {
        assert_eq!(CreateOptions::from_options(&HashMap::new()), CreateOptions::default());
    }

    #[test]
    fn template_flag_needs_any_value() {
        assert!(CreateOptions::from_options(&opts(&[("tmpl", "true")])).template);
        assert!(CreateOptions::from_options(&opts(&[("tmpl", "yes")])).template);
        assert!(!CreateOptions::from_options(&opts(&[("tmpl", "")])).template);
    }

    #[test]
    fn mode_is_octal() {
        let o = CreateOptions::from_options(&opts(&[("mode", "600")]));
        assert_eq!(o.mode, Some(0o600));
        let o = CreateOptions::from_options(&opts(&[("mode", "0755"), ("tmpl", "true")]));
        assert_eq!(o, CreateOptions { template: true, mode: Some(0o755) });
    }

    #[test]
    fn bad_modes_are_ignored() {
        for bad in ["", "9", "rw", "0", "17777", "-1"] {
            let o = CreateOptions::from_options(&opts(&[("mode", bad)]));
            assert_eq!(o.mode, None, "mode {:?}", bad);
        }
    }

    #[test]
    fn unknown_keys_ignored() {
        let o = CreateOptions::from_options(&opts(&[("size", "10G")]));
        assert_eq!(o, CreateOptions::default());
    }

    #[test]
    fn mount_kind() {
        let folder = VolumeMount::new("/v/a", "/a/", &CreateOptions::default());
        assert!(folder.is_folder());
        assert_eq!(folder.reference_counter, 0);
        let leaf = VolumeMount::new("/v/a", "/a/file", &CreateOptions::default());
        assert!(!leaf.is_folder());
    }

    #[test]
    fn scope_serializes_lowercase() {
        let caps = Capabilities { scope: Scope::Local };
        assert_eq!(serde_json::to_string(&caps).unwrap(), r#"{"scope":"local"}"#);
    }
}
