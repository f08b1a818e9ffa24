use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::keys::default_namespace;

/// How multi-key writes (create, update, delete) are carried out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Issue each key write in sequence. A failure part-way leaves earlier
    /// writes in place.
    #[default]
    Simple,
    /// Record the intended write under a pending key first and clear it once
    /// every step has succeeded. Unfinished writes are re-driven by
    /// [`AccountStore::recover`](crate::AccountStore::recover).
    Journaled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix prepended to every key, verbatim.
    pub namespace: String,
    pub write_mode: WriteMode,
    /// Fall back to scanning the older login index layout when the exact
    /// login key does not resolve.
    pub legacy_login_scan: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace().to_string(),
            write_mode: WriteMode::default(),
            legacy_login_scan: true,
        }
    }
}

impl StoreConfig {
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        toml::from_str(raw).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.write_mode, WriteMode::Simple);
        assert!(c.legacy_login_scan);
        assert_eq!(c.namespace, default_namespace());
    }

    #[test]
    fn parse_full_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            namespace = "myapp:"
            write_mode = "journaled"
            legacy_login_scan = false
            "#,
        )
        .unwrap();
        assert_eq!(c.namespace, "myapp:");
        assert_eq!(c.write_mode, WriteMode::Journaled);
        assert!(!c.legacy_login_scan);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c = StoreConfig::from_toml_str(r#"namespace = "x:""#).unwrap();
        assert_eq!(c.namespace, "x:");
        assert_eq!(c.write_mode, WriteMode::Simple);
        assert!(c.legacy_login_scan);
    }

    #[test]
    fn bad_write_mode_is_rejected() {
        let err = StoreConfig::from_toml_str(r#"write_mode = "eventually""#).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvident.toml");
        std::fs::write(&path, "namespace = \"file:\"\n").unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap().namespace, "file:");
        assert!(StoreConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
