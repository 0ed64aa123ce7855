//! Application configuration, read once from the environment (and `.env`).

use std::path::PathBuf;

use crate::assets::DirAssets;
use crate::error::StoreError;
use crate::store::LocalStore;

pub const PUBLIC_DIR_VAR: &str = "CERTFORGE_PUBLIC_DIR";
pub const STORE_DIR_VAR: &str = "CERTFORGE_STORE_DIR";
pub const VERIFY_ORIGIN_VAR: &str = "CERTFORGE_VERIFY_ORIGIN";

/// Where the record store lives.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Root of the public assets (`templates/`, `fonts/`, `images/`).
    pub public_dir: PathBuf,
    /// `None` when no store is configured; commands that need one fail
    /// with "store unavailable".
    pub store: Option<StoreConfig>,
    /// Origin used to build verification URLs for QR codes.
    pub verify_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            public_dir: PathBuf::from(get(PUBLIC_DIR_VAR).unwrap_or_else(|| "public".to_string())),
            store: get(STORE_DIR_VAR).map(|root| StoreConfig { root: root.into() }),
            verify_origin: get(VERIFY_ORIGIN_VAR)
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        }
    }

    /// Open the configured store, if any.
    pub fn open_store(&self) -> Result<Option<LocalStore>, StoreError> {
        self.store
            .as_ref()
            .map(|cfg| LocalStore::open(&cfg.root))
            .transpose()
    }

    /// Public assets, with the store's objects mounted at its URL prefix.
    pub fn assets(&self, store: Option<&LocalStore>) -> DirAssets {
        let assets = DirAssets::new(&self.public_dir);
        match store {
            Some(store) => assets.with_mount(store.public_prefix(), store.objects_dir()),
            None => assets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_store() {
        let cfg = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.public_dir, PathBuf::from("public"));
        assert_eq!(cfg.store, None);
        assert_eq!(cfg.verify_origin, "http://localhost:3000");
    }

    #[test]
    fn blank_store_dir_is_none() {
        let cfg = AppConfig::from_lookup(lookup(&[(STORE_DIR_VAR, "  ")]));
        assert!(cfg.store.is_none());
        assert!(cfg.open_store().unwrap().is_none());
    }

    #[test]
    fn store_dir_is_opened() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let cfg = AppConfig::from_lookup(lookup(&[
            (STORE_DIR_VAR, root.to_str().unwrap()),
            (VERIFY_ORIGIN_VAR, "https://certs.example"),
        ]));
        let store = cfg.open_store().unwrap().unwrap();
        assert!(store.objects_dir().exists());
        assert_eq!(cfg.verify_origin, "https://certs.example");
    }
}
