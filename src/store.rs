//! Record store – certificate rows plus the uploaded photo and QR objects.
//!
//! [`RecordStore`] mirrors a hosted table + bucket: operations return
//! sentinels (`None`, `false`, empty list) and log the cause. [`LocalStore`]
//! keeps one JSON file per row and the objects in a sibling directory.
//! [`CertificateService`] runs the multi-step create and delete flows.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{SecondsFormat, Utc};

use crate::assets::parse_data_uri;
use crate::error::{FetchError, StoreError};
use crate::qr::{qr_png, verification_url};
use crate::record::{CertificateRecord, RecordPatch};

/// Persistence for certificate rows and their file objects.
pub trait RecordStore: Send + Sync {
    /// Insert a row. Returns the stored row (with timestamps).
    fn create(&self, record: &CertificateRecord) -> Option<CertificateRecord>;

    fn get_by_id(&self, id: &str) -> Option<CertificateRecord>;

    /// All rows, newest first.
    fn list_all(&self) -> Vec<CertificateRecord>;

    /// Apply `patch` to a row. `qr_code_url` is never touched.
    fn update(&self, id: &str, patch: &RecordPatch) -> Option<CertificateRecord>;

    /// Remove a row and, best effort, its photo and QR objects.
    fn delete(&self, id: &str) -> bool;

    /// Store an object named `<name_hint>_<unix millis>.<ext>`. Returns its
    /// public URL.
    fn upload_object(&self, bytes: &[u8], content_type: &str, name_hint: &str) -> Option<String>;

    fn delete_object(&self, name: &str) -> bool;
}

/// Object name from a public URL: the last path segment.
pub fn object_name_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// File extension for an uploaded object: the MIME subtype.
fn extension_for(content_type: &str) -> String {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    let subtype = essence.split('/').nth(1).unwrap_or("bin");
    let subtype = subtype.split('+').next().unwrap_or(subtype);
    if subtype.is_empty() {
        "bin".to_string()
    } else {
        subtype.to_ascii_lowercase()
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// File-backed store: `<root>/rows/<id>.json` and `<root>/objects/<name>`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    rows: PathBuf,
    objects: PathBuf,
    public_prefix: String,
}

impl LocalStore {
    /// Public URL prefix under which objects are served.
    pub const DEFAULT_PUBLIC_PREFIX: &'static str = "/storage";

    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let rows = root.join("rows");
        let objects = root.join("objects");
        for dir in [&rows, &objects] {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(Self {
            rows,
            objects,
            public_prefix: Self::DEFAULT_PUBLIC_PREFIX.to_string(),
        })
    }

    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Directory holding uploaded objects (to mount for rendering).
    pub fn objects_dir(&self) -> &Path {
        &self.objects
    }

    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.public_prefix, name)
    }

    fn row_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StoreError::Io {
                path: id.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "invalid record id"),
            });
        }
        Ok(self.rows.join(format!("{id}.json")))
    }

    fn read_row(&self, path: &Path) -> Result<CertificateRecord, StoreError> {
        let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_row(&self, record: &CertificateRecord) -> Result<(), StoreError> {
        let path = self.row_path(&record.id)?;
        fs::write(&path, record.to_json()).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Point stored object URLs at this store's current public prefix.
    fn refresh_urls(&self, record: &mut CertificateRecord) {
        for url in [&mut record.photo_url, &mut record.qr_code_url] {
            let refreshed = url
                .as_deref()
                .filter(|u| !u.starts_with("data:") && !u.contains("://"))
                .and_then(object_name_from_url)
                .map(|name| self.public_url(name));
            if refreshed.is_some() {
                *url = refreshed;
            }
        }
    }

    pub fn try_create(&self, record: &CertificateRecord) -> Result<CertificateRecord, StoreError> {
        record.check_issued()?;
        let path = self.row_path(&record.id)?;
        if path.exists() {
            return Err(StoreError::CreateFailed(record.id.clone()));
        }
        let mut stored = record.clone();
        let now = now_rfc3339();
        stored.created_at.get_or_insert_with(|| now.clone());
        stored.updated_at = Some(now);
        self.write_row(&stored)?;
        Ok(stored)
    }

    pub fn try_get(&self, id: &str) -> Result<Option<CertificateRecord>, StoreError> {
        let path = self.row_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let mut record = self.read_row(&path)?;
        self.refresh_urls(&mut record);
        Ok(Some(record))
    }

    pub fn try_list(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        let entries = fs::read_dir(&self.rows).map_err(|source| StoreError::Io {
            path: self.rows.display().to_string(),
            source,
        })?;
        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_row(&path) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("skipping unreadable row: {e}"),
            }
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    pub fn try_update(&self, id: &str, patch: &RecordPatch) -> Result<Option<CertificateRecord>, StoreError> {
        let path = self.row_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let mut record = self.read_row(&path)?;
        patch.apply(&mut record);
        record.check_issued()?;
        record.updated_at = Some(now_rfc3339());
        self.write_row(&record)?;
        Ok(Some(record))
    }

    pub fn try_upload(&self, bytes: &[u8], content_type: &str, name_hint: &str) -> Result<String, StoreError> {
        let name = format!(
            "{}_{}.{}",
            name_hint,
            Utc::now().timestamp_millis(),
            extension_for(content_type)
        );
        let path = self.objects.join(&name);
        fs::write(&path, bytes).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(self.public_url(&name))
    }
}

impl RecordStore for LocalStore {
    fn create(&self, record: &CertificateRecord) -> Option<CertificateRecord> {
        self.try_create(record)
            .map_err(|e| log::error!("create {}: {e}", record.id))
            .ok()
    }

    fn get_by_id(&self, id: &str) -> Option<CertificateRecord> {
        self.try_get(id)
            .map_err(|e| log::error!("get {id}: {e}"))
            .ok()
            .flatten()
    }

    fn list_all(&self) -> Vec<CertificateRecord> {
        self.try_list()
            .map_err(|e| log::error!("list: {e}"))
            .unwrap_or_default()
    }

    fn update(&self, id: &str, patch: &RecordPatch) -> Option<CertificateRecord> {
        self.try_update(id, patch)
            .map_err(|e| log::error!("update {id}: {e}"))
            .ok()
            .flatten()
    }

    fn delete(&self, id: &str) -> bool {
        let record = match self.try_get(id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                log::error!("delete {id}: no such certificate");
                return false;
            }
            Err(e) => {
                log::error!("delete {id}: {e}");
                return false;
            }
        };

        for url in [&record.photo_url, &record.qr_code_url].into_iter().flatten() {
            if let Some(name) = object_name_from_url(url) {
                if !self.delete_object(name) {
                    log::warn!("delete {id}: could not remove object {name}");
                }
            }
        }

        let removed = self
            .row_path(id)
            .and_then(|path| {
                fs::remove_file(&path).map_err(|source| StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            });
        match removed {
            Ok(()) => true,
            Err(e) => {
                log::error!("delete {id}: {e}");
                false
            }
        }
    }

    fn upload_object(&self, bytes: &[u8], content_type: &str, name_hint: &str) -> Option<String> {
        self.try_upload(bytes, content_type, name_hint)
            .map_err(|e| log::error!("upload {name_hint}: {e}"))
            .ok()
    }

    fn delete_object(&self, name: &str) -> bool {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return false;
        }
        fs::remove_file(self.objects.join(name)).is_ok()
    }
}

/// An image to upload with a new certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Upload {
    /// Accept a `data:<mime>;base64,...` URI as produced by a browser
    /// file input.
    pub fn from_data_uri(uri: &str) -> Result<Self, FetchError> {
        let asset = parse_data_uri(uri)?;
        Ok(Self {
            bytes: asset.bytes,
            content_type: asset
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        })
    }
}

/// The create/delete flows on top of a store.
pub struct CertificateService<'a> {
    store: &'a dyn RecordStore,
    verify_origin: String,
}

impl<'a> CertificateService<'a> {
    pub fn new(store: &'a dyn RecordStore, verify_origin: impl Into<String>) -> Self {
        Self {
            store,
            verify_origin: verify_origin.into(),
        }
    }

    /// Create a certificate.
    ///
    /// The id is fixed first; the photo and the verification QR code are then
    /// uploaded concurrently, and the row is written with both URLs. A failed
    /// upload leaves the corresponding URL empty.
    pub fn create(
        &self,
        mut draft: CertificateRecord,
        photo: Option<Upload>,
    ) -> Result<CertificateRecord, StoreError> {
        if draft.id.trim().is_empty() {
            draft.id = uuid::Uuid::new_v4().to_string();
        }
        draft.check_issued()?;

        let url = verification_url(&self.verify_origin, &draft.id);
        let photo_hint = draft.photo_object_hint();
        let qr_hint = draft.qr_object_hint();
        let store = self.store;

        let (photo_url, qr_code_url) = thread::scope(|s| {
            let photo_task = photo.as_ref().map(|upload| {
                s.spawn(move || store.upload_object(&upload.bytes, &upload.content_type, &photo_hint))
            });
            let qr_task = s.spawn(move || match qr_png(&url) {
                Ok(png) => store.upload_object(&png, "image/png", &qr_hint),
                Err(e) => {
                    log::error!("QR code for {url}: {e}");
                    None
                }
            });

            let photo_url = photo_task.and_then(|t| t.join().ok().flatten());
            let qr_code_url = qr_task.join().ok().flatten();
            (photo_url, qr_code_url)
        });

        if photo.is_some() && photo_url.is_none() {
            log::warn!("photo upload failed for {}", draft.id);
        }
        if qr_code_url.is_none() {
            log::warn!("QR upload failed for {}", draft.id);
        }
        if photo_url.is_some() {
            draft.photo_url = photo_url;
        }
        draft.qr_code_url = qr_code_url;

        self.store
            .create(&draft)
            .ok_or_else(|| StoreError::CreateFailed(draft.id.clone()))
    }

    pub fn update(&self, id: &str, patch: &RecordPatch) -> Option<CertificateRecord> {
        self.store.update(id, patch)
    }

    pub fn delete(&self, id: &str) -> bool {
        self.store.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Authority;

    #[test]
    fn object_names_come_from_last_segment() {
        assert_eq!(object_name_from_url("/storage/photo_1_2.png"), Some("photo_1_2.png"));
        assert_eq!(
            object_name_from_url("https://x.example/o/public/certificates/qrcode_a.png?t=1"),
            Some("qrcode_a.png")
        );
        assert_eq!(object_name_from_url("/storage/"), None);
    }

    #[test]
    fn extension_is_mime_subtype() {
        assert_eq!(extension_for("image/jpeg"), "jpeg");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("image/png; q=1"), "png");
        assert_eq!(extension_for("garbage"), "bin");
    }

    #[test]
    fn upload_names_follow_hint() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let url = store.upload_object(b"x", "image/png", "photo_abc").unwrap();
        let name = object_name_from_url(&url).unwrap();
        assert!(url.starts_with("/storage/photo_abc_"));
        assert!(name.ends_with(".png"));
        assert!(store.objects_dir().join(name).exists());
    }

    #[test]
    fn duplicate_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let record = CertificateRecord::new(Authority::Taif);
        assert!(store.create(&record).is_some());
        assert!(store.create(&record).is_none());
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.get_by_id("../secret").is_none());
        assert!(!store.delete_object("../rows/x.json"));
    }
}
