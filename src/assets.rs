//! Asset sources – resolve template, font and image locations to bytes.
//!
//! Locations look like the public paths a web front end would serve
//! (`/fonts/Cairo-Regular.ttf`, `/images/Taif.jpg`, `/storage/photo_x.png`)
//! or are inline `data:` URIs. Remote `http(s)` URLs are not fetched.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::error::FetchError;

/// Bytes plus whatever content type the source reported.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Anything that can turn an asset location into bytes.
pub trait AssetSource {
    fn fetch(&self, location: &str) -> Result<FetchedAsset, FetchError>;
}

impl<T: AssetSource + ?Sized> AssetSource for &T {
    fn fetch(&self, location: &str) -> Result<FetchedAsset, FetchError> {
        (**self).fetch(location)
    }
}

/// Where the compositor looks for its fixed assets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPaths {
    pub template: String,
    pub display_font: String,
    pub body_font: String,
    /// Prefix joined with `thelogo` to locate the authority logo.
    pub images_prefix: String,
    pub instructions: String,
    /// Used for the photo and QR slots when the record has no URL.
    pub fallback_image: String,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            template: "/templates/certificate.pdf".to_string(),
            display_font: "/fonts/Cairo-Regular.ttf".to_string(),
            body_font: "/fonts/Cairo-VariableFont_slnt_wght.ttf".to_string(),
            images_prefix: "/images/".to_string(),
            instructions: "/images/instructions-full.png".to_string(),
            fallback_image: "/images/default.jpg".to_string(),
        }
    }
}

impl AssetPaths {
    /// Location of an authority logo file.
    pub fn logo(&self, file_name: &str) -> String {
        format!("{}{}", self.images_prefix, file_name.trim_start_matches('/'))
    }
}

/// Assets served from a public directory, with optional extra mounts
/// (e.g. `/storage/` for uploaded objects).
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
    mounts: Vec<(String, PathBuf)>,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounts: Vec::new(),
        }
    }

    /// Serve `prefix/...` from `dir` instead of the public root.
    pub fn with_mount(mut self, prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.mounts.push((prefix, dir.into()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, FetchError> {
        let (base, rest) = self
            .mounts
            .iter()
            .find_map(|(prefix, dir)| location.strip_prefix(prefix.as_str()).map(|r| (dir, r)))
            .unwrap_or((&self.root, location));

        let relative = Path::new(rest.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FetchError::NotFound(location.to_string()));
        }
        Ok(base.join(relative))
    }
}

impl AssetSource for DirAssets {
    fn fetch(&self, location: &str) -> Result<FetchedAsset, FetchError> {
        if location.starts_with("data:") {
            return parse_data_uri(location);
        }
        if location.contains("://") {
            return Err(FetchError::UnsupportedScheme(location.to_string()));
        }

        let path = self.resolve(location)?;
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(location.to_string()),
            _ => FetchError::Io {
                path: path.display().to_string(),
                source: e,
            },
        })?;
        let content_type = mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_string());
        log::debug!("fetched {location} ({} bytes)", bytes.len());
        Ok(FetchedAsset { bytes, content_type })
    }
}

/// In-memory assets keyed by location.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    assets: HashMap<String, FetchedAsset>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, bytes: Vec<u8>, content_type: Option<&str>) {
        self.assets.insert(
            location.into(),
            FetchedAsset {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub fn with(mut self, location: impl Into<String>, bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        self.insert(location, bytes, content_type);
        self
    }

    pub fn remove(&mut self, location: &str) -> Option<FetchedAsset> {
        self.assets.remove(location)
    }
}

impl AssetSource for MemoryAssets {
    fn fetch(&self, location: &str) -> Result<FetchedAsset, FetchError> {
        if location.starts_with("data:") {
            return parse_data_uri(location);
        }
        self.assets
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(location.to_string()))
    }
}

/// Parse a `data:<mime>;base64,<data>` URI.
pub fn parse_data_uri(src: &str) -> Result<FetchedAsset, FetchError> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::InvalidDataUri("missing `data:` prefix".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidDataUri("missing `,` separator".to_string()))?;
    let mut params = header.split(';');
    let mime = params.next().unwrap_or("").trim();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(FetchError::InvalidDataUri(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    let bytes = BASE64_STD
        .decode(data.trim())
        .map_err(|e| FetchError::InvalidDataUri(format!("base64 decode error: {e}")))?;
    Ok(FetchedAsset {
        bytes,
        content_type: (!mime.is_empty()).then(|| mime.to_string()),
    })
}

/// Encode bytes as a base64 data URI.
pub fn to_data_uri(bytes: &[u8], content_type: &str) -> String {
    format!("data:{content_type};base64,{}", BASE64_STD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_roundtrip() {
        let uri = to_data_uri(b"hello", "image/png");
        let asset = parse_data_uri(&uri).unwrap();
        assert_eq!(asset.bytes, b"hello");
        assert_eq!(asset.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn data_uri_requires_base64() {
        assert!(matches!(
            parse_data_uri("data:text/plain,hello"),
            Err(FetchError::InvalidDataUri(_))
        ));
        assert!(parse_data_uri("data:image/png;base64").is_err());
        assert!(parse_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn dir_assets_guess_content_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();
        fs::write(dir.path().join("images/Taif.jpg"), b"jpeg bytes").unwrap();

        let assets = DirAssets::new(dir.path());
        let asset = assets.fetch("/images/Taif.jpg").unwrap();
        assert_eq!(asset.bytes, b"jpeg bytes");
        assert_eq!(asset.content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn dir_assets_errors() {
        let dir = tempfile::tempdir().unwrap();
        let assets = DirAssets::new(dir.path());
        assert!(matches!(assets.fetch("/images/none.png"), Err(FetchError::NotFound(_))));
        assert!(matches!(
            assets.fetch("https://example.com/a.png"),
            Err(FetchError::UnsupportedScheme(_))
        ));
        assert!(matches!(assets.fetch("/../etc/passwd"), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn mounts_take_precedence() {
        let public = tempfile::tempdir().unwrap();
        let objects = tempfile::tempdir().unwrap();
        fs::write(objects.path().join("photo_1.png"), b"png").unwrap();

        let assets = DirAssets::new(public.path()).with_mount("/storage", objects.path());
        let asset = assets.fetch("/storage/photo_1.png").unwrap();
        assert_eq!(asset.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn logo_location_joins_prefix() {
        assert_eq!(AssetPaths::default().logo("Taif.jpg"), "/images/Taif.jpg");
    }
}
