//! Local Asset Store
//!
//! Uploaded files live under one root directory and are addressed by
//! `asset://<percent-encoded relative path>` URLs.

use std::path::{Component, Path, PathBuf};

use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use pageboard_sync::{AssetKind, PendingAsset};

use crate::domain::{DomainError, DomainResult};

const SCHEME: &str = "asset://";

/// Characters left readable in asset URLs
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `asset` at `path` (relative to the root) and return its URL
    pub async fn upload(&self, asset: &PendingAsset, path: &str) -> DomainResult<String> {
        let relative = checked_relative(path)?;
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &asset.bytes).await?;

        let mime = mime_guess::from_path(&target).first_or_octet_stream();
        log::info!("Stored {} ({}, {} bytes)", path, mime, asset.bytes.len());
        Ok(format!("{}{}", SCHEME, utf8_percent_encode(path, PATH_ENCODE_SET)))
    }

    /// File behind an `asset://` URL
    pub fn resolve(&self, url: &str) -> DomainResult<PathBuf> {
        let encoded = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| DomainError::InvalidInput(format!("not an asset url: {}", url)))?;
        let decoded = percent_decode_str(encoded).decode_utf8_lossy();
        Ok(self.root.join(checked_relative(&decoded)?))
    }

    /// Solid-colour SVG placeholder derived from the file's contents.
    ///
    /// Returns `None` for empty files.
    pub async fn derive_preview(&self, url: &str) -> DomainResult<Option<String>> {
        let path = self.resolve(url)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DomainError::NotFound(format!("asset {}", url)),
            _ => DomainError::from(e),
        })?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(placeholder_svg(&bytes)))
    }
}

/// Asset category from a file name's extension
pub fn kind_of(path: &Path) -> AssetKind {
    match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::VIDEO => AssetKind::Video,
        Some(mime) if mime.type_() == mime_guess::mime::IMAGE => AssetKind::Image,
        _ => AssetKind::Document,
    }
}

/// Reject absolute paths and parent traversal
fn checked_relative(path: &str) -> DomainResult<PathBuf> {
    let candidate = Path::new(path);
    let clean = !path.is_empty()
        && candidate
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if clean {
        Ok(candidate.to_path_buf())
    } else {
        Err(DomainError::InvalidInput(format!("invalid asset path: {}", path)))
    }
}

fn placeholder_svg(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    let [r, g, b] = [hash.as_bytes()[0], hash.as_bytes()[1], hash.as_bytes()[2]];
    let svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="9"><rect width="16" height="9" fill="#{:02x}{:02x}{:02x}"/></svg>"##,
        r, g, b
    );
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg)
    )
}
