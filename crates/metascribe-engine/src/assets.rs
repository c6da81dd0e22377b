use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::client::ImagePayload;

pub const SLUG_MAX_CHARS: usize = 50;
pub const FALLBACK_SLUG: &str = "image";
pub const DEFAULT_EXTENSION: &str = "png";

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/bmp", "bmp"),
];

/// Lower-cases, collapses every run of non-alphanumeric characters into one
/// `-`, trims separators and caps the result at [`SLUG_MAX_CHARS`].
pub fn slugify_instruction(instruction: &str) -> String {
    let mut slug = String::new();
    let mut pending_separator = false;
    for ch in instruction.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }
    let truncated: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    let trimmed = truncated.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let normalized = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == normalized)
        .map(|(_, ext)| *ext)
        .unwrap_or(DEFAULT_EXTENSION)
}

/// `![alt](reference)` with brackets in the alt text and spaces in the
/// reference escaped.
pub fn markdown_image(reference: &str, alt: &str) -> String {
    let alt = alt.replace('[', "\\[").replace(']', "\\]");
    let reference = reference.replace(' ', "%20");
    format!("![{alt}]({reference})")
}

/// Writes generated images under a fixed folder of the document root.
#[derive(Debug, Clone)]
pub struct AssetMaterializer {
    root: PathBuf,
    folder: PathBuf,
}

impl AssetMaterializer {
    pub fn new(root: impl Into<PathBuf>, folder: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Persists `payload` as `<slug>-<millis>.<ext>`. Each call creates a new
    /// file; an existing name bumps the timestamp until it is free.
    pub fn materialize(&self, payload: &ImagePayload, instruction: &str) -> Result<PathBuf> {
        ensure_folder(&self.folder)?;
        let slug = slugify_instruction(instruction);
        let ext = extension_for_mime(&payload.mime_type);
        let mut stamp = timestamp_millis();
        let mut path = self.folder.join(format!("{slug}-{stamp}.{ext}"));
        while path.exists() {
            stamp += 1;
            path = self.folder.join(format!("{slug}-{stamp}.{ext}"));
        }
        fs::write(&path, &payload.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Path of `asset` relative to the document root, `/`-separated, for
    /// embedding in a document.
    pub fn reference_for(&self, asset: &Path) -> String {
        let relative = asset.strip_prefix(&self.root).unwrap_or(asset);
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn ensure_folder(folder: &Path) -> Result<()> {
    match fs::create_dir_all(folder) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists && folder.is_dir() => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to create {}", folder.display()))
        }
    }
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}
