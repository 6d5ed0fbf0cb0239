//! Persistence of generated covers
//!
//! Writes each cover image and its description to a per-title directory and
//! hands back references for display and download.

pub mod fs;
pub mod mock;

pub use fs::FsCoverStore;
pub use mock::MockCoverStore;

use crate::ai::mime::ImageKind;
use crate::models::{CoverImage, SavedCover, TitleReport};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Local;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_DIR_NAME_LEN: usize = 100;
const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

/// A cover ready to hand to the user as a PNG file.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait CoverStore: Send + Sync {
    async fn save(&self, cover: &CoverImage) -> Result<SavedCover>;
    async fn read_image(&self, cover: &SavedCover) -> Result<Vec<u8>>;

    async fn download(&self, title: &str, cover: &SavedCover) -> Result<Download> {
        let bytes = self.read_image(cover).await?;
        Ok(Download {
            file_name: download_file_name(title, cover.variant_index),
            mime: ImageKind::Png.mime(),
            bytes: to_png(bytes).await?,
        })
    }
}

/// Write a PNG download of every saved cover into `dest`.
///
/// Individual failures are logged and skipped; the paths written are returned
/// in report order.
pub async fn export_downloads(
    store: &dyn CoverStore,
    reports: &[TitleReport],
    dest: &Path,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dest).await?;

    let mut written = Vec::new();
    for report in reports {
        for cover in report.saved_covers() {
            let download = match store.download(&report.title, cover).await {
                Ok(download) => download,
                Err(e) => {
                    tracing::warn!(
                        "Skipping download of cover {} for '{}': {}",
                        cover.variant_index,
                        report.title,
                        e
                    );
                    continue;
                }
            };
            match write_export(dest, &download).await {
                Ok(path) => written.push(path),
                Err(e) => tracing::warn!(
                    "Failed to export cover {} for '{}': {}",
                    cover.variant_index,
                    report.title,
                    e
                ),
            }
        }
    }
    Ok(written)
}

/// Write without replacing: a taken name gets a `-N` suffix before the
/// extension.
async fn write_export(dest: &Path, download: &Download) -> Result<PathBuf> {
    let (stem, extension) = download
        .file_name
        .rsplit_once('.')
        .unwrap_or((download.file_name.as_str(), "png"));

    for attempt in 0..fs::MAX_NAME_ATTEMPTS {
        let path = if attempt == 0 {
            dest.join(&download.file_name)
        } else {
            dest.join(format!("{}-{}.{}", stem, attempt + 1, extension))
        };
        match fs::write_new(&path, &download.bytes).await {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Invariant(format!(
        "No free file name for {} in {}",
        download.file_name,
        dest.display()
    )))
}

/// Directory-safe form of a title: whitespace and path-unsafe characters
/// become `_`.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed: String = replaced
        .trim_start_matches('.')
        .chars()
        .take(MAX_DIR_NAME_LEN)
        .collect();

    if trimmed.trim_matches(|c| c == '_' || c == '.').is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

pub fn download_file_name(title: &str, variant_index: u8) -> String {
    format!("{}_cover_{}.png", sanitize_title(title), variant_index)
}

/// Identifier embedded in every file name written during one run.
pub fn new_run_id() -> String {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", stamp, &suffix[..8])
}

/// Re-encode image bytes as PNG unless they already are.
pub async fn to_png(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.starts_with(PNG_SIGNATURE) {
        return Ok(bytes);
    }

    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let img = image::load_from_memory(&bytes)?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    })
    .await
    .map_err(|e| Error::Invariant(format!("PNG conversion task join error: {}", e)))?
}
