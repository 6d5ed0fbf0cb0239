use super::{sanitize_title, CoverStore};
use crate::ai::mime::detect_image_kind;
use crate::models::{CoverImage, SavedCover};
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub(super) const MAX_NAME_ATTEMPTS: usize = 100;

/// Writes covers under `<root>/<sanitized title>/`, tagging every file with
/// the run id so later runs never overwrite earlier ones.
pub struct FsCoverStore {
    root: PathBuf,
    run_id: String,
}

impl FsCoverStore {
    pub fn new(root: &Path, run_id: String) -> Self {
        Self {
            root: root.to_path_buf(),
            run_id,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn title_dir(&self, title: &str) -> PathBuf {
        self.root.join(sanitize_title(title))
    }

    fn file_tag(&self, variant_index: u8, attempt: usize) -> String {
        if attempt == 0 {
            format!("{}_{}", variant_index, self.run_id)
        } else {
            format!("{}_{}-{}", variant_index, self.run_id, attempt + 1)
        }
    }
}

pub(super) async fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
    }
}

#[async_trait]
impl CoverStore for FsCoverStore {
    async fn save(&self, cover: &CoverImage) -> Result<SavedCover> {
        let dir = self.title_dir(&cover.title);
        tokio::fs::create_dir_all(&dir).await?;

        let extension = detect_image_kind(&cover.bytes).extension();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let tag = self.file_tag(cover.variant_index, attempt);
            let image_path = dir.join(format!("cover_{}.{}", tag, extension));
            let description_path = dir.join(format!("description_{}.txt", tag));

            match write_new(&image_path, &cover.bytes).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!("{} already exists, picking another name", image_path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            // The image and its description must share a tag.
            match write_new(&description_path, cover.description.text.as_bytes()).await {
                Ok(()) => {}
                Err(e) => {
                    discard(&image_path).await;
                    if e.kind() == ErrorKind::AlreadyExists {
                        tracing::warn!(
                            "{} already exists, picking another name",
                            description_path.display()
                        );
                        continue;
                    }
                    return Err(e.into());
                }
            }

            tracing::debug!(
                "Saved cover {} for '{}' to {}",
                cover.variant_index,
                cover.title,
                image_path.display()
            );

            return Ok(SavedCover {
                variant_index: cover.variant_index,
                image_path,
                description_path,
                description: cover.description.text.clone(),
            });
        }

        Err(Error::Invariant(format!(
            "No free file name for cover {} of '{}' in {}",
            cover.variant_index,
            cover.title,
            dir.display()
        )))
    }

    async fn read_image(&self, cover: &SavedCover) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&cover.image_path).await?)
    }
}
