use super::{sanitize_title, CoverStore};
use crate::models::{CoverImage, SavedCover};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockCoverStore {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    failing_saves: Arc<Mutex<HashSet<usize>>>,
    save_count: Arc<Mutex<usize>>,
    base_path: PathBuf,
}

impl MockCoverStore {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            failing_saves: Arc::new(Mutex::new(HashSet::new())),
            save_count: Arc::new(Mutex::new(0)),
            base_path: PathBuf::from("/tmp/covers"),
        }
    }

    pub fn with_base_path(mut self, path: PathBuf) -> Self {
        self.base_path = path;
        self
    }

    /// Fail the `save`-th call (1-based) with an IO error.
    pub fn with_failure_on_save(self, save: usize) -> Self {
        self.failing_saves.lock().unwrap().insert(save);
        self
    }

    pub fn get_save_count(&self) -> usize {
        *self.save_count.lock().unwrap()
    }

    pub fn get_files(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }
}

impl Default for MockCoverStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverStore for MockCoverStore {
    async fn save(&self, cover: &CoverImage) -> Result<SavedCover> {
        let call = {
            let mut count = self.save_count.lock().unwrap();
            *count += 1;
            *count
        };

        if self.failing_saves.lock().unwrap().contains(&call) {
            return Err(Error::Io(std::io::Error::other("Mock disk full")));
        }

        let dir = self.base_path.join(sanitize_title(&cover.title));
        let image_path = dir.join(format!("cover_{}_{}.png", cover.variant_index, call));
        let description_path = dir.join(format!("description_{}_{}.txt", cover.variant_index, call));

        let mut files = self.files.lock().unwrap();
        files.insert(image_path.clone(), cover.bytes.clone());
        files.insert(
            description_path.clone(),
            cover.description.text.as_bytes().to_vec(),
        );

        Ok(SavedCover {
            variant_index: cover.variant_index,
            image_path,
            description_path,
            description: cover.description.text.clone(),
        })
    }

    async fn read_image(&self, cover: &SavedCover) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&cover.image_path)
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not stored", cover.image_path.display()),
                ))
            })
    }
}
