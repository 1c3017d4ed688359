use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::constants::RECIPE_IMAGE_DIR;

/// Storage-relative path for an uploaded recipe image:
/// `uploads/recipes/<uuid><original extension>`.
pub fn recipe_image_path(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    format!("{RECIPE_IMAGE_DIR}/{}{extension}", Uuid::new_v4())
}

pub fn is_image(data: &[u8]) -> bool {
    image::guess_format(data).is_ok()
}

/// A file received in a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Files under `root`, published under `base_url`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    base_url: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of a stored file.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    pub async fn save(&self, path: &str, data: &[u8]) -> std::io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&target, data).await
    }

    /// Removing a file that is already gone is not an error.
    pub async fn remove(&self, path: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}
