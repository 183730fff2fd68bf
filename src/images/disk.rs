/// Disk-based image storage backend
use crate::{
    error::{AppError, AppResult},
    images::ImageBackend,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores images on the local filesystem, sharded by the first two
/// characters of the file name to keep directories small.
#[derive(Clone)]
pub struct DiskImageBackend {
    base_path: PathBuf,
}

impl DiskImageBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// `{base}/{first2chars}/{file_name}`
    fn image_path(&self, file_name: &str) -> AppResult<PathBuf> {
        // Names come from URLs; refuse anything that could escape the base directory
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return Err(AppError::Validation(format!("Invalid image name: {}", file_name)));
        }

        let shard = file_name.get(0..2).unwrap_or("_");
        Ok(self.base_path.join(shard).join(file_name))
    }
}

#[async_trait]
impl ImageBackend for DiskImageBackend {
    async fn put(&self, file_name: &str, data: Vec<u8>) -> AppResult<()> {
        let path = self.image_path(file_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&path, data).await.map_err(|e| {
            AppError::Internal(format!("Failed to write image {}: {}", file_name, e))
        })?;

        Ok(())
    }

    async fn get(&self, file_name: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.image_path(file_name)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, file_name: &str) -> AppResult<()> {
        let path = self.image_path(file_name)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, file_name: &str) -> AppResult<bool> {
        let path = self.image_path(file_name)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn size(&self, file_name: &str) -> AppResult<Option<u64>> {
        let path = self.image_path(file_name)?;

        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
