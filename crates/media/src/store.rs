use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use {rand::Rng, tokio::io::AsyncWriteExt, tracing::info};

use crate::mime;

/// URL prefix under which stored uploads are served.
pub const URL_PREFIX: &str = "/uploads";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file type not allowed: {0}")]
    MimeNotAllowed(String),
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("upload io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata of a stored upload, as handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_name: String,
    /// Relative URL, e.g. `/uploads/1700000000000-123456.pdf`.
    pub url: String,
    pub mime: String,
    pub original_name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: u64,
    allowed_mime: Vec<String>,
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, allowed_mime: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            allowed_mime,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        if !tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::create_dir_all(&self.dir).await?;
            info!(dir = %self.dir.display(), "created upload directory");
        }
        Ok(())
    }

    /// Validate a content type against the allowlist, returning it normalized.
    pub fn check_mime(&self, content_type: &str) -> Result<String, UploadError> {
        if mime::is_allowed(content_type, &self.allowed_mime) {
            Ok(mime::normalize(content_type))
        } else {
            Err(UploadError::MimeNotAllowed(content_type.to_string()))
        }
    }

    pub fn check_size(&self, size: u64) -> Result<(), UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// `<unix-millis>-<random>` plus the original extension.
    pub fn generate_name(original_name: &str) -> String {
        let random: u32 = rand::rng().random_range(0..1_000_000_000);
        format!(
            "{}-{random}{}",
            now_ms(),
            mime::extension_of(original_name)
        )
    }

    pub async fn save(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredUpload, UploadError> {
        let mime = self.check_mime(content_type)?;
        self.check_size(bytes.len() as u64)?;
        self.ensure_dir().await?;

        let file_name = Self::generate_name(original_name);
        let path = self.dir.join(&file_name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        info!(file = %file_name, mime = %mime, size = bytes.len(), "stored upload");
        Ok(StoredUpload {
            url: format!("{URL_PREFIX}/{file_name}"),
            file_name,
            mime,
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
        })
    }
}
