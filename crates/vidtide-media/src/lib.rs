use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// A successfully stored media object.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub url: String,
}

/// Media-hosting port. Handlers stage incoming bytes to a spool file first,
/// then hand the staged path over; a failed upload consumes (deletes) the
/// staged file either way.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, staged: &Path) -> Result<StoredMedia>;

    /// Remove a previously stored object by its public URL. Used to
    /// compensate when a database write fails after an upload succeeded.
    async fn remove(&self, url: &str) -> Result<()>;
}

/// Disk-backed media store.
///
/// Objects are stored content-addressed as `{dir}/{sha256}.{ext}` and served
/// under `{base_url}/`. Re-uploading identical bytes is idempotent.
pub struct DiskMediaStore {
    dir: PathBuf,
    base_url: String,
}

impl DiskMediaStore {
    pub async fn new(dir: PathBuf, base_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self {
            dir,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    async fn upload(&self, staged: &Path) -> Result<StoredMedia> {
        let result = self.store(staged).await;

        // The staged spool file is consumed on success (moved) and removed on
        // failure so the spool directory never accumulates orphans.
        if result.is_err() {
            if let Err(e) = fs::remove_file(staged).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to clean staged file {}: {}", staged.display(), e);
                }
            }
        }

        result
    }

    async fn remove(&self, url: &str) -> Result<()> {
        let Some(name) = url
            .strip_prefix(self.base_url.as_str())
            .map(|s| s.trim_start_matches('/'))
        else {
            bail!("URL {} does not belong to this media store", url);
        };
        if name.is_empty() || name.contains('/') || name.contains("..") {
            bail!("Refusing to remove suspicious media name: {}", name);
        }

        match fs::remove_file(self.dir.join(name)).await {
            Ok(()) => {
                info!("Removed media object {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media object {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl DiskMediaStore {
    async fn store(&self, staged: &Path) -> Result<StoredMedia> {
        let bytes = fs::read(staged).await?;
        if bytes.is_empty() {
            bail!("Staged file {} is empty", staged.display());
        }

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let name = match file_extension(staged) {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest,
        };
        let dest = self.dir.join(&name);

        if fs::try_exists(&dest).await? {
            // Content-addressed: identical bytes are already in place.
            fs::remove_file(staged).await?;
        } else {
            move_file(staged, &dest).await?;
        }

        info!("Stored media object {}", name);
        Ok(StoredMedia {
            url: format!("{}/{}", self.base_url, name),
        })
    }
}

/// Write an incoming upload to a spool file, preserving a sanitized
/// extension from the client-supplied name. Returns the staged path.
pub async fn stage_to_spool(spool_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(spool_dir).await?;

    let name = match extension_of(original_name) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    };
    let path = spool_dir.join(name);
    fs::write(&path, bytes).await?;
    Ok(path)
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        // Spool and media dirs may live on different filesystems.
        Err(_) => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
            Ok(())
        }
    }
}

fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|e| sanitize_extension(e))
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .and_then(|(stem, ext)| (!stem.is_empty()).then_some(ext))
        .and_then(sanitize_extension)
}

fn sanitize_extension(ext: &str) -> Option<String> {
    let ext = ext.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}
