//! Recording storage for the batch transcription path.
//!
//! Filesystem-backed: each uploaded recording is written under the
//! configured recordings directory keyed by a generated id. Writes go to a
//! temporary file first and are renamed into place, so a failed upload
//! never leaves a partial recording behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Time-limited reference to a stored recording.
#[derive(Debug, Clone, Serialize)]
pub struct AccessRef {
    /// Opaque reference the caller can use to fetch the recording
    pub reference: String,

    /// When the reference stops being honored
    pub expires_at: DateTime<Utc>,
}

pub struct RecordingStore {
    root: PathBuf,
    access_ttl: Duration,
}

impl RecordingStore {
    pub fn new(root: impl Into<PathBuf>, access_ttl: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create recordings dir {}", root.display()))?;
        Ok(Self { root, access_ttl })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Ids are always UUIDs we generated; parsing rules out traversal
        let id = Uuid::parse_str(id).context("Invalid recording id")?;
        Ok(self.root.join(format!("{}.raw", id)))
    }

    /// Persist a recording and return its generated id.
    pub async fn save(&self, bytes: &[u8]) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let path = self.path_for(&id)?;
        let tmp = path.with_extension("tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write recording to {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            // Leave nothing behind on failure
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to finalize {}", path.display()));
        }

        info!("Stored recording {} ({} bytes)", id, bytes.len());

        Ok(id)
    }

    /// Read a stored recording back.
    pub async fn load(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.path_for(id)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read recording {}", id))
    }

    /// Produce a time-limited access reference for a stored recording.
    ///
    /// The reference is opaque (recording id plus expiry), never the
    /// on-disk path; callers redeem it against the recordings surface.
    pub async fn access_ref(&self, id: &str) -> Result<AccessRef> {
        let path = self.path_for(id)?;
        tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Recording {} not found", id))?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.access_ttl).unwrap_or(chrono::Duration::hours(1));

        Ok(AccessRef {
            reference: format!("recordings/{}?expires={}", id, expires_at.timestamp()),
            expires_at,
        })
    }

    /// Remove a stored recording.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete recording {}", id))?;
        info!("Deleted recording {}", id);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
