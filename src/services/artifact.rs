/// Artifact persistence
///
/// The trained scorer state is persisted as a single JSON blob carrying the
/// tagged union in [`TrainedArtifact`]. Writes go through a temp file and a
/// rename so rebuilds overwrite the blob atomically.
use std::path::{Path, PathBuf};

use crate::{
    error::{AppError, AppResult},
    models::TrainedArtifact,
};

const ARTIFACT_FILE: &str = "scorer.json";

#[derive(Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE)
    }

    /// Load the persisted artifact.
    ///
    /// `Ok(None)` when nothing has been persisted yet; `ArtifactCorrupt` when
    /// the blob exists but cannot be decoded (callers retrain on that).
    pub async fn load(&self) -> AppResult<Option<TrainedArtifact>> {
        let path = self.path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let artifact = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::ArtifactCorrupt(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(artifact))
    }

    /// Persist an artifact, overwriting any previous state atomically
    pub async fn save(&self, artifact: &TrainedArtifact) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let bytes = serde_json::to_vec(artifact)
            .map_err(|e| AppError::Internal(format!("Failed to encode artifact: {}", e)))?;

        let tmp = self.dir.join(format!("{}.tmp", ARTIFACT_FILE));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.path()).await?;

        tracing::info!(
            mode = artifact.mode(),
            items = artifact.item_order().len(),
            path = %self.path().display(),
            "Scorer artifact persisted"
        );
        Ok(())
    }
}
