//! Staging store adapter
//!
//! A batch travels to the warehouse as a CSV artifact: written to local
//! scratch space, uploaded flat under the staging bucket, local copy removed,
//! and the remote copy deleted once the warehouse has loaded it.
//!
//! Artifact keys carry the channel id and the sweep id so two channels, or a
//! crashed earlier run, never share a key. Leftovers from crashed runs are
//! attributable by prefix and removed with [`StagingStore::prune_orphans`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::models::{ArtifactRef, ChannelTarget, SweepId, ViewerSnapshotRow, SNAPSHOT_COLUMNS};

pub mod s3;

pub use s3::S3ObjectStore;

/// Key prefix shared by every staged artifact
pub const ARTIFACT_PREFIX: &str = "live_videos_";

/// Object store capability used for staging
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Upload the file at `path` to `key`
    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Flat artifact key for one channel in one sweep
pub fn artifact_key(channel: &ChannelTarget, sweep: SweepId) -> String {
    let channel: String = channel
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("{}{}_{}.csv", ARTIFACT_PREFIX, channel, sweep)
}

/// Serialize a batch as CSV: one header line, then one line per row
pub fn render_csv(batch: &[ViewerSnapshotRow]) -> streamtally_common::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(SNAPSHOT_COLUMNS)?;
    for row in batch {
        writer.serialize(row)?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

pub struct StagingStore {
    store: Arc<dyn ObjectStore>,
    scratch_dir: PathBuf,
}

impl StagingStore {
    pub fn new(store: Arc<dyn ObjectStore>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Write `batch` to scratch, upload it, and drop the local copy.
    ///
    /// The local file is removed whether or not the write and upload succeeded.
    #[instrument(skip(self, batch), fields(channel_id = %channel, rows = batch.len()))]
    pub async fn stage(
        &self,
        batch: &[ViewerSnapshotRow],
        channel: &ChannelTarget,
        sweep: SweepId,
    ) -> Result<ArtifactRef> {
        let key = artifact_key(channel, sweep);
        let local_path = self.scratch_dir.join(&key);
        let body = render_csv(batch).context("Failed to render staging CSV")?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .with_context(|| format!("Failed to create scratch dir {}", self.scratch_dir.display()))?;

        let uploaded = self.write_and_upload(&key, &local_path, &body).await;
        remove_scratch(&local_path).await;
        uploaded?;
        info!("File {} uploaded to bucket {}", key, self.bucket());

        Ok(ArtifactRef {
            bucket: self.bucket().to_string(),
            key,
            rows: batch.len(),
        })
    }

    async fn write_and_upload(&self, key: &str, local_path: &Path, body: &[u8]) -> Result<()> {
        tokio::fs::write(local_path, body)
            .await
            .with_context(|| format!("Failed to write {}", local_path.display()))?;
        self.store
            .put_file(key, local_path)
            .await
            .with_context(|| format!("Failed to upload {} to bucket {}", key, self.bucket()))
    }

    /// Delete the remote copy of a staged artifact
    #[instrument(skip(self), fields(key = %artifact.key))]
    pub async fn unstage(&self, artifact: &ArtifactRef) -> Result<()> {
        self.store
            .delete(&artifact.key)
            .await
            .with_context(|| format!("Failed to delete {} from bucket {}", artifact.key, artifact.bucket))?;
        info!("File {} deleted from bucket {}", artifact.key, artifact.bucket);
        Ok(())
    }

    /// Remove every artifact left behind by interrupted sweeps.
    ///
    /// Not safe to run alongside a sweep.
    pub async fn prune_orphans(&self) -> Result<Vec<String>> {
        let keys = self
            .store
            .list(ARTIFACT_PREFIX)
            .await
            .context("Failed to list staged artifacts")?;

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            match self.store.delete(&key).await {
                Ok(()) => {
                    info!("Pruned orphaned artifact {}", key);
                    removed.push(key);
                },
                Err(e) => warn!(key = %key, error = %e, "Failed to prune artifact"),
            }
        }

        Ok(removed)
    }
}

/// Remove a scratch file, including one left half-written
async fn remove_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove local scratch file"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<Vec<(String, Vec<u8>)>>,
        deleted: Mutex<Vec<String>>,
        fail_put: bool,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        fn bucket(&self) -> &str {
            "staging"
        }

        async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
            if self.fail_put {
                anyhow::bail!("permission denied");
            }
            let body = tokio::fs::read(path).await?;
            self.objects.lock().unwrap().push((key.to_string(), body));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.objects.lock().unwrap().retain(|(k, _)| k != key);
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect())
        }
    }

    fn row(id: &str, viewers: Option<u64>, name: Option<&str>) -> ViewerSnapshotRow {
        ViewerSnapshotRow {
            video_title: format!("title {}", id),
            video_id: id.to_string(),
            channel_name: name.map(str::to_string),
            current_viewers: viewers,
            datetime: "2026-10-14 09:30".to_string(),
        }
    }

    #[test]
    fn test_render_csv_has_header_plus_one_line_per_row() {
        let batch = vec![row("a", Some(1), Some("Acme")), row("b", Some(2), Some("Acme")), row("c", None, None)];
        let text = String::from_utf8(render_csv(&batch).unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), batch.len() + 1);
        assert_eq!(lines[0], "video_title,video_id,channel_name,current_viewers,datetime");
        assert_eq!(lines[1], "title a,a,Acme,1,2026-10-14 09:30");
        assert_eq!(lines[3], "title c,c,,,2026-10-14 09:30");
    }

    #[test]
    fn test_render_csv_quotes_embedded_commas() {
        let mut r = row("v1", Some(5), Some("Acme, Inc"));
        r.video_title = "Live \"now\"".to_string();
        let text = String::from_utf8(render_csv(&[r]).unwrap()).unwrap();
        assert_eq!(
            text.lines().nth(1).unwrap(),
            r#""Live ""now""",v1,"Acme, Inc",5,2026-10-14 09:30"#
        );
    }

    #[test]
    fn test_artifact_key_is_flat_and_namespaced() {
        let sweep = SweepId::new();
        let key = artifact_key(&ChannelTarget::new("UC/../x"), sweep);
        assert!(!key.contains('/'));
        assert!(key.starts_with("live_videos_UC----x_"));
        assert!(key.ends_with(&format!("{}.csv", sweep)));
        assert_ne!(
            artifact_key(&ChannelTarget::new("UC1"), sweep),
            artifact_key(&ChannelTarget::new("UC2"), sweep)
        );
    }

    #[tokio::test]
    async fn test_stage_uploads_and_removes_local_copy() {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let staging = StagingStore::new(store.clone(), scratch.path());

        let artifact = staging
            .stage(&[row("v1", Some(1234), Some("Acme"))], &ChannelTarget::new("C1"), SweepId::new())
            .await
            .unwrap();

        assert_eq!(artifact.bucket, "staging");
        assert_eq!(artifact.rows, 1);
        let objects = store.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].0, artifact.key);
        assert_eq!(String::from_utf8_lossy(&objects[0].1).lines().count(), 2);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_propagates_and_cleans_scratch() {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore {
            fail_put: true,
            ..Default::default()
        });
        let staging = StagingStore::new(store, scratch.path());

        let result = staging
            .stage(&[row("v1", None, None)], &ChannelTarget::new("C1"), SweepId::new())
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_scratch_write_skips_upload() {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let staging = StagingStore::new(store.clone(), scratch.path());
        let channel = ChannelTarget::new("C1");
        let sweep = SweepId::new();

        // A directory squatting on the artifact path makes the write fail
        std::fs::create_dir(scratch.path().join(artifact_key(&channel, sweep))).unwrap();

        let err = staging
            .stage(&[row("v1", None, None)], &channel, sweep)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to write"));
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_scratch_tolerates_missing_and_removes_partial() {
        let scratch = tempfile::tempdir().unwrap();
        let partial = scratch.path().join("live_videos_C1_x.csv");
        std::fs::write(&partial, "video_title,vid").unwrap();

        remove_scratch(&partial).await;
        assert!(!partial.exists());

        remove_scratch(&partial).await;
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unstage_and_prune() {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        store
            .objects
            .lock()
            .unwrap()
            .push(("unrelated.txt".to_string(), Vec::new()));
        let staging = StagingStore::new(store.clone(), scratch.path());

        let first = staging
            .stage(&[row("a", None, None)], &ChannelTarget::new("C1"), SweepId::new())
            .await
            .unwrap();
        let second = staging
            .stage(&[row("b", None, None)], &ChannelTarget::new("C2"), SweepId::new())
            .await
            .unwrap();

        staging.unstage(&first).await.unwrap();
        assert_eq!(*store.deleted.lock().unwrap(), vec![first.key.clone()]);

        let pruned = staging.prune_orphans().await.unwrap();
        assert_eq!(pruned, vec![second.key]);
        let remaining: Vec<_> = store.objects.lock().unwrap().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(remaining, vec!["unrelated.txt"]);
    }
}
