use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tfbackend_domain::StateId;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::StateStore;

const SUFFIX: &str = "tfstate";

/// One `<id>.tfstate` file per state under a private directory.
///
/// Writes go to a temporary sibling and are renamed into place, so a reader
/// sees either the old or the new payload.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    dir: PathBuf,
}

impl FileSystemStore {
    /// Open `dir`, creating it (mode 0700) when missing.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&dir).await.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &StateId) -> PathBuf {
        self.dir.join(format!("{id}.{SUFFIX}"))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl StateStore for FileSystemStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn save_state(&self, id: &StateId, data: &[u8]) -> Result<(), StoreError> {
        let target = self.path_for(id);
        let tmp = self.dir.join(format!(".{id}.{}.tmp", Uuid::new_v4()));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let written = async {
            let mut file = options.open(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &target).await
        }
        .await;

        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io { path: target, source });
        }

        debug!(path = %target.display(), bytes = data.len(), "state written");
        Ok(())
    }

    async fn get_state(&self, id: &StateId) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.clone())),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    async fn delete_state(&self, id: &StateId) -> Result<(), StoreError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }
}
