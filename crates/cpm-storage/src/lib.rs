//! Tabular I/O and all-or-nothing export storage for CPM.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

mod table;

pub use table::{parse_csv_rows, parse_json_rows, read_table, render_csv, TableError, TableFormat};

pub const CRATE_NAME: &str = "cpm-storage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub relative_path: PathBuf,
    pub content_hash: String,
    pub byte_size: usize,
}

/// Root directory under which each run's exports land in their own folder.
#[derive(Debug, Clone)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Open a hidden staging directory that becomes `root/dir_name` on commit.
    pub async fn begin(&self, dir_name: &str) -> anyhow::Result<StagedExport> {
        let final_dir = self.root.join(dir_name);
        if fs::try_exists(&final_dir)
            .await
            .with_context(|| format!("checking export directory {}", final_dir.display()))?
        {
            bail!("export directory {} already exists", final_dir.display());
        }
        let staging_dir = self
            .root
            .join(format!(".{dir_name}.staging-{}", Uuid::new_v4()));
        fs::create_dir_all(&staging_dir)
            .await
            .with_context(|| format!("creating staging directory {}", staging_dir.display()))?;
        Ok(StagedExport {
            staging_dir,
            final_dir,
            files: Vec::new(),
        })
    }
}

/// Export files written so far for one run; nothing is visible under the
/// final name until `commit`.
#[derive(Debug)]
pub struct StagedExport {
    staging_dir: PathBuf,
    final_dir: PathBuf,
    files: Vec<StoredFile>,
}

impl StagedExport {
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn final_dir(&self) -> &Path {
        &self.final_dir
    }

    pub fn files(&self) -> &[StoredFile] {
        &self.files
    }

    /// Write one file through a temp file and rename.
    pub async fn write_file(
        &mut self,
        relative_path: impl AsRef<Path>,
        bytes: &[u8],
    ) -> anyhow::Result<StoredFile> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let absolute_path = self.staging_dir.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.staging_dir.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating export directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp export file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp export file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp export file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &absolute_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming temp export {} -> {}",
                    temp_path.display(),
                    absolute_path.display()
                )
            });
        }

        let stored = StoredFile {
            relative_path,
            content_hash: ExportStore::sha256_hex(bytes),
            byte_size: bytes.len(),
        };
        debug!(
            path = %stored.relative_path.display(),
            bytes = stored.byte_size,
            hash = %stored.content_hash,
            "export file written"
        );
        self.files.push(stored.clone());
        Ok(stored)
    }

    /// Publish the staging directory under its final name.
    pub async fn commit(self) -> anyhow::Result<PathBuf> {
        fs::rename(&self.staging_dir, &self.final_dir)
            .await
            .with_context(|| {
                format!(
                    "publishing export {} -> {}",
                    self.staging_dir.display(),
                    self.final_dir.display()
                )
            })?;
        Ok(self.final_dir)
    }

    /// Drop everything written so far.
    pub async fn abort(self) {
        if let Err(err) = fs::remove_dir_all(&self.staging_dir).await {
            warn!(
                staging_dir = %self.staging_dir.display(),
                error = %err,
                "could not remove staging directory"
            );
        }
    }
}
