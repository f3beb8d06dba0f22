use crate::domain::ports::{RemoteEntry, RemoteStore};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// [`RemoteStore`] over a local (or mounted) directory tree.
///
/// Store paths are resolved below `base`; `/` is the base itself.
pub struct LocalFsStore {
    base: PathBuf,
}

impl LocalFsStore {
    /// Opens the store rooted at `base`, which must be an existing directory.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        match fs::metadata(&base).await {
            Ok(meta) if meta.is_dir() => Ok(Self { base }),
            Ok(_) => Err(RelayError::Connectivity(format!(
                "store root {} is not a directory",
                base.display()
            ))),
            Err(e) => Err(RelayError::Connectivity(format!(
                "store root {} is unreachable: {e}",
                base.display()
            ))),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.base.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(RelayError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes the store root: {path}"),
                    )));
                }
            }
        }
        Ok(resolved)
    }
}

fn join_store_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{dir}/{name}")
}

#[async_trait]
impl RemoteStore for LocalFsStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.resolve(path)?).await?)
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let mut reader = fs::read_dir(self.resolve(dir)?).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(RemoteEntry {
                path: join_store_path(dir, &name),
                name,
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path)?).await?)
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        Ok(fs::write(self.resolve(path)?, contents).await?)
    }

    async fn append(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path)?)
            .await?;
        file.write_all(contents).await?;
        file.flush().await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        Ok(fs::rename(self.resolve(from)?, self.resolve(to)?).await?)
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        Ok(fs::create_dir(self.resolve(path)?).await?)
    }
}
