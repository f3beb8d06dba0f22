use crate::domain::ports::{Delivery, WorkQueue};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MESSAGE_EXT: &str = "msg";
const LEASE_EXT: &str = "lease";
const TEMP_EXT: &str = "tmp";

/// Durable directory-backed queue.
///
/// Each message is one file named `<millis>-<pid>-<seq>.msg`, so lexical order is
/// send order. Receiving stamps the file's mtime and renames it to `.lease`; ack
/// deletes it, release renames it back. A lease older than `lease_timeout` is
/// taken to belong to a dead consumer and is put back on the queue. Several
/// processes may share one queue directory.
pub struct SpoolQueue {
    dir: PathBuf,
    lease_timeout: Duration,
    seq: AtomicU64,
    receive_lock: Mutex<()>,
}

impl SpoolQueue {
    pub async fn open(root: impl AsRef<Path>, name: &str, lease_timeout: Duration) -> Result<Self> {
        let dir = root.as_ref().join(name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RelayError::Queue(format!("cannot open queue {}: {e}", dir.display())))?;

        let queue = Self {
            dir,
            lease_timeout,
            seq: AtomicU64::new(0),
            receive_lock: Mutex::new(()),
        };
        let restored = queue.restore_expired_leases().await?;
        if restored > 0 {
            info!(queue = %queue.dir.display(), restored, "restored expired queue leases");
        }
        Ok(queue)
    }

    async fn restore_expired_leases(&self) -> Result<usize> {
        let mut restored = 0;
        for path in self.entries_with(LEASE_EXT).await? {
            let modified = match fs::metadata(&path).await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                // Acked or released by its owner since the listing.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let held_for = modified.elapsed().unwrap_or_default();
            if held_for < self.lease_timeout {
                continue;
            }
            match fs::rename(&path, path.with_extension(MESSAGE_EXT)).await {
                Ok(()) => {
                    warn!(lease = %path.display(), held_secs = held_for.as_secs(), "lease expired, message requeued");
                    restored += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(restored)
    }

    async fn entries_with(&self, extension: &str) -> Result<Vec<PathBuf>> {
        let mut reader = fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == extension) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn lease_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{LEASE_EXT}"))
    }

    /// Number of messages waiting to be received.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries_with(MESSAGE_EXT).await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Sets the mtime of `path` to now; the lease clock starts here.
async fn stamp(path: &Path) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    file.into_std().await.set_modified(SystemTime::now())
}

#[async_trait]
impl WorkQueue for SpoolQueue {
    async fn send(&self, body: String) -> Result<()> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let id = format!("{millis:015}-{:08}-{seq:08}", std::process::id());

        let temp = self.dir.join(format!("{id}.{TEMP_EXT}"));
        fs::write(&temp, body.as_bytes()).await?;
        fs::rename(&temp, self.dir.join(format!("{id}.{MESSAGE_EXT}"))).await?;
        debug!(id, "message enqueued");
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let _guard = self.receive_lock.lock().await;
        self.restore_expired_leases().await?;
        for path in self.entries_with(MESSAGE_EXT).await? {
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let lease = self.lease_path(&id);
            // Another process may have taken it between listing and renaming.
            if stamp(&path).await.is_err() || fs::rename(&path, &lease).await.is_err() {
                continue;
            }
            match String::from_utf8(fs::read(&lease).await?) {
                Ok(body) => return Ok(Some(Delivery { id, body })),
                Err(e) => {
                    warn!(id, error = %e, "dropping queue message that is not UTF-8");
                    fs::remove_file(&lease).await?;
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        fs::remove_file(self.lease_path(&delivery.id)).await?;
        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<()> {
        let lease = self.lease_path(&delivery.id);
        fs::rename(&lease, lease.with_extension(MESSAGE_EXT)).await?;
        Ok(())
    }
}
