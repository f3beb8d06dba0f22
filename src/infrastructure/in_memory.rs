use crate::domain::ports::{Delivery, RemoteEntry, RemoteStore, WorkQueue};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A mutating call recorded by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Write(String),
    Append(String),
    Rename(String, String),
    CreateDir(String),
}

#[derive(Default)]
struct StoreState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    ops: Vec<StoreOp>,
    offline: bool,
    read_only: BTreeSet<String>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn not_found(path: &str) -> RelayError {
    RelayError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {path}"),
    ))
}

/// A thread-safe in-memory stand-in for the shared file store.
///
/// Uses `Arc<RwLock<..>>` so clones share one tree. Every mutating call is
/// recorded so tests can assert on exactly what a job touched.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        let mut state = StoreState::default();
        state.dirs.insert("/".to_string());
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

impl InMemoryStore {
    /// Creates an empty store holding only the root directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates `path` and all of its parents without recording an operation.
    pub fn seed_dir(&self, path: &str) {
        let mut state = self.write_state();
        let mut current = normalize(path);
        while current != "/" {
            state.dirs.insert(current.clone());
            current = parent(&current);
        }
    }

    /// Places a file (and its parent directories) without recording an operation.
    pub fn seed_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let path = normalize(path);
        self.seed_dir(&parent(&path));
        self.write_state().files.insert(path, contents.into());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.read_state().files.get(&normalize(path)).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.read_state().dirs.contains(&normalize(path))
    }

    /// Names of the files directly under `dir`, sorted.
    pub fn file_names(&self, dir: &str) -> Vec<String> {
        let dir = normalize(dir);
        self.read_state()
            .files
            .keys()
            .filter(|path| parent(path) == dir)
            .map(|path| path[path.rfind('/').map_or(0, |i| i + 1)..].to_string())
            .collect()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.read_state().ops.clone()
    }

    /// Makes every call fail with a connectivity error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.write_state().offline = offline;
    }

    /// Rejects every mutation of `path` or anything below it.
    pub fn set_read_only(&self, path: &str) {
        self.write_state().read_only.insert(normalize(path));
    }

    fn check_online(state: &StoreState) -> Result<()> {
        if state.offline {
            return Err(RelayError::Connectivity("store is unreachable".to_string()));
        }
        Ok(())
    }

    fn check_writable(state: &StoreState, path: &str) -> Result<()> {
        let denied = state
            .read_only
            .iter()
            .any(|locked| path == locked || path.starts_with(&format!("{locked}/")));
        if denied {
            return Err(RelayError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read-only: {path}"),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        let state = self.read_state();
        Self::check_online(&state)?;
        let path = normalize(path);
        Ok(state.files.contains_key(&path) || state.dirs.contains(&path))
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let state = self.read_state();
        Self::check_online(&state)?;
        let dir = normalize(dir);
        if !state.dirs.contains(&dir) {
            return Err(not_found(&dir));
        }

        let entry = |path: &String, is_dir: bool| RemoteEntry {
            name: path[path.rfind('/').map_or(0, |i| i + 1)..].to_string(),
            path: path.clone(),
            is_dir,
        };
        let mut entries: Vec<RemoteEntry> = state
            .dirs
            .iter()
            .filter(|path| path.as_str() != "/" && parent(path) == dir)
            .map(|path| entry(path, true))
            .collect();
        entries.extend(
            state
                .files
                .keys()
                .filter(|path| parent(path) == dir)
                .map(|path| entry(path, false)),
        );
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let state = self.read_state();
        Self::check_online(&state)?;
        state
            .files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut state = self.write_state();
        Self::check_online(&state)?;
        let path = normalize(path);
        Self::check_writable(&state, &path)?;
        if !state.dirs.contains(&parent(&path)) {
            return Err(not_found(&parent(&path)));
        }
        state.files.insert(path.clone(), contents.to_vec());
        state.ops.push(StoreOp::Write(path));
        Ok(())
    }

    async fn append(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut state = self.write_state();
        Self::check_online(&state)?;
        let path = normalize(path);
        Self::check_writable(&state, &path)?;
        if !state.dirs.contains(&parent(&path)) {
            return Err(not_found(&parent(&path)));
        }
        state
            .files
            .entry(path.clone())
            .or_default()
            .extend_from_slice(contents);
        state.ops.push(StoreOp::Append(path));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.write_state();
        Self::check_online(&state)?;
        let (from, to) = (normalize(from), normalize(to));
        Self::check_writable(&state, &from)?;
        Self::check_writable(&state, &to)?;
        if !state.dirs.contains(&parent(&to)) {
            return Err(not_found(&parent(&to)));
        }
        let contents = state.files.remove(&from).ok_or_else(|| not_found(&from))?;
        state.files.insert(to.clone(), contents);
        state.ops.push(StoreOp::Rename(from, to));
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let mut state = self.write_state();
        Self::check_online(&state)?;
        let path = normalize(path);
        Self::check_writable(&state, &path)?;
        if state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(RelayError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already exists: {path}"),
            )));
        }
        if !state.dirs.contains(&parent(&path)) {
            return Err(not_found(&parent(&path)));
        }
        state.dirs.insert(path.clone());
        state.ops.push(StoreOp::CreateDir(path));
        Ok(())
    }
}

/// In-process FIFO queue with lease/ack semantics.
#[derive(Default)]
pub struct InMemoryQueue {
    ready: Mutex<VecDeque<Delivery>>,
    leased: Mutex<BTreeMap<String, Delivery>>,
    sent: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every body ever sent, in order, including already consumed ones.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn pending(&self) -> usize {
        self.ready
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn in_flight(&self) -> usize {
        self.leased
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

fn lock_err<T>(_: T) -> RelayError {
    RelayError::Queue("queue lock poisoned".to_string())
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn send(&self, body: String) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.sent.lock().map_err(lock_err)?.push(body.clone());
        self.ready
            .lock()
            .map_err(lock_err)?
            .push_back(Delivery { id, body });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let next = self.ready.lock().map_err(lock_err)?.pop_front();
        if let Some(delivery) = &next {
            self.leased
                .lock()
                .map_err(lock_err)?
                .insert(delivery.id.clone(), delivery.clone());
        }
        Ok(next)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.leased.lock().map_err(lock_err)?.remove(&delivery.id);
        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<()> {
        if let Some(leased) = self.leased.lock().map_err(lock_err)?.remove(&delivery.id) {
            self.ready.lock().map_err(lock_err)?.push_front(leased);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_files_and_dirs() {
        let store = InMemoryStore::new();
        store.seed_dir("/b");

        store.create_dir("/b/archive").await.unwrap();
        assert!(store.create_dir("/b/archive").await.is_err());
        assert!(!store.create_dir_if_missing("/b/archive").await.unwrap());

        store.write("/b/a.json", b"{}").await.unwrap();
        store.append("/b/log.csv", b"x").await.unwrap();
        store.append("/b/log.csv", b"y").await.unwrap();
        assert_eq!(store.read("/b/log.csv").await.unwrap(), b"xy");

        let files = store.list_files("/b").await.unwrap();
        let names: Vec<_> = files.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "log.csv"]);
        let dirs = store.list_dirs("/b").await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].path, "/b/archive");

        let moved = store.move_to_dir("/b/a.json", "/b/archive").await.unwrap();
        assert_eq!(moved, "/b/archive/a.json");
        assert!(!store.exists("/b/a.json").await.unwrap());
        assert_eq!(store.file_names("/b/archive"), vec!["a.json"]);
    }

    #[tokio::test]
    async fn test_in_memory_store_rejects_missing_parents() {
        let store = InMemoryStore::new();
        assert!(store.write("/nope/a.json", b"{}").await.is_err());
        assert!(store.create_dir("/nope/child").await.is_err());
        assert!(store.list("/nope").await.is_err());
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store_offline() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.exists("/").await,
            Err(RelayError::Connectivity(_))
        ));
        store.set_offline(false);
        assert!(store.exists("/").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_store_read_only_subtree() {
        let store = InMemoryStore::new();
        store.seed_file("/b/a.json", "{}");
        store.set_read_only("/b/locked");

        assert!(store.create_dir("/b/locked").await.is_err());
        assert!(store.write("/b/locked/x", b"x").await.is_err());
        assert!(store.create_dir("/b/lockedness").await.is_ok());
        assert!(store.exists("/b/a.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_queue_lease_and_release() {
        let queue = InMemoryQueue::new();
        queue.send("a".to_string()).await.unwrap();
        queue.send("b".to_string()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.body, "a");
        assert_eq!(queue.in_flight(), 1);

        queue.release(&first).await.unwrap();
        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again.body, "a");
        queue.ack(&again).await.unwrap();

        let second = queue.receive().await.unwrap().unwrap();
        queue.ack(&second).await.unwrap();
        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.sent(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queue.in_flight(), 0);
    }
}
