//! Persisted per-channel sync state, with advisory exclusive access.
//!
//! The write path follows `ngdp-cache/src/ribbit.rs`'s `write()`: a
//! temp file in the same directory, written in full, then renamed into
//! place, with the temp file removed on any failure so a crash never
//! leaves a half-written state file. Directory creation follows
//! `ngdp-cache/src/lib.rs`'s `ensure_dir`. Locking follows the
//! `try_lock_exclusive()` idiom: an empty `.lock` companion file,
//! polled with a short sleep until acquired or a timeout elapses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::FileExt;
use tokio::time::Instant;
use vidsync_core::{ChannelId, Error, Result};

use crate::state::SyncState;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default time [`FileSyncStateStore::lock`] will retry before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// An exclusive hold on one channel's state file. Dropping it releases
/// the lock.
pub struct FileLock {
    file: Option<std::fs::File>,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// Per-channel sync state persistence, with advisory mutual exclusion
/// (spec.md §4.9: "the store must supply advisory exclusion").
#[async_trait::async_trait]
pub trait SyncStateStore: Send + Sync {
    /// The exclusive-hold guard type this store returns from
    /// [`SyncStateStore::lock`].
    type Lock: Send;

    /// Acquire exclusive access to `channel`'s state, waiting (up to an
    /// implementation-defined timeout) for a concurrent holder to release
    /// it.
    async fn lock(&self, channel: &ChannelId) -> Result<Self::Lock>;

    /// Load `channel`'s persisted state, or a fresh [`SyncState`] if none
    /// exists yet.
    async fn load(&self, channel: &ChannelId) -> Result<SyncState>;

    /// Persist `state`, atomically replacing any prior version.
    async fn save(&self, state: &SyncState) -> Result<()>;
}

/// A [`SyncStateStore`] backed by one JSON file per channel under a
/// base directory.
pub struct FileSyncStateStore {
    base_dir: PathBuf,
    lock_timeout: Duration,
}

impl FileSyncStateStore {
    /// Open (creating if necessary) a store rooted at `base_dir`.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        ensure_dir(&base_dir).await?;
        Ok(Self { base_dir, lock_timeout: DEFAULT_LOCK_TIMEOUT })
    }

    /// Override the default lock-acquisition timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn data_path(&self, channel: &ChannelId) -> PathBuf {
        self.base_dir.join(format!("{}.json", channel.as_str()))
    }

    fn lock_path(&self, channel: &ChannelId) -> PathBuf {
        self.base_dir.join(format!("{}.lock", channel.as_str()))
    }
}

async fn ensure_dir(path: &Path) -> Result<()> {
    if tokio::fs::metadata(path).await.is_err() {
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

fn try_acquire(path: &Path) -> std::io::Result<Option<std::fs::File>> {
    let file = std::fs::OpenOptions::new().create(true).read(true).write(true).open(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(file)),
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(err) => Err(err),
    }
}

#[async_trait::async_trait]
impl SyncStateStore for FileSyncStateStore {
    type Lock = FileLock;

    async fn lock(&self, channel: &ChannelId) -> Result<FileLock> {
        let path = self.lock_path(channel);
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            let attempt_path = path.clone();
            let attempt = tokio::task::spawn_blocking(move || try_acquire(&attempt_path))
                .await
                .map_err(|err| Error::Io(std::io::Error::other(err)))??;
            match attempt {
                Some(file) => return Ok(FileLock { file: Some(file) }),
                None => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout);
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn load(&self, channel: &ChannelId) -> Result<SyncState> {
        let path = self.data_path(channel);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| Error::CorruptState(format!("{}: {err}", path.display()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(SyncState::new(channel.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let path = self.data_path(&state.channel_id);
        let tmp_path = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(state)?;

        let write_result: Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            tokio::io::AsyncWriteExt::write_all(&mut file, &payload).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &path).await?;
            Ok(())
        }
        .await;

        if write_result.is_err() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        write_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Strategy;

    fn channel() -> ChannelId {
        ChannelId::new("UC".to_string() + &"a".repeat(22)).unwrap()
    }

    #[tokio::test]
    async fn missing_state_loads_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSyncStateStore::new(dir.path()).await.unwrap();
        let state = store.load(&channel()).await.unwrap();
        assert_eq!(state.channel_id, channel());
        assert_eq!(state.status, crate::state::Status::Idle);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSyncStateStore::new(dir.path()).await.unwrap();
        let mut state = SyncState::new(channel());
        state.begin(Strategy::Paginated, chrono::Utc::now());
        state.continuation_token = Some("tok".to_string());
        store.save(&state).await.unwrap();

        let loaded = store.load(&channel()).await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn corrupt_state_file_surfaces_corrupt_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSyncStateStore::new(dir.path()).await.unwrap();
        let path = dir.path().join(format!("{}.json", channel().as_str()));
        tokio::fs::write(&path, b"not json").await.unwrap();
        let result = store.load(&channel()).await;
        assert!(matches!(result, Err(Error::CorruptState(_))));
    }

    #[tokio::test]
    async fn second_lock_attempt_times_out_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FileSyncStateStore::new(dir.path()).await.unwrap().with_lock_timeout(Duration::from_millis(150));
        let held = store.lock(&channel()).await.unwrap();
        let result = store.lock(&channel()).await;
        assert!(matches!(result, Err(Error::LockTimeout)));
        drop(held);
        assert!(store.lock(&channel()).await.is_ok());
    }
}
