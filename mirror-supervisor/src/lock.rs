//! Advisory locking around `sync_lock`, serializing full and partial
//! transfers of the same set.

use std::fs::OpenOptions;
use std::future::Future;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Opens (creating if needed) and exclusively locks `path` for the
/// duration of `body`, releasing it once `body` resolves. `path` being
/// `None` means no lock is configured; `body` still runs, unserialized.
pub async fn with_lock<F, Fut, T>(path: Option<&PathBuf>, body: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let Some(path) = path else {
        return Ok(body().await);
    };

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::LockAcquire {
            path: path.clone(),
            source,
        })?;

    let mut lock = fd_lock::RwLock::new(file);
    let _guard = lock.write().map_err(|source| Error::LockAcquire {
        path: path.clone(),
        source,
    })?;

    Ok(body().await)
}
