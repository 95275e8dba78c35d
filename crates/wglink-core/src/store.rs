//! Atomic, owner-only file persistence.
//!
//! Records, the manifest, and rendered daemon configs all go through
//! these helpers: content is written to a temporary file in the target
//! directory, restricted to the owning user, then renamed over the
//! destination so readers observe either the old or the new content.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::trace;

use crate::error::Result;

/// Writes `contents` to `path` atomically with mode 0600.
pub(crate) async fn write_atomic(path: &Path, contents: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents))
        .await
        .map_err(|e| io::Error::other(format!("persist task failed: {e}")))??;
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    write_atomic(path, contents).await
}

fn write_atomic_blocking(path: &PathBuf, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other(format!("no parent directory for {}", path.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    trace!(path = %path.display(), "persisted file");
    Ok(())
}
