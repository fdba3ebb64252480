//! Staging artifact written for the store's bulk-import facility
//!
//! The artifact is a UTF-8, LF-terminated CSV with a header row. It lives at a
//! fixed name inside the store's import directory so each run overwrites the
//! previous one. Writes go to a temporary sibling that is flushed, synced and
//! renamed into place, so the store never reads a half-written file.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::record::CanonicalEdge;

/// Serializes canonical edges into the staging artifact
#[derive(Debug, Clone)]
pub struct StagingWriter {
    file_name: String,
}

fn staging_error(path: &Path, err: impl std::fmt::Display) -> IngestError {
    IngestError::Staging(format!("{}: {}", path.display(), err))
}

impl StagingWriter {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Write `edges` to `<destination_dir>/<file_name>` and return that path.
    ///
    /// An empty edge set fails with [`IngestError::EmptyResultSet`] after
    /// removing any artifact left by an earlier run.
    pub fn write(&self, edges: &[CanonicalEdge], destination_dir: &Path) -> IngestResult<PathBuf> {
        ensure_shared_dir(destination_dir)?;
        let path = destination_dir.join(&self.file_name);

        if edges.is_empty() {
            if path.exists() {
                warn!("Removing stale staging artifact {}", path.display());
                fs::remove_file(&path).map_err(|e| staging_error(&path, e))?;
            }
            return Err(IngestError::EmptyResultSet);
        }

        // dropped (and deleted) on any early return below
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name))
            .suffix(".tmp")
            .tempfile_in(destination_dir)
            .map_err(|e| staging_error(destination_dir, e))?;
        let tmp_path = tmp.path().to_path_buf();

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(tmp.as_file());
        for edge in edges {
            writer.serialize(edge)?;
        }
        writer.flush().map_err(|e| staging_error(&tmp_path, e))?;
        drop(writer);
        tmp.as_file().sync_all().map_err(|e| staging_error(&tmp_path, e))?;

        make_world_readable(&tmp_path)?;
        tmp.persist(&path).map_err(|e| staging_error(&path, e.error))?;

        let size = fs::metadata(&path).map_err(|e| staging_error(&path, e))?.len();
        if size == 0 {
            return Err(staging_error(&path, "artifact is empty after write"));
        }

        info!("Staged {} edge(s) to {} ({} bytes)", edges.len(), path.display(), size);
        Ok(path)
    }
}

/// Parse an artifact back into edges using the same format rules
pub fn read_edges(path: &Path) -> IngestResult<Vec<CanonicalEdge>> {
    let mut reader = csv::Reader::from_path(path)?;
    let edges = reader
        .deserialize::<CanonicalEdge>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(edges)
}

/// The store's server process may run as another user, so a directory we
/// create is opened up to everyone.
fn ensure_shared_dir(dir: &Path) -> IngestResult<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| staging_error(dir, e))?;
    debug!("Created staging directory {}", dir.display());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o777))
            .map_err(|e| staging_error(dir, e))?;
    }
    Ok(())
}

fn make_world_readable(path: &Path) -> IngestResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))
            .map_err(|e| staging_error(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
