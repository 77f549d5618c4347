use failure::Fail;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A failed attempt to persist fetched bytes into local storage.
#[derive(Debug, Fail)]
#[fail(display = "failed to offload into {:?}: {}", path, cause)]
pub struct WriteError {
    pub path: PathBuf,
    #[fail(cause)]
    pub cause: io::Error,
}

/// Persists fetched bytes at `local_path`, creating missing parent directories.
///
/// The bytes are staged in a temporary file next to the destination and moved
/// into place with an atomic rename, so a reader never sees a partial file.
/// An existing file is overwritten.
pub fn offload(local_path: &Path, data: &[u8]) -> Result<(), WriteError> {
    let fail = |cause| WriteError {
        path: local_path.to_path_buf(),
        cause,
    };

    let parent = local_path.parent().ok_or_else(|| {
        fail(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;
    std::fs::create_dir_all(parent).map_err(fail)?;

    let mut staged = NamedTempFile::new_in(parent).map_err(fail)?;
    staged.write_all(data).map_err(fail)?;
    staged.persist(local_path).map_err(|e| fail(e.error))?;

    debug!("offloaded {} bytes into {:?}", data.len(), local_path);
    Ok(())
}
