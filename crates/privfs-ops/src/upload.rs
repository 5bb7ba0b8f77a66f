//! Chunk staging layout, chunk writes and assembly.
//!
//! Chunks of upload `U` bound for directory `D` live in
//! `D/.privfs-uploads-U/<index>.part` until an assemble concatenates them.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use privfs_core::{FsError, FsResult, validate_upload_id};

/// Prefix of every staging directory name.
pub const STAGING_PREFIX: &str = ".privfs-uploads-";

const STAGING_DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Staging directory for `upload_id` under `dest_dir`.
///
/// # Errors
///
/// Generic if the upload id is not a safe path component.
pub fn staging_dir(dest_dir: &Path, upload_id: &str) -> FsResult<PathBuf> {
    validate_upload_id(upload_id)?;
    Ok(dest_dir.join(format!("{STAGING_PREFIX}{upload_id}")))
}

/// Path of chunk `index` inside a staging directory.
#[must_use]
pub fn chunk_path(staging: &Path, index: u32) -> PathBuf {
    staging.join(format!("{index}.part"))
}

/// Whether the final component of `path` names a staging directory.
#[must_use]
pub fn is_staging_dir(path: &Path) -> bool {
    upload_id_of(path).is_some()
}

/// Upload id encoded in a staging directory path.
#[must_use]
pub fn upload_id_of(path: &Path) -> Option<&str> {
    path.file_name()?
        .to_str()?
        .strip_prefix(STAGING_PREFIX)
        .filter(|id| validate_upload_id(id).is_ok())
}

/// Write one chunk, creating the staging directory on first use.
///
/// Re-sending an index overwrites the previous chunk.
///
/// # Errors
///
/// Generic for a bad upload id, otherwise the classified error from creating
/// the directory or writing the file.
pub fn write_chunk(dest_dir: &Path, upload_id: &str, index: u32, data: &[u8]) -> FsResult<PathBuf> {
    let staging = staging_dir(dest_dir, upload_id)?;
    DirBuilder::new()
        .recursive(true)
        .mode(STAGING_DIR_MODE)
        .create(&staging)?;

    let path = chunk_path(&staging, index);
    let mut file = create_truncated(&path)?;
    file.write_all(data)?;
    Ok(path)
}

/// Concatenate `chunks` in order into `dest_file`, returning the bytes written.
///
/// The destination is truncated first; a failure part-way leaves it partially
/// written.
///
/// # Errors
///
/// The classified error from opening or copying any file.
pub fn assemble<P: AsRef<Path>>(dest_file: &Path, chunks: &[P]) -> FsResult<u64> {
    let mut out = create_truncated(dest_file)?;
    let mut total: u64 = 0;
    for chunk in chunks {
        let mut input = File::open(chunk.as_ref())?;
        total = total.saturating_add(io::copy(&mut input, &mut out)?);
    }
    out.flush()?;
    Ok(total)
}

/// Recursively remove a staging directory.
///
/// Refuses anything whose name does not carry [`STAGING_PREFIX`]. A directory
/// that is already gone counts as removed.
///
/// # Errors
///
/// Generic for a non-staging path, otherwise the classified removal error.
pub fn remove_staging(path: &Path) -> FsResult<()> {
    if !is_staging_dir(path) {
        return Err(FsError::generic(format!(
            "refusing to remove {}: not an upload staging directory",
            path.display()
        )));
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn create_truncated(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn layout() {
        let staging = staging_dir(Path::new("/srv/share"), "abc-1").unwrap();
        assert_eq!(staging, Path::new("/srv/share/.privfs-uploads-abc-1"));
        assert_eq!(
            chunk_path(&staging, 3),
            Path::new("/srv/share/.privfs-uploads-abc-1/3.part")
        );
        assert_eq!(upload_id_of(&staging), Some("abc-1"));
        assert!(staging_dir(Path::new("/srv"), "../etc").is_err());
    }

    #[test]
    fn staging_detection_rejects_lookalikes() {
        assert!(is_staging_dir(Path::new("/x/.privfs-uploads-u1")));
        assert!(!is_staging_dir(Path::new("/x/uploads-u1")));
        assert!(!is_staging_dir(Path::new("/x/.privfs-uploads-")));
        assert!(!is_staging_dir(Path::new("/")));
    }

    #[test]
    fn chunks_are_written_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_chunk(dir.path(), "u1", 0, b"old").unwrap();
        let again = write_chunk(dir.path(), "u1", 0, b"new!").unwrap();
        assert_eq!(first, again);
        assert_eq!(fs::read(&again).unwrap(), b"new!");

        let staging = staging_dir(dir.path(), "u1").unwrap();
        let mode = fs::metadata(&staging).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755 & !current_umask());
    }

    #[test]
    fn assemble_concatenates_in_given_order() {
        let dir = tempfile::tempdir().unwrap();
        let c0 = write_chunk(dir.path(), "u2", 0, b"hello ").unwrap();
        let c1 = write_chunk(dir.path(), "u2", 1, b"world").unwrap();
        let dest = dir.path().join("out.txt");
        fs::write(&dest, b"previous content that is longer").unwrap();

        let written = assemble(&dest, &[&c0, &c1]).unwrap();
        assert_eq!(written, 11);
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");

        let reversed = assemble(&dest, &[&c1, &c0]).unwrap();
        assert_eq!(reversed, 11);
        assert_eq!(fs::read(&dest).unwrap(), b"worldhello ");
    }

    #[test]
    fn assemble_missing_chunk_leaves_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let c0 = write_chunk(dir.path(), "u3", 0, b"abc").unwrap();
        let missing = dir.path().join("nope.part");
        let dest = dir.path().join("out");

        let err = assemble(&dest, &[c0, missing]).unwrap_err();
        assert_eq!(err, FsError::NotFound);
        assert_eq!(fs::read(&dest).unwrap(), b"abc");
    }

    #[test]
    fn remove_staging_is_guarded_and_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        write_chunk(dir.path(), "u4", 0, b"x").unwrap();
        let staging = staging_dir(dir.path(), "u4").unwrap();

        remove_staging(&staging).unwrap();
        assert!(!staging.exists());
        remove_staging(&staging).unwrap();

        let err = remove_staging(dir.path()).unwrap_err();
        assert!(matches!(err, FsError::Generic(_)));
        assert!(dir.path().exists());
    }

    fn current_umask() -> u32 {
        use nix::sys::stat::{Mode, umask};
        let old = umask(Mode::empty());
        umask(old);
        old.bits()
    }
}
