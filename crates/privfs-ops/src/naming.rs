//! Collision-avoiding name candidates.

use std::io;
use std::path::{Path, PathBuf};

use privfs_core::{FsError, FsResult};

/// Name used by `mkdir` when the caller supplies none.
pub const DEFAULT_FOLDER_NAME: &str = "New Folder";

/// Base name plus this many numbered variants are tried before giving up.
const MAX_CANDIDATES: u32 = 1000;

/// `base`, `base (1)`, `base (2)`, ... up to [`MAX_CANDIDATES`] in total.
pub(crate) fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    (0..MAX_CANDIDATES).map(move |n| {
        if n == 0 {
            base.to_owned()
        } else {
            format!("{base} ({n})")
        }
    })
}

/// Like [`candidates`], but the counter goes before the extension:
/// `report.pdf`, `report (1).pdf`, ...
pub(crate) fn candidates_keeping_extension(file_name: &str) -> impl Iterator<Item = String> + '_ {
    let path = Path::new(file_name);
    let split = path
        .file_stem()
        .zip(path.extension())
        .map(|(stem, ext)| (stem.to_string_lossy(), ext.to_string_lossy()));

    (0..MAX_CANDIDATES).map(move |n| match (&split, n) {
        (_, 0) => file_name.to_owned(),
        (Some((stem, ext)), n) => format!("{stem} ({n}).{ext}"),
        (None, n) => format!("{file_name} ({n})"),
    })
}

/// First candidate under `dir` with no existing entry (dangling symlinks
/// count as existing).
///
/// # Errors
///
/// [`FsError::AlreadyExists`] when every candidate is taken; any other error
/// from probing the directory.
pub(crate) fn first_free(dir: &Path, candidates: impl Iterator<Item = String>) -> FsResult<PathBuf> {
    for name in candidates {
        let path = dir.join(name);
        match path.symlink_metadata() {
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(path),
            Err(e) => return Err(e.into()),
        }
    }
    Err(FsError::AlreadyExists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_candidates() {
        let names: Vec<_> = candidates("Photos").take(3).collect();
        assert_eq!(names, ["Photos", "Photos (1)", "Photos (2)"]);
        assert_eq!(candidates("x").count(), 1000);
    }

    #[test]
    fn extension_is_preserved() {
        let names: Vec<_> = candidates_keeping_extension("report.pdf").take(3).collect();
        assert_eq!(names, ["report.pdf", "report (1).pdf", "report (2).pdf"]);
    }

    #[test]
    fn only_last_extension_moves() {
        let second = candidates_keeping_extension("site.tar.gz").nth(1).unwrap();
        assert_eq!(second, "site.tar (1).gz");
    }

    #[test]
    fn names_without_extension() {
        let second = candidates_keeping_extension("Makefile").nth(1).unwrap();
        assert_eq!(second, "Makefile (1)");
        let hidden = candidates_keeping_extension(".bashrc").nth(1).unwrap();
        assert_eq!(hidden, ".bashrc (1)");
    }

    #[test]
    fn first_free_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::create_dir(dir.path().join("a (1)")).unwrap();

        let free = first_free(dir.path(), candidates("a")).unwrap();
        assert_eq!(free, dir.path().join("a (2)"));
    }
}
