use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use walkdir::WalkDir;

use crate::error::WatchError;

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), WatchError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| WatchError::Filesystem(format!("create {parent}: {err}")))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".arxiv-watch")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| WatchError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| WatchError::Filesystem(format!("write {path}: {err}")))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| WatchError::Filesystem(format!("sync {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| WatchError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}

pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, WatchError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| WatchError::Filesystem(err.to_string()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn write_atomic_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/state.json")).unwrap();

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
        let leftovers = walk_files(temp.path()).unwrap();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn walk_files_skips_symlinked_directories() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("paper.pdf"), b"%PDF").unwrap();
        fs::write(temp.path().join("top.pdf"), b"%PDF").unwrap();
        std::os::unix::fs::symlink(temp.path(), nested.join("loop")).unwrap();

        let mut files = walk_files(temp.path()).unwrap();
        files.sort();
        assert_eq!(files, vec![nested.join("paper.pdf"), temp.path().join("top.pdf")]);
    }
}
