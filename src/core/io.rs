use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

/// Atomically write `data` to `path` with permission bits `mode`.
///
/// The data lands in a temp file in the same directory, gets its final mode
/// and an fsync, then is renamed over `path`. Readers see either the old file,
/// no file, or the complete new file.
pub fn atomic_write(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), Permissions::from_mode(mode))?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Whether `path` exists. Only `NotFound` means absent; any other stat
/// failure (permission denied, a file where a directory should be) is
/// returned to the caller.
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents_and_sets_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/keys");
        atomic_write(&path, b"data", 0o600).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"data");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rule");
        fs::write(&path, b"old").unwrap();
        atomic_write(&path, b"new", 0o440).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn path_exists_surfaces_stat_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pkg.deb");
        assert!(!path_exists(&file).unwrap());

        fs::write(&file, b"x").unwrap();
        assert!(path_exists(&file).unwrap());

        // A regular file standing in for a parent directory
        assert!(path_exists(&file.join("child")).is_err());
    }
}
