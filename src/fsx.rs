//! Filesystem helpers: atomic replacement of an output file and access to
//! POSIX permission bits.
//!
//! [`AtomicFile`] is the only way this crate writes a build artifact. The
//! bytes go to a uniquely named temporary file created next to the
//! destination (same directory, same suffix), and [`AtomicFile::commit`]
//! renames it over the destination. Dropping an uncommitted `AtomicFile`
//! deletes the temporary file, so the destination path only ever holds its
//! previous content or the complete new content.

use std::fs::{File, Metadata};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::ZipDirError;

/// Mode given to a committed artifact. Temporary files are created 0600.
pub const ARTIFACT_MODE: u32 = 0o644;

/// A temporary file that replaces `destination` when committed.
#[derive(Debug)]
pub struct AtomicFile {
    tmp: NamedTempFile,
    destination: PathBuf,
}

impl AtomicFile {
    /// Creates the temporary file in the destination's directory.
    ///
    /// The parent directory must already exist; it is never created here.
    pub fn create(destination: impl AsRef<Path>) -> Result<Self, ZipDirError> {
        let destination = destination.as_ref().to_path_buf();
        let dir = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = destination
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let tmp = tempfile::Builder::new()
            .prefix(".tmp")
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(ZipDirError::io_at(&dir))?;
        debug!(tmp = %tmp.path().display(), destination = %destination.display(), "opened temporary file");

        Ok(Self { tmp, destination })
    }

    /// Path of the temporary file currently receiving the bytes.
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn as_file_mut(&mut self) -> &mut File {
        self.tmp.as_file_mut()
    }

    /// Flushes the temporary file and renames it over the destination,
    /// replacing any existing file there.
    pub fn commit(mut self) -> Result<PathBuf, ZipDirError> {
        let tmp_path = self.tmp.path().to_path_buf();
        self.tmp.flush().map_err(ZipDirError::io_at(&tmp_path))?;
        self.tmp
            .as_file()
            .sync_all()
            .map_err(ZipDirError::io_at(&tmp_path))?;
        set_unix_permissions(&tmp_path, ARTIFACT_MODE).map_err(ZipDirError::io_at(&tmp_path))?;

        let Self { tmp, destination } = self;
        // On failure `persist` hands the temp file back; dropping it removes it.
        tmp.persist(&destination).map_err(|e| ZipDirError::Io {
            source: e.error,
            path: destination.clone(),
        })?;
        debug!(destination = %destination.display(), "committed");
        Ok(destination)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

impl Seek for AtomicFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.tmp.seek(pos)
    }
}

/// Runs `body` against a fresh temporary file and commits it to `destination`
/// only if `body` succeeds. Any error from `body` removes the temporary file
/// and is returned unchanged.
pub fn atomic_write<T, F>(destination: impl AsRef<Path>, body: F) -> Result<T, ZipDirError>
where
    F: FnOnce(&mut File) -> Result<T, ZipDirError>,
{
    let mut file = AtomicFile::create(destination)?;
    let value = body(file.as_file_mut())?;
    file.commit()?;
    Ok(value)
}

#[cfg(unix)]
/// Permission bits (including setuid/setgid/sticky) of a file.
pub fn file_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
/// POSIX permission bits are not available on this platform.
pub fn file_mode(_metadata: &Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// No-op where POSIX permission bits do not exist.
pub fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    fn dir_listing(dir: &Path) -> BTreeSet<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn injected_failure() -> ZipDirError {
        ZipDirError::Io {
            source: io::Error::new(io::ErrorKind::Other, "injected"),
            path: PathBuf::from("injected"),
        }
    }

    #[test]
    fn commit_creates_destination() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let dst = dir.path().join("testfile.txt");

        atomic_write(&dst, |fp| {
            fp.write_all(b"data")?;
            assert!(!dst.exists());
            Ok(())
        })?;

        assert_eq!(fs::read(&dst)?, b"data");
        assert_eq!(dir_listing(dir.path()), BTreeSet::from([dst]));
        Ok(())
    }

    #[test]
    fn failure_leaves_nothing_behind() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let dst = dir.path().join("testfile.txt");

        let res: Result<(), _> = atomic_write(&dst, |fp| {
            fp.write_all(b"data")?;
            Err(injected_failure())
        });

        assert!(matches!(res, Err(ZipDirError::Io { ref path, .. }) if path == Path::new("injected")));
        assert!(dir_listing(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn commit_replaces_existing_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let dst = dir.path().join("testfile.txt");
        fs::write(&dst, b"orig")?;

        atomic_write(&dst, |fp| {
            fp.write_all(b"data")?;
            assert_eq!(fs::read(&dst)?, b"orig");
            Ok(())
        })?;

        assert_eq!(fs::read(&dst)?, b"data");
        assert_eq!(dir_listing(dir.path()), BTreeSet::from([dst]));
        Ok(())
    }

    #[test]
    fn failure_keeps_existing_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let dst = dir.path().join("testfile.txt");
        fs::write(&dst, b"orig")?;

        let res: Result<(), _> = atomic_write(&dst, |fp| {
            fp.write_all(b"data")?;
            Err(injected_failure())
        });

        assert!(res.is_err());
        assert_eq!(fs::read(&dst)?, b"orig");
        assert_eq!(dir_listing(dir.path()), BTreeSet::from([dst]));
        Ok(())
    }

    #[test]
    fn temp_file_keeps_suffix_and_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let dst = dir.path().join("archive.zip");

        let file = AtomicFile::create(&dst)?;
        assert_eq!(file.temp_path().parent(), Some(dir.path()));
        assert_eq!(file.temp_path().extension().and_then(|e| e.to_str()), Some("zip"));
        assert_eq!(file.destination(), dst.as_path());

        drop(file);
        assert!(dir_listing(dir.path()).is_empty());
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("missing").join("out.zip");

        let err = AtomicFile::create(&dst).unwrap_err();
        assert!(matches!(err, ZipDirError::Io { .. }));
        assert!(!dir.path().join("missing").exists());
    }

    #[cfg(unix)]
    #[test]
    fn committed_file_is_world_readable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let dst = dir.path().join("out.zip");
        atomic_write(&dst, |fp| Ok(fp.write_all(b"x")?))?;
        assert_eq!(file_mode(&fs::metadata(&dst)?), Some(ARTIFACT_MODE));
        Ok(())
    }
}
