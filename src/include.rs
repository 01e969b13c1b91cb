//! File selection for the command-line front end.
//!
//! The library's builder takes an already ordered list of [`IncludedFile`]s;
//! this module produces one by walking source directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::builder::ForceInclude;
use crate::common::{to_posix_path, IncludedFile};
use crate::ZipDirError;

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn is_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

/// Walks each directory in `sources` (relative to `root`) in sorted order.
///
/// A walked file lands at its path relative to its source directory. Hidden
/// entries and anything below an `exclude` path are skipped. Force-included
/// files come last and replace walked files with the same distribution path.
pub fn collect_included_files(
    root: &Path,
    sources: &[PathBuf],
    exclude: &[PathBuf],
    force_include: &[ForceInclude],
) -> Result<Vec<IncludedFile>, ZipDirError> {
    let root = absolute(root);
    let exclude: Vec<PathBuf> = exclude.iter().map(|p| absolute(&root.join(p))).collect();
    let forced: Vec<&str> = force_include
        .iter()
        .map(|f| f.distribution_path.as_str())
        .collect();

    let mut files = Vec::new();
    for source in sources {
        let source_dir = absolute(&root.join(source));
        if !source_dir.is_dir() {
            return Err(ZipDirError::Io {
                source: io::Error::new(io::ErrorKind::NotFound, "source directory not found"),
                path: source_dir,
            });
        }

        let walker = WalkDir::new(&source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e) && !exclude.iter().any(|x| e.path().starts_with(x)));
        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                ZipDirError::Io {
                    source: io::Error::from(err),
                    path,
                }
            })?;
            if !is_file(&entry) {
                continue;
            }

            let path = entry.path();
            let distribution_path = to_posix_path(path.strip_prefix(&source_dir).unwrap_or(path));
            if forced.contains(&distribution_path.as_str()) {
                continue;
            }
            let relative_path = match path.strip_prefix(&root) {
                Ok(rel) => to_posix_path(rel),
                Err(_) => distribution_path.clone(),
            };
            files.push(IncludedFile::new(path, relative_path, distribution_path));
        }
    }

    for item in force_include {
        let source = absolute(&item.source);
        let relative_path = match source.strip_prefix(&root) {
            Ok(rel) => to_posix_path(rel),
            Err(_) => item.distribution_path.clone(),
        };
        files.push(IncludedFile::new(
            source,
            relative_path,
            item.distribution_path.clone(),
        ));
    }

    debug!(count = files.len(), root = %root.display(), "collected included files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "dummy").unwrap();
    }

    fn distribution_paths(files: &[IncludedFile]) -> Vec<&str> {
        files.iter().map(|f| f.distribution_path.as_str()).collect()
    }

    #[test]
    fn walks_source_directory_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempdir()?;
        for f in ["src/code.py", "src/subdir/data.txt", "src/.hidden", "tests/ignored.txt"] {
            touch(tmp.path(), f);
        }

        let files = collect_included_files(tmp.path(), &[PathBuf::from("src")], &[], &[])?;

        assert_eq!(distribution_paths(&files), ["code.py", "subdir/data.txt"]);
        assert_eq!(files[1].relative_path, "src/subdir/data.txt");
        assert!(files.iter().all(|f| f.path.is_absolute()));
        Ok(())
    }

    #[test]
    fn excluded_directories_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempdir()?;
        touch(tmp.path(), "a.txt");
        touch(tmp.path(), "dist/old.zip");

        let files = collect_included_files(
            tmp.path(),
            &[PathBuf::from(".")],
            &[PathBuf::from("dist")],
            &[],
        )?;

        assert_eq!(distribution_paths(&files), ["a.txt"]);
        Ok(())
    }

    #[test]
    fn force_included_files_replace_walked_ones() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempdir()?;
        touch(tmp.path(), "README.md");
        touch(tmp.path(), "src/README.md");
        touch(tmp.path(), "src/code.py");

        let force = [ForceInclude {
            source: tmp.path().join("README.md"),
            distribution_path: "README.md".into(),
        }];
        let files = collect_included_files(tmp.path(), &[PathBuf::from("src")], &[], &force)?;

        assert_eq!(distribution_paths(&files), ["code.py", "README.md"]);
        assert_eq!(files[1].relative_path, "README.md");
        Ok(())
    }

    #[test]
    fn missing_source_directory_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = collect_included_files(tmp.path(), &[PathBuf::from("nope")], &[], &[]).unwrap_err();
        assert!(matches!(err, ZipDirError::Io { .. }));
    }
}
