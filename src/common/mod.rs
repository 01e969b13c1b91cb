//! Common types shared by the archive writer, the builder and the CLI.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One file selected for the archive by the file-discovery step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IncludedFile {
    /// Absolute path of the source file on disk.
    pub path: PathBuf,
    /// Path relative to the project root.
    pub relative_path: String,
    /// POSIX-style path the file occupies inside the archive, below the root prefix.
    pub distribution_path: String,
}

impl IncludedFile {
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        distribution_path: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            relative_path: relative_path.into(),
            distribution_path: distribution_path.into(),
        }
    }
}

/// Joins the normal components of `path` with forward slashes.
/// `.` components are dropped; anything else (roots, prefixes, `..`) is kept
/// verbatim so that the archive path validation can reject it.
pub fn to_posix_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::RootDir => parts.push(String::new()),
            Component::Prefix(prefix) => {
                parts.push(prefix.as_os_str().to_string_lossy().into_owned())
            }
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_path_uses_forward_slashes() {
        assert_eq!(to_posix_path(Path::new("a/b/c.txt")), "a/b/c.txt");
        assert_eq!(to_posix_path(Path::new("./a/./b")), "a/b");
        assert_eq!(to_posix_path(Path::new("")), "");
    }

    #[cfg(unix)]
    #[test]
    fn posix_path_keeps_unsafe_components_visible() {
        assert_eq!(to_posix_path(Path::new("/abs/x")), "/abs/x");
        assert_eq!(to_posix_path(Path::new("a/../b")), "a/../b");
    }
}
