use std::path::{Path, PathBuf};

/// The primary error type for all operations in the `zipped-directory` crate.
#[derive(Debug, thiserror::Error)]
pub enum ZipDirError {
    /// An I/O error occurred, typically while reading a source file or writing the archive.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// A directory (or another non-regular file) was handed to the archive as a file entry.
    #[error("cannot add '{}' to the archive: not a regular file", path.display())]
    NotAFile { path: PathBuf },

    /// An archive root or entry path that is absolute or climbs out of the archive root.
    #[error("invalid archive path '{path}': {reason}")]
    InvalidEntryPath { path: String, reason: &'static str },

    /// Core metadata text that cannot be read as RFC 822 headers.
    #[error("malformed metadata at line {line} ({reason}): {text:?}")]
    MetadataParse {
        line: usize,
        text: String,
        reason: &'static str,
    },

    /// A configuration value of the wrong kind (e.g. a number where a string is expected).
    #[error("{field} must be {expected}")]
    ConfigType { field: String, expected: &'static str },

    /// A configuration value of the right kind that names an unsupported choice.
    #[error("{field}: {message}")]
    ConfigValue { field: String, message: String },

    /// An error reported by the zip container writer.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An error during serialization or deserialization of JSON documents.
    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ZipDirError {
    /// Builds a closure that attaches `path` to an I/O error, for use with `map_err`.
    pub fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> ZipDirError + '_ {
        move |source| ZipDirError::Io {
            source,
            path: path.to_path_buf(),
        }
    }

    /// True for the "bad shape" / "bad choice" configuration errors.
    pub fn is_config_error(&self) -> bool {
        matches!(self, ZipDirError::ConfigType { .. } | ZipDirError::ConfigValue { .. })
    }

    /// Process exit status for the command-line tool: 2 for configuration
    /// errors, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        if self.is_config_error() {
            2
        } else {
            1
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for ZipDirError {
    fn from(err: std::io::Error) -> Self {
        ZipDirError::Io {
            source: err,
            path: PathBuf::new(),
        }
    }
}
