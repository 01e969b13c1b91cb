//! # zipped-directory
//!
//! This crate builds reproducible zip archives of a project directory.
//!
//! It is designed to be used by the `zipdir` command-line application, but its public API
//! can also be used to write archives and convert core metadata programmatically.
//!
//! ## Key Modules
//!
//! - [`archive`]: Writes zip entries under a root prefix with normalized timestamps and modes.
//! - [`fsx`]: Atomic file creation (temporary file in the target directory, renamed on commit).
//! - [`metadata`]: Renders core metadata and converts RFC 822 metadata text to JSON.
//! - [`builder`]: Orchestrates one build: configuration, metadata and the archive itself.
//! - [`include`]: Walks source directories to select the files for a build.
//!
//! ## Examples
//!
//! ```no_run
//! use zipped_directory::{write_archive, IncludedFile, Reproducibility};
//!
//! let files = [IncludedFile::new("src/foo", "src/foo", "bar")];
//! write_archive("dist/out.zip", "install_prefix", Reproducibility::default(), |archive| {
//!     for file in &files {
//!         archive.add_file(file)?;
//!     }
//!     archive.write_entry("METADATA.json", "{}")
//! })?;
//! # Ok::<(), zipped_directory::ZipDirError>(())
//! ```

pub mod archive;
pub mod builder;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod error;
pub mod include;
pub mod metadata;

// Atomic file replacement
pub mod fsx;

pub use archive::{write_archive, ArchiveRoot, Reproducibility, ZipArchiveWriter};
pub use builder::{Builder, TargetConfig};
pub use common::IncludedFile;
pub use error::ZipDirError;
pub use fsx::{atomic_write, AtomicFile};
pub use metadata::{metadata_to_json, MetadataRecord};
