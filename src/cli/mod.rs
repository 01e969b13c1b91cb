use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v for info, -vv for debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Build a zip archive from a project directory.
    #[command(alias = "b")]
    Build {
        /// Project file holding the `project` metadata and `target` options.
        #[arg(short, long, default_value = "project.json")]
        project: PathBuf,

        /// Project root. Defaults to the directory containing the project file.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Directory the archive is written to, relative to the project root.
        #[arg(short, long, default_value = "dist")]
        out_dir: PathBuf,

        /// Directories whose contents are placed under the install name. [default: project root]
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,

        /// Override the root directory name inside the archive.
        #[arg(long)]
        install_name: Option<String>,

        /// Keep real modification times and file modes.
        #[arg(long = "no-reproducible", action = ArgAction::SetTrue)]
        no_reproducible: bool,

        /// Core metadata version to render (2.1 - 2.4).
        #[arg(long)]
        core_metadata_version: Option<String>,

        /// Timestamp for reproducible builds, in Unix seconds.
        #[arg(long, env = "SOURCE_DATE_EPOCH")]
        source_date_epoch: Option<String>,
    },

    /// Remove built archives from the output directory.
    Clean {
        /// Project file whose directory is the project root.
        #[arg(short, long, default_value = "project.json")]
        project: PathBuf,

        /// Project root. Defaults to the directory containing the project file.
        #[arg(long)]
        root: Option<PathBuf>,

        /// The directory to clean, relative to the project root.
        #[arg(short, long, default_value = "dist")]
        out_dir: PathBuf,
    },

    /// Convert an RFC 822 style core metadata file to JSON.
    #[command(alias = "m")]
    Metadata {
        /// The metadata file to convert.
        #[arg(required = true)]
        file: PathBuf,
    },
}

/// Parses command-line arguments using `clap`.
///
/// On invalid input clap prints usage and exits the process.
pub fn run() -> Args {
    Args::parse()
}
