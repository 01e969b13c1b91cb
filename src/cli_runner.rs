//! Command dispatch for the `zipdir` binary, kept in the library so the
//! integration tests and the binary share one implementation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::builder::{self, parse_source_date_epoch, Builder, ProjectFile, TargetConfig};
use crate::cli::{Args, Commands};
use crate::include::collect_included_files;
use crate::metadata::metadata_to_json;
use crate::ZipDirError;

/// Runs the parsed command, printing its results to stdout.
pub fn run_cli_app(args: &Args) -> Result<(), ZipDirError> {
    match &args.command {
        Commands::Build {
            project,
            root,
            out_dir,
            sources,
            install_name,
            no_reproducible,
            core_metadata_version,
            source_date_epoch,
        } => {
            let project_file = ProjectFile::load(project)?;
            let root = resolve_root(project, root.as_deref());

            let mut config = TargetConfig::from_value(&project_file.target)?;
            if let Some(name) = install_name {
                config.install_name = Some(name.clone());
            }
            if *no_reproducible {
                config.reproducible = false;
            }
            if let Some(version) = core_metadata_version {
                config.core_metadata_version = version.parse()?;
            }
            if let Some(raw) = source_date_epoch {
                config.source_date_epoch = Some(parse_source_date_epoch(raw)?);
            }
            debug!(?config, root = %root.display(), "resolved build configuration");

            let builder = Builder::new(&root, project_file.project, config);
            let build_data = builder.default_build_data();

            let sources = if sources.is_empty() {
                vec![PathBuf::from(".")]
            } else {
                sources.clone()
            };
            let project_path = fs::canonicalize(project).map_err(ZipDirError::io_at(project))?;
            let exclude = [out_dir.clone(), project_path];
            let files =
                collect_included_files(&root, &sources, &exclude, &build_data.force_include)?;

            let artifact = builder.build(&root.join(out_dir), &files)?;
            info!(artifact = %artifact.display(), "build finished");
            println!("{}", artifact.display());
        }
        Commands::Clean {
            project,
            root,
            out_dir,
        } => {
            let root = resolve_root(project, root.as_deref());
            for removed in builder::clean(&root.join(out_dir))? {
                println!("removed {}", removed.display());
            }
        }
        Commands::Metadata { file } => {
            let text = fs::read_to_string(file).map_err(ZipDirError::io_at(file))?;
            println!("{}", metadata_to_json(&text)?.to_json_pretty()?);
        }
    }

    Ok(())
}

/// `--root` if given, else the directory holding the project file.
fn resolve_root(project: &Path, root: Option<&Path>) -> PathBuf {
    if let Some(root) = root {
        return root.to_path_buf();
    }
    match project.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_defaults_to_the_project_file_directory() {
        assert_eq!(resolve_root(Path::new("project.json"), None), PathBuf::from("."));
        assert_eq!(
            resolve_root(Path::new("pkg/sub/project.json"), None),
            PathBuf::from("pkg/sub")
        );
        assert_eq!(
            resolve_root(Path::new("pkg/sub/project.json"), Some(Path::new("elsewhere"))),
            PathBuf::from("elsewhere")
        );
    }
}
