//! # Build Orchestration
//!
//! Ties the pieces together for one build: resolves the target configuration,
//! renders the project's core metadata, and writes every included file plus
//! `METADATA.json` into `<dist>/<name>-<version>.zip` under the install name.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::archive::{write_archive, ArchiveRoot, Reproducibility};
use crate::common::{to_posix_path, IncludedFile};
use crate::metadata::{metadata_to_json, CoreMetadataVersion, ProjectMetadata};
use crate::ZipDirError;

/// Name of the synthesized metadata entry.
pub const METADATA_JSON: &str = "METADATA.json";

/// Extension of the artifacts this builder produces (and `clean` removes).
pub const ARTIFACT_EXTENSION: &str = "zip";

/// Options of the `zipped-directory` build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Root prefix inside the archive. `None` means the normalized project name.
    pub install_name: Option<String>,
    pub reproducible: bool,
    pub core_metadata_version: CoreMetadataVersion,
    /// Timestamp for reproducible builds, usually from `SOURCE_DATE_EPOCH`.
    pub source_date_epoch: Option<i64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            install_name: None,
            reproducible: true,
            core_metadata_version: CoreMetadataVersion::default(),
            source_date_epoch: None,
        }
    }
}

impl TargetConfig {
    /// Reads the target table (`install-name`, `reproducible`,
    /// `core-metadata-version`). `null` or a missing table gives the defaults.
    pub fn from_value(value: &Value) -> Result<Self, ZipDirError> {
        let mut config = TargetConfig::default();
        let table = match value {
            Value::Null => return Ok(config),
            Value::Object(table) => table,
            _ => return Err(type_error("target configuration", "a table")),
        };

        for (key, value) in table {
            match key.as_str() {
                "install-name" => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| type_error("install-name", "a string"))?;
                    config.install_name = Some(name.to_string());
                }
                "reproducible" => {
                    config.reproducible = value
                        .as_bool()
                        .ok_or_else(|| type_error("reproducible", "a boolean"))?;
                }
                "core-metadata-version" => {
                    let version = value
                        .as_str()
                        .ok_or_else(|| type_error("core-metadata-version", "a string"))?;
                    config.core_metadata_version = version.parse()?;
                }
                other => warn!(option = other, "ignoring unknown target option"),
            }
        }
        Ok(config)
    }

    pub fn reproducibility(&self) -> Reproducibility {
        if self.reproducible {
            Reproducibility::enabled(self.source_date_epoch)
        } else {
            Reproducibility::Disabled
        }
    }
}

fn type_error(field: &str, expected: &'static str) -> ZipDirError {
    ZipDirError::ConfigType {
        field: field.to_string(),
        expected,
    }
}

/// Parses a `SOURCE_DATE_EPOCH` value (integer Unix seconds).
pub fn parse_source_date_epoch(raw: &str) -> Result<i64, ZipDirError> {
    raw.trim().parse().map_err(|_| ZipDirError::ConfigValue {
        field: "SOURCE_DATE_EPOCH".to_string(),
        message: format!("expected integer Unix seconds, got {raw:?}"),
    })
}

/// Contents of a project file: `{"project": {...}, "target": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    pub project: ProjectMetadata,
    #[serde(default)]
    pub target: Value,
}

impl ProjectFile {
    pub fn load(path: &Path) -> Result<Self, ZipDirError> {
        let text = fs::read_to_string(path).map_err(ZipDirError::io_at(path))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// A file copied into the archive root regardless of the source selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceInclude {
    pub source: PathBuf,
    pub distribution_path: String,
}

/// Values computed before file discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildData {
    pub install_name: String,
    pub force_include: Vec<ForceInclude>,
}

/// Replaces each run of characters other than word characters and `.` with `_`.
pub fn normalize_file_name_component(component: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE
        .get_or_init(|| Regex::new(r"[^\w\d.]+").expect("valid file name pattern"))
        .replace_all(component, "_")
        .into_owned()
}

pub struct Builder {
    root: PathBuf,
    metadata: ProjectMetadata,
    config: TargetConfig,
}

impl Builder {
    pub fn new(root: impl Into<PathBuf>, metadata: ProjectMetadata, config: TargetConfig) -> Self {
        Self {
            root: root.into(),
            metadata,
            config,
        }
    }

    pub fn project_name(&self) -> String {
        normalize_file_name_component(&self.metadata.name)
    }

    pub fn install_name(&self) -> String {
        self.config
            .install_name
            .clone()
            .unwrap_or_else(|| self.project_name())
    }

    /// `<normalized-name>-<version>.zip`
    pub fn artifact_name(&self) -> String {
        format!(
            "{}-{}.{ARTIFACT_EXTENSION}",
            self.project_name(),
            self.metadata.version
        )
    }

    /// Install name plus the readme and license files, which are placed at the
    /// archive root under their bare file names.
    pub fn default_build_data(&self) -> BuildData {
        let readme = self.metadata.readme.as_ref().and_then(|r| r.path.as_deref());
        let mut force_include: Vec<ForceInclude> = Vec::new();
        for relative in readme.into_iter().chain(self.metadata.license_files.iter().map(String::as_str)) {
            let relative = to_posix_path(Path::new(relative));
            let source = self.root.join(&relative);
            if force_include.iter().any(|f| f.source == source) {
                continue;
            }
            let distribution_path = relative
                .rsplit('/')
                .next()
                .unwrap_or(relative.as_str())
                .to_string();
            force_include.push(ForceInclude {
                source,
                distribution_path,
            });
        }

        BuildData {
            install_name: self.install_name(),
            force_include,
        }
    }

    /// The `METADATA.json` document for this project.
    pub fn metadata_json(&self) -> Result<String, ZipDirError> {
        let text = self.config.core_metadata_version.construct(&self.metadata);
        metadata_to_json(&text)?.to_json_pretty()
    }

    /// Writes the archive into `directory` (created if missing) and returns its path.
    pub fn build(&self, directory: &Path, files: &[IncludedFile]) -> Result<PathBuf, ZipDirError> {
        let install_name = self.install_name();
        ArchiveRoot::new(&install_name)?;
        let metadata_json = self.metadata_json()?;

        fs::create_dir_all(directory).map_err(ZipDirError::io_at(directory))?;
        let target = directory.join(self.artifact_name());
        info!(
            target = %target.display(),
            install_name = %install_name,
            files = files.len(),
            reproducible = self.config.reproducible,
            "building archive"
        );

        write_archive(&target, &install_name, self.config.reproducibility(), |archive| {
            for included in files {
                archive.add_file(included)?;
            }
            archive.write_entry(METADATA_JSON, &metadata_json)
        })
    }
}

/// Removes every `*.zip` directly inside `directory` and returns the removed paths.
/// A missing directory removes nothing.
pub fn clean(directory: &Path) -> Result<Vec<PathBuf>, ZipDirError> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ZipDirError::io_at(directory)(e)),
    };

    let mut removed = Vec::new();
    for entry in entries {
        let path = entry.map_err(ZipDirError::io_at(directory))?.path();
        let is_artifact = path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION);
        if is_artifact && path.is_file() {
            fs::remove_file(&path).map_err(ZipDirError::io_at(&path))?;
            removed.push(path);
        }
    }
    removed.sort();
    info!(directory = %directory.display(), removed = removed.len(), "cleaned artifacts");
    Ok(removed)
}
