//! Project metadata and its rendering as RFC 822 core metadata text.
//!
//! The rendered text is what [`super::metadata_to_json`] consumes, so the
//! folding used here (8-space continuation indent) is undone by its dedent
//! rule.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ZipDirError;

/// Continuation indent for multi-line header values.
const FOLD_INDENT: &str = "        ";

/// The project's `[project]` table, already resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectMetadata {
    pub name: String,
    pub version: String,
    /// One-line summary.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub readme: Option<Readme>,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub license: Option<License>,
    #[serde(default)]
    pub license_files: Vec<String>,
    #[serde(default)]
    pub authors: Vec<Person>,
    #[serde(default)]
    pub maintainers: Vec<Person>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub classifiers: Vec<String>,
    /// Label -> URL.
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Extra name -> requirements.
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub dynamic: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Readme {
    pub text: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Project-relative path of the readme file, force-included in the archive.
    #[serde(default)]
    pub path: Option<String>,
}

/// Either an SPDX expression (`"MIT"`) or a free-text license (`{"text": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum License {
    Expression(String),
    Text { text: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Supported `Metadata-Version` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoreMetadataVersion {
    V2_1,
    V2_2,
    V2_3,
    #[default]
    V2_4,
}

impl CoreMetadataVersion {
    pub const ALL: [CoreMetadataVersion; 4] = [
        CoreMetadataVersion::V2_1,
        CoreMetadataVersion::V2_2,
        CoreMetadataVersion::V2_3,
        CoreMetadataVersion::V2_4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreMetadataVersion::V2_1 => "2.1",
            CoreMetadataVersion::V2_2 => "2.2",
            CoreMetadataVersion::V2_3 => "2.3",
            CoreMetadataVersion::V2_4 => "2.4",
        }
    }

    /// Renders `metadata` as core metadata text of this version.
    pub fn construct(&self, metadata: &ProjectMetadata) -> String {
        let mut out = String::new();
        push_header(&mut out, "Metadata-Version", self.as_str());
        push_header(&mut out, "Name", &metadata.name);
        push_header(&mut out, "Version", &metadata.version);

        // Dynamic arrived in 2.2
        if *self >= CoreMetadataVersion::V2_2 {
            for field in &metadata.dynamic {
                push_header(&mut out, "Dynamic", field);
            }
        }
        if let Some(summary) = &metadata.description {
            push_header(&mut out, "Summary", summary);
        }
        for (label, url) in &metadata.urls {
            push_header(&mut out, "Project-URL", &format!("{label}, {url}"));
        }
        push_people(&mut out, "Author", &metadata.authors);
        push_people(&mut out, "Maintainer", &metadata.maintainers);

        match &metadata.license {
            Some(License::Expression(expr)) if *self >= CoreMetadataVersion::V2_4 => {
                push_header(&mut out, "License-Expression", expr)
            }
            Some(License::Expression(text)) | Some(License::Text { text }) => {
                push_header(&mut out, "License", text)
            }
            None => {}
        }
        for file in &metadata.license_files {
            push_header(&mut out, "License-File", file);
        }
        if !metadata.keywords.is_empty() {
            push_header(&mut out, "Keywords", &metadata.keywords.join(","));
        }
        for classifier in &metadata.classifiers {
            push_header(&mut out, "Classifier", classifier);
        }
        if let Some(requires_python) = &metadata.requires_python {
            push_header(&mut out, "Requires-Python", requires_python);
        }
        for dependency in &metadata.dependencies {
            push_header(&mut out, "Requires-Dist", dependency);
        }
        for (extra, dependencies) in &metadata.optional_dependencies {
            push_header(&mut out, "Provides-Extra", extra);
            let marker = format!("extra == '{extra}'");
            for dependency in dependencies {
                push_header(&mut out, "Requires-Dist", &add_environment_marker(dependency, &marker));
            }
        }

        if let Some(readme) = &metadata.readme {
            if let Some(content_type) = &readme.content_type {
                push_header(&mut out, "Description-Content-Type", content_type);
            }
            if !readme.text.is_empty() {
                out.push('\n');
                out.push_str(&readme.text);
            }
        }
        out
    }
}

impl fmt::Display for CoreMetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreMetadataVersion {
    type Err = ZipDirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoreMetadataVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ZipDirError::ConfigValue {
                field: "core-metadata-version".to_string(),
                message: format!(
                    "Unknown metadata version: {s} (expected one of 2.1, 2.2, 2.3, 2.4)"
                ),
            })
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(&value.replace('\n', &format!("\n{FOLD_INDENT}")));
    out.push('\n');
}

/// Name-only people go to `<field>`, people with an email to `<field>-email`.
fn push_people(out: &mut String, field: &str, people: &[Person]) {
    let names: Vec<&str> = people
        .iter()
        .filter(|p| p.email.is_none())
        .filter_map(|p| p.name.as_deref())
        .collect();
    let emails: Vec<String> = people
        .iter()
        .filter_map(|p| match (&p.name, &p.email) {
            (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
            (None, Some(email)) => Some(email.clone()),
            _ => None,
        })
        .collect();

    if !names.is_empty() {
        push_header(out, field, &names.join(", "));
    }
    if !emails.is_empty() {
        push_header(out, &format!("{field}-email"), &emails.join(", "));
    }
}

/// Appends `marker` to a requirement, joining with `and` if it already has one.
pub fn add_environment_marker(dependency: &str, marker: &str) -> String {
    if dependency.contains(';') {
        format!("{dependency} and {marker}")
    } else {
        format!("{dependency} ; {marker}")
    }
}
