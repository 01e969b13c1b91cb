//! # Core Metadata to JSON
//!
//! Converts RFC 822 style core metadata (`Name: value` headers, folded
//! continuation lines, optional body after a blank line) into a
//! [`MetadataRecord`] that serializes to the `METADATA.json` document.
//!
//! Keys are the lower-cased field names with `-` replaced by `_`. Fields in
//! [`MULTI_USE_FIELDS`] collect every occurrence into a list; every other
//! field keeps its first occurrence only. `Keywords` is split on commas. A
//! non-empty body becomes `description`.

pub mod core_metadata;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ZipDirError;

pub use self::core_metadata::{CoreMetadataVersion, License, Person, ProjectMetadata, Readme};

/// JSON keys of the fields that may appear more than once.
pub const MULTI_USE_FIELDS: &[&str] = &[
    "dynamic",
    "platform",
    "supported_platform",
    "classifier",
    "requires_dist",
    "requires_external",
    "project_url",
    "provides_extra",
    "provides_dist",
    "obsoletes_dist",
    "license_file",
];

const KEYWORDS: &str = "keywords";
const DESCRIPTION: &str = "description";

/// Value of one metadata field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Single(value.to_string())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldValue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        FieldValue::Multi(iter.into_iter().map(Into::into).collect())
    }
}

/// Metadata fields in first-encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    fields: Vec<(String, FieldValue)>,
}

impl MetadataRecord {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key`, keeping its position if already present.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    fn append(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, FieldValue::Multi(values))) => values.push(value),
            Some((_, slot)) => *slot = FieldValue::Multi(vec![value]),
            None => self.fields.push((key, FieldValue::Multi(vec![value]))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Pretty-printed JSON with two-space indentation.
    pub fn to_json_pretty(&self) -> Result<String, ZipDirError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One header as it appears in the text, continuation lines included.
#[derive(Debug)]
struct RawHeader<'a> {
    name: &'a str,
    value: String,
}

/// Parses core metadata text into a record.
pub fn metadata_to_json(text: &str) -> Result<MetadataRecord, ZipDirError> {
    let (headers, body) = parse_headers(text)?;

    let mut record = MetadataRecord::default();
    for header in headers {
        let key = json_key(header.name);
        let value = dedent_value(&header.value);
        if MULTI_USE_FIELDS.contains(&key.as_str()) {
            record.append(key, value);
        } else if record.contains_key(&key) {
            continue;
        } else if key == KEYWORDS {
            record.insert(key, value.split(',').collect());
        } else {
            record.insert(key, FieldValue::Single(value));
        }
    }

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        record.insert(DESCRIPTION, FieldValue::Single(body.to_string()));
    }
    Ok(record)
}

/// `Requires-Dist` -> `requires_dist`
pub fn json_key(field_name: &str) -> String {
    field_name.to_lowercase().replace('-', "_")
}

fn parse_headers(text: &str) -> Result<(Vec<RawHeader<'_>>, Option<&str>), ZipDirError> {
    let mut headers: Vec<RawHeader<'_>> = Vec::new();
    let mut offset = 0;

    for (index, raw) in text.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        offset += raw.len();
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return Ok((headers, Some(&text[offset..])));
        }

        if line.starts_with([' ', '\t']) {
            let Some(current) = headers.last_mut() else {
                return Err(parse_error(line_no, line, "continuation line before any header"));
            };
            current.value.push('\n');
            current.value.push_str(line);
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(parse_error(line_no, line, "expected 'Name: value'"));
        };
        if !is_valid_field_name(name) {
            return Err(parse_error(line_no, line, "invalid field name"));
        }
        headers.push(RawHeader {
            name,
            value: value.trim_start_matches([' ', '\t']).to_string(),
        });
    }

    Ok((headers, None))
}

fn parse_error(line: usize, text: &str, reason: &'static str) -> ZipDirError {
    ZipDirError::MetadataParse {
        line,
        text: text.to_string(),
        reason,
    }
}

// RFC 822: printable ASCII other than ':' and space.
fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// Leaves the first line alone and block-dedents the continuation lines.
fn dedent_value(value: &str) -> String {
    match value.split_once('\n') {
        None => value.to_string(),
        Some((first, rest)) => format!("{first}\n{}", dedent(rest)),
    }
}

/// Removes the longest common leading whitespace from every line.
/// Whitespace-only lines become empty and do not count toward the margin.
fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();

    let mut margin: Option<&str> = None;
    for &line in &lines {
        let content = line.trim_start_matches([' ', '\t']);
        if content.is_empty() {
            continue;
        }
        let indent = &line[..line.len() - content.len()];
        margin = Some(match margin {
            None => indent,
            Some(m) => common_prefix(m, indent),
        });
    }
    let margin = margin.unwrap_or("");

    lines
        .iter()
        .map(|&line| {
            if line.trim_start_matches([' ', '\t']).is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}
