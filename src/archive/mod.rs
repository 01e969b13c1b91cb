//! # Reproducible Zip Archive Writer
//!
//! This module builds the `.zip` artifact. Every entry is stored under a common
//! [`ArchiveRoot`] and compressed with deflate. The container is written into an
//! [`AtomicFile`], so a failed build never leaves a partial archive at the
//! destination.
//!
//! With [`Reproducibility::Enabled`] the archive bytes depend only on the entry
//! names, their contents and whether each source file is owner-executable:
//! every entry carries the same fixed timestamp, and file modes are reduced to
//! `0644` or `0755`. With [`Reproducibility::Disabled`] the source file's
//! modification time and permission bits are copied as they are.

use std::fs::{self, File, Metadata};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::common::IncludedFile;
use crate::fsx::{self, AtomicFile};
use crate::ZipDirError;

/// Timestamp used for reproducible builds when no `SOURCE_DATE_EPOCH` is given
/// (2020-02-02T00:00:00Z).
pub const DEFAULT_SOURCE_DATE_EPOCH: i64 = 1_580_601_600;

/// Mode of entries that have no source file, and of files whose mode is unknown.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const EXECUTABLE_FILE_MODE: u32 = 0o755;

const OWNER_EXECUTE: u32 = 0o100;

// 64 KiB read buffer; files are streamed, never loaded whole.
const COPY_BUF_SIZE: usize = 64 * 1024;

const SPECIAL_MODE_BITS: u32 = 0o7000;
const S_IFREG: u32 = 0o100000;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD_LEN: u64 = 22;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const ZIP64_LOCATOR_LEN: u64 = 20;
const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const CENTRAL_HEADER_LEN: u64 = 46;

/// Controls whether entry timestamps and modes are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reproducibility {
    /// Copy each source file's mtime and mode verbatim.
    Disabled,
    /// Stamp every entry with `timestamp` (Unix seconds, UTC) and normalize modes.
    Enabled { timestamp: i64 },
}

impl Default for Reproducibility {
    fn default() -> Self {
        Reproducibility::Enabled {
            timestamp: DEFAULT_SOURCE_DATE_EPOCH,
        }
    }
}

impl Reproducibility {
    /// Reproducible mode at `source_date_epoch`, or at [`DEFAULT_SOURCE_DATE_EPOCH`].
    pub fn enabled(source_date_epoch: Option<i64>) -> Self {
        Reproducibility::Enabled {
            timestamp: source_date_epoch.unwrap_or(DEFAULT_SOURCE_DATE_EPOCH),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Reproducibility::Enabled { .. })
    }
}

/// Reduces a file mode to `0755` if the owner-execute bit is set, `0644` otherwise.
/// Group and other execute bits are not consulted.
pub fn normalize_mode(mode: Option<u32>) -> u32 {
    match mode {
        Some(m) if m & OWNER_EXECUTE != 0 => EXECUTABLE_FILE_MODE,
        _ => DEFAULT_FILE_MODE,
    }
}

/// The path prefix shared by all entries of one archive.
///
/// `""` and `"."` mean "no prefix". Any other value is normalized to
/// forward-slash segments without leading `/`, `./` or a drive letter, and
/// must not contain `..`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveRoot {
    prefix: Option<String>,
}

impl ArchiveRoot {
    pub fn new(prefix: &str) -> Result<Self, ZipDirError> {
        let normalized = normalize_entry_path(prefix)?;
        Ok(Self {
            prefix: (!normalized.is_empty()).then_some(normalized),
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Full archive name of an entry at `relative` below this root.
    pub fn entry_name(&self, relative: &str) -> Result<String, ZipDirError> {
        let relative_norm = normalize_entry_path(relative)?;
        if relative_norm.is_empty() {
            return Err(ZipDirError::InvalidEntryPath {
                path: relative.to_string(),
                reason: "entry path is empty",
            });
        }
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{relative_norm}"),
            None => relative_norm,
        })
    }
}

/// Normalize path by replacing backslashes with forward slashes and dropping
/// empty and `.` segments, a leading root and a leading drive letter.
/// Example: "./dir1//dir2/file.txt" becomes "dir1/dir2/file.txt"
fn normalize_entry_path(path: &str) -> Result<String, ZipDirError> {
    let s = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for (i, segment) in s.split('/').enumerate() {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(ZipDirError::InvalidEntryPath {
                    path: path.to_string(),
                    reason: "path escapes the archive root",
                })
            }
            drive if i == 0 && is_drive_letter(drive) => {}
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

fn is_drive_letter(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Converts a calendar time to the zip (MS-DOS) representation, clamped to the
/// range the format can hold.
fn dos_datetime(t: NaiveDateTime) -> zip::DateTime {
    let (year, month, day, hour, minute, second) = if t.year() < 1980 {
        (1980, 1, 1, 0, 0, 0)
    } else if t.year() > 2107 {
        (2107, 12, 31, 23, 59, 58)
    } else {
        (
            t.year() as u16,
            t.month() as u8,
            t.day() as u8,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
        )
    };
    zip::DateTime::from_date_and_time(year, month, day, hour, minute, second).unwrap_or_default()
}

fn utc_instant(timestamp: i64) -> NaiveDateTime {
    match chrono::DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.naive_utc(),
        None if timestamp < 0 => NaiveDate::MIN.and_time(Default::default()),
        None => NaiveDate::MAX.and_time(Default::default()),
    }
}

fn local_instant(time: SystemTime) -> NaiveDateTime {
    chrono::DateTime::<chrono::Local>::from(time).naive_local()
}

/// A zip archive under construction, backed by an [`AtomicFile`].
///
/// Entries are written in call order; nothing is sorted or deduplicated.
/// Call [`finish`](Self::finish) to publish the archive; dropping the writer
/// instead discards it.
pub struct ZipArchiveWriter {
    zip: ZipWriter<AtomicFile>,
    root: ArchiveRoot,
    reproducibility: Reproducibility,
    destination: PathBuf,
    entries: usize,
    /// Entries whose setuid, setgid or sticky bits must be restored on finish.
    special_modes: Vec<(usize, u32)>,
}

impl ZipArchiveWriter {
    /// Starts a new archive that will replace `destination` when finished.
    ///
    /// The root prefix is validated before the temporary file is created.
    pub fn open(
        destination: impl AsRef<Path>,
        root_prefix: &str,
        reproducibility: Reproducibility,
    ) -> Result<Self, ZipDirError> {
        let root = ArchiveRoot::new(root_prefix)?;
        let destination = destination.as_ref().to_path_buf();
        let file = AtomicFile::create(&destination)?;
        debug!(
            destination = %destination.display(),
            root = root.prefix().unwrap_or(""),
            reproducible = reproducibility.is_enabled(),
            "opened archive"
        );
        Ok(Self {
            zip: ZipWriter::new(file),
            root,
            reproducibility,
            destination,
            entries: 0,
            special_modes: Vec::new(),
        })
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Streams a file from disk into a new entry at `root/distribution_path`.
    pub fn add_file(&mut self, included: &IncludedFile) -> Result<(), ZipDirError> {
        let source = included.path.as_path();
        let metadata = fs::metadata(source).map_err(ZipDirError::io_at(source))?;
        if !metadata.is_file() {
            return Err(ZipDirError::NotAFile {
                path: source.to_path_buf(),
            });
        }
        let name = self.root.entry_name(&included.distribution_path)?;
        let (options, mode) = self.file_options(&metadata, source)?;

        let mut src = File::open(source).map_err(ZipDirError::io_at(source))?;
        self.zip.start_file(name.as_str(), options)?;
        if mode & SPECIAL_MODE_BITS != 0 {
            self.special_modes.push((self.entries, mode));
        }

        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut copied: u64 = 0;
        loop {
            let n = match src.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ZipDirError::io_at(source)(e)),
            };
            self.zip
                .write_all(&buf[..n])
                .map_err(ZipDirError::io_at(&self.destination))?;
            copied += n as u64;
        }

        self.entries += 1;
        debug!(entry = %name, bytes = copied, source = %source.display(), "added file");
        Ok(())
    }

    /// Writes an in-memory buffer as a new entry at `root/path` with mode `0644`.
    pub fn write_entry(&mut self, path: &str, data: impl AsRef<[u8]>) -> Result<(), ZipDirError> {
        let name = self.root.entry_name(path)?;
        let modified = match self.reproducibility {
            Reproducibility::Enabled { timestamp } => utc_instant(timestamp),
            Reproducibility::Disabled => chrono::Local::now().naive_local(),
        };
        let data = data.as_ref();
        let options = entry_options(modified, DEFAULT_FILE_MODE, data.len() as u64);

        self.zip.start_file(name.as_str(), options)?;
        self.zip
            .write_all(data)
            .map_err(ZipDirError::io_at(&self.destination))?;

        self.entries += 1;
        debug!(entry = %name, bytes = data.len(), "wrote entry");
        Ok(())
    }

    /// Writes the central directory and atomically moves the archive into place.
    pub fn finish(mut self) -> Result<PathBuf, ZipDirError> {
        let mut file = self.zip.finish()?;
        if !self.special_modes.is_empty() {
            restore_special_bits(file.as_file_mut(), &self.special_modes)
                .map_err(ZipDirError::io_at(&self.destination))?;
        }
        let path = file.commit()?;
        info!(archive = %path.display(), entries = self.entries, "archive written");
        Ok(path)
    }

    fn file_options(
        &self,
        metadata: &Metadata,
        source: &Path,
    ) -> Result<(FileOptions, u32), ZipDirError> {
        let (modified, mode) = match self.reproducibility {
            Reproducibility::Enabled { timestamp } => {
                (utc_instant(timestamp), normalize_mode(fsx::file_mode(metadata)))
            }
            Reproducibility::Disabled => {
                let mtime = metadata.modified().map_err(ZipDirError::io_at(source))?;
                (
                    local_instant(mtime),
                    fsx::file_mode(metadata).unwrap_or(DEFAULT_FILE_MODE),
                )
            }
        };
        Ok((entry_options(modified, mode, metadata.len()), mode))
    }
}

/// `FileOptions::unix_permissions` keeps only `0o777`, so the setuid, setgid
/// and sticky bits are written back into the central directory of the
/// finished archive. `modes` pairs entry indices (in write order) with the
/// full permission bits, sorted by index.
fn restore_special_bits(file: &mut File, modes: &[(usize, u32)]) -> io::Result<()> {
    let len = file.seek(SeekFrom::End(0))?;
    // No archive comment is written, so the end record closes the file.
    let eocd = len
        .checked_sub(EOCD_LEN)
        .ok_or_else(|| corrupt("archive shorter than its end record"))?;
    let record: [u8; 22] = read_at(file, eocd)?;
    if le_u32(&record, 0) != EOCD_SIGNATURE {
        return Err(corrupt("end of central directory not found"));
    }

    let mut offset = u64::from(le_u32(&record, 16));
    if offset == u64::from(u32::MAX) {
        let locator_at = eocd
            .checked_sub(ZIP64_LOCATOR_LEN)
            .ok_or_else(|| corrupt("zip64 locator missing"))?;
        let locator: [u8; 20] = read_at(file, locator_at)?;
        if le_u32(&locator, 0) != ZIP64_LOCATOR_SIGNATURE {
            return Err(corrupt("zip64 locator missing"));
        }
        let zip64: [u8; 56] = read_at(file, le_u64(&locator, 8))?;
        if le_u32(&zip64, 0) != ZIP64_EOCD_SIGNATURE {
            return Err(corrupt("zip64 end record missing"));
        }
        offset = le_u64(&zip64, 48);
    }

    let mut pending = modes.iter().peekable();
    let mut index = 0;
    while let Some(&&(target, mode)) = pending.peek() {
        let header: [u8; 46] = read_at(file, offset)?;
        if le_u32(&header, 0) != CENTRAL_HEADER_SIGNATURE {
            return Err(corrupt("central directory entry expected"));
        }
        if index == target {
            file.seek(SeekFrom::Start(offset + 38))?;
            file.write_all(&((S_IFREG | mode) << 16).to_le_bytes())?;
            pending.next();
        }
        let variable = u64::from(le_u16(&header, 28))
            + u64::from(le_u16(&header, 30))
            + u64::from(le_u16(&header, 32));
        offset += CENTRAL_HEADER_LEN + variable;
        index += 1;
    }
    Ok(())
}

fn read_at<const N: usize>(file: &mut File, offset: u64) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    u64::from(le_u32(buf, at)) | (u64::from(le_u32(buf, at + 4)) << 32)
}

fn corrupt(message: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, message.to_string())
}

fn entry_options(modified: NaiveDateTime, mode: u32, size: u64) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(dos_datetime(modified))
        .unix_permissions(mode)
        .large_file(size >= u64::from(u32::MAX))
}

/// Scoped form of [`ZipArchiveWriter`]: runs `body` against a fresh archive and
/// publishes it only if `body` succeeds. On error the temporary file is
/// removed and `destination` is left as it was.
pub fn write_archive<F>(
    destination: impl AsRef<Path>,
    root_prefix: &str,
    reproducibility: Reproducibility,
    body: F,
) -> Result<PathBuf, ZipDirError>
where
    F: FnOnce(&mut ZipArchiveWriter) -> Result<(), ZipDirError>,
{
    let mut archive = ZipArchiveWriter::open(destination, root_prefix, reproducibility)?;
    body(&mut archive)?;
    archive.finish()
}
