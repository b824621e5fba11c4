//! Directory snapshots for safety backups.
//!
//! `ZipArchiver` writes plain PKZIP archives (no zip64) with raw deflate
//! streams from `flate2`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core_api::{CoreError, CoreErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionHint {
    Fastest,
    #[default]
    Default,
    Smallest,
}

impl CompressionHint {
    pub fn level(self) -> Compression {
        match self {
            Self::Fastest => Compression::fast(),
            Self::Default => Compression::default(),
            Self::Smallest => Compression::best(),
        }
    }
}

/// Compresses a directory tree into a single archive file.
pub trait Archiver {
    fn create_archive(
        &self,
        source_dir: &Path,
        destination: &Path,
        hint: CompressionHint,
    ) -> Result<(), CoreError>;
}

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x0605_4b50;
const ZIP_VERSION: u16 = 20;
const FLAG_UTF8_NAMES: u16 = 0x0800;
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;
const DIRECTORY_ATTRIBUTE: u32 = 0x10;
const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipArchiver {
    root: String,
}

impl Default for ZipArchiver {
    fn default() -> Self {
        Self::with_root("Characters")
    }
}

impl ZipArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries are stored under `root/`; an empty root stores them at the top level.
    pub fn with_root(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl Archiver for ZipArchiver {
    fn create_archive(
        &self,
        source_dir: &Path,
        destination: &Path,
        hint: CompressionHint,
    ) -> Result<(), CoreError> {
        if !source_dir.is_dir() {
            return Err(CoreError::not_found(format!(
                "archive source {} is not a directory",
                source_dir.display()
            )));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }

        let file = File::options()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => CoreError::name_conflict(format!(
                    "{} already exists; refusing to overwrite it",
                    destination.display()
                )),
                _ => CoreError::io(destination, e),
            })?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let write_err = |e: io::Error| CoreError::io(destination, e);

        if !self.root.is_empty() {
            zip.add_directory(format!("{}/", self.root), None)
                .map_err(write_err)?;
        }

        let walker = WalkDir::new(source_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Io,
                    format!("failed to walk {}: {e}", source_dir.display()),
                )
            })?;
            let relative = entry.path().strip_prefix(source_dir).map_err(|_| {
                CoreError::new(
                    CoreErrorCode::Io,
                    format!("{} escaped {}", entry.path().display(), source_dir.display()),
                )
            })?;
            let name = entry_name(&self.root, relative);
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());

            if entry.file_type().is_dir() {
                zip.add_directory(format!("{name}/"), modified)
                    .map_err(write_err)?;
            } else if entry.file_type().is_file() {
                let data = fs::read(entry.path()).map_err(|e| CoreError::io(entry.path(), e))?;
                zip.add_file(name, &data, hint.level(), modified)
                    .map_err(write_err)?;
            } else {
                debug!(path = %entry.path().display(), "skipping non-regular file");
            }
        }

        let count = zip.finish().map_err(write_err)?;
        info!(
            source = %source_dir.display(),
            archive = %destination.display(),
            entries = count,
            "wrote archive"
        );
        Ok(())
    }
}

struct CentralEntry {
    name: String,
    method: u16,
    dos_time: u16,
    dos_date: u16,
    crc: u32,
    compressed_size: u32,
    size: u32,
    offset: u32,
    external_attributes: u32,
}

struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    entries: Vec<CentralEntry>,
}

impl<W: Write> ZipWriter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            entries: Vec::new(),
        }
    }

    fn add_directory(&mut self, name: String, modified: Option<SystemTime>) -> io::Result<()> {
        let (dos_time, dos_date) = dos_datetime(modified);
        let entry = CentralEntry {
            name,
            method: METHOD_STORED,
            dos_time,
            dos_date,
            crc: 0,
            compressed_size: 0,
            size: 0,
            offset: zip32(self.offset)?,
            external_attributes: DIRECTORY_ATTRIBUTE,
        };
        self.write_local(&entry, &[])?;
        self.entries.push(entry);
        Ok(())
    }

    fn add_file(
        &mut self,
        name: String,
        data: &[u8],
        level: Compression,
        modified: Option<SystemTime>,
    ) -> io::Result<()> {
        let mut crc = Crc::new();
        crc.update(data);

        let mut encoder = DeflateEncoder::new(Vec::new(), level);
        encoder.write_all(data)?;
        let packed = encoder.finish()?;

        let (dos_time, dos_date) = dos_datetime(modified);
        let entry = CentralEntry {
            name,
            method: METHOD_DEFLATED,
            dos_time,
            dos_date,
            crc: crc.sum(),
            compressed_size: zip32(packed.len() as u64)?,
            size: zip32(data.len() as u64)?,
            offset: zip32(self.offset)?,
            external_attributes: 0,
        };
        self.write_local(&entry, &packed)?;
        self.entries.push(entry);
        Ok(())
    }

    fn write_local(&mut self, entry: &CentralEntry, payload: &[u8]) -> io::Result<()> {
        let mut header = Vec::with_capacity(30 + entry.name.len());
        put_u32(&mut header, LOCAL_HEADER_SIGNATURE);
        put_u16(&mut header, ZIP_VERSION);
        put_u16(&mut header, FLAG_UTF8_NAMES);
        put_u16(&mut header, entry.method);
        put_u16(&mut header, entry.dos_time);
        put_u16(&mut header, entry.dos_date);
        put_u32(&mut header, entry.crc);
        put_u32(&mut header, entry.compressed_size);
        put_u32(&mut header, entry.size);
        put_u16(&mut header, name_len(&entry.name)?);
        put_u16(&mut header, 0);
        header.extend_from_slice(entry.name.as_bytes());

        self.out.write_all(&header)?;
        self.out.write_all(payload)?;
        self.offset += (header.len() + payload.len()) as u64;
        Ok(())
    }

    /// Write the central directory and end record; returns the entry count.
    fn finish(mut self) -> io::Result<usize> {
        let directory_offset = zip32(self.offset)?;
        let mut directory = Vec::new();
        for entry in &self.entries {
            put_u32(&mut directory, CENTRAL_HEADER_SIGNATURE);
            put_u16(&mut directory, ZIP_VERSION);
            put_u16(&mut directory, ZIP_VERSION);
            put_u16(&mut directory, FLAG_UTF8_NAMES);
            put_u16(&mut directory, entry.method);
            put_u16(&mut directory, entry.dos_time);
            put_u16(&mut directory, entry.dos_date);
            put_u32(&mut directory, entry.crc);
            put_u32(&mut directory, entry.compressed_size);
            put_u32(&mut directory, entry.size);
            put_u16(&mut directory, name_len(&entry.name)?);
            put_u16(&mut directory, 0);
            put_u16(&mut directory, 0);
            put_u16(&mut directory, 0);
            put_u16(&mut directory, 0);
            put_u32(&mut directory, entry.external_attributes);
            put_u32(&mut directory, entry.offset);
            directory.extend_from_slice(entry.name.as_bytes());
        }

        let count = u16::try_from(self.entries.len())
            .map_err(|_| too_large("more than 65535 entries"))?;
        let mut end = Vec::with_capacity(22);
        put_u32(&mut end, END_OF_CENTRAL_DIR_SIGNATURE);
        put_u16(&mut end, 0);
        put_u16(&mut end, 0);
        put_u16(&mut end, count);
        put_u16(&mut end, count);
        put_u32(&mut end, zip32(directory.len() as u64)?);
        put_u32(&mut end, directory_offset);
        put_u16(&mut end, 0);

        self.out.write_all(&directory)?;
        self.out.write_all(&end)?;
        self.out.flush()?;
        Ok(self.entries.len())
    }
}

fn entry_name(root: &str, relative: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !root.is_empty() {
        parts.push(root.to_string());
    }
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().into_owned());
        }
    }
    parts.join("/")
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn too_large(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("archive exceeds zip32 limits: {what}"),
    )
}

fn zip32(value: u64) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| too_large("size or offset above 4 GiB"))
}

fn name_len(name: &str) -> io::Result<u16> {
    u16::try_from(name.len()).map_err(|_| too_large("entry name longer than 65535 bytes"))
}

/// MS-DOS (time, date) for `time`, clamped to the 1980..=2107 range.
///
/// Fields are UTC. DOS readers usually assume local time, so listings can be
/// off by the reader's UTC offset; the archive contents are unaffected.
fn dos_datetime(time: Option<SystemTime>) -> (u16, u16) {
    let Some(secs) = time
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
    else {
        return (0, DOS_EPOCH_DATE);
    };
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    if year < 1980 {
        return (0, DOS_EPOCH_DATE);
    }
    let rem = secs % 86_400;
    let dos_time = ((rem / 3600) << 11) | (((rem % 3600) / 60) << 5) | ((rem % 60) / 2);
    let dos_date = ((year.min(2107) - 1980) << 9) | (month << 5) | day;
    (dos_time as u16, dos_date as u16)
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
