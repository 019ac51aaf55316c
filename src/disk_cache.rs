//! Disk Cache
//!
//! Append-only key/value store for compiled programs. One file per cache:
//!
//! ```text
//! header:  magic "VSPC" | format version u32 | generator version u32 | fingerprint xxh3 u64
//! record:  key_len u32 | key | value_len u32 | value | xxh32(key ++ value) u32
//! ```
//!
//! All integers are little-endian.
//!
//! # Recovery rules
//!
//! - A header that does not match the running generator and driver discards
//!   the whole store at [`DiskCache::open`]: the file is truncated and a fresh
//!   header written, so the run starts from an empty cache.
//! - A record whose checksum fails is skipped; the records around it are
//!   still delivered.
//! - A record that is cut short (crash during an append, or a length field
//!   pointing past the end of the file) ends the readable part of the file.
//!   `open` truncates it away so later appends stay framed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::checksum::checksum_parts;
use crate::errors::{Result, VestaError};

/// File magic.
pub const MAGIC: [u8; 4] = *b"VSPC";

/// Version of the container layout above. Independent of the generator.
pub const FORMAT_VERSION: u32 = 1;

/// Encoded header size in bytes.
pub const HEADER_LEN: u64 = 20;

/// Largest key or value accepted. Longer length fields are treated as torn.
pub const MAX_FIELD_LEN: u32 = 64 << 20;

// ─── Header ──────────────────────────────────────────────────────────────────

/// Identity a store must match to be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub generator_version: u32,
    /// xxh3-64 of the driver fingerprint string.
    pub fingerprint_hash: u64,
}

impl CacheHeader {
    #[must_use]
    pub fn new(generator_version: u32, driver_fingerprint: &str) -> Self {
        Self {
            generator_version,
            fingerprint_hash: xxh3_64(driver_fingerprint.as_bytes()),
        }
    }

    fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut out = [0u8; HEADER_LEN as usize];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.generator_version.to_le_bytes());
        out[12..20].copy_from_slice(&self.fingerprint_hash.to_le_bytes());
        out
    }

    /// Checks a stored header against `self`.
    fn verify(&self, stored: &[u8; HEADER_LEN as usize]) -> Result<()> {
        let mismatch = |found: String| VestaError::VersionMismatch {
            expected: self.describe(),
            found,
        };

        if stored[0..4] != MAGIC {
            return Err(mismatch(format!("magic {:02x?}", &stored[0..4])));
        }
        let word = |range: std::ops::Range<usize>| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&stored[range]);
            u32::from_le_bytes(buf)
        };
        let format = word(4..8);
        let generator = word(8..12);
        let mut fp = [0u8; 8];
        fp.copy_from_slice(&stored[12..20]);
        let fingerprint = u64::from_le_bytes(fp);

        if format != FORMAT_VERSION
            || generator != self.generator_version
            || fingerprint != self.fingerprint_hash
        {
            return Err(mismatch(format!(
                "format {format}, generator {generator}, driver {fingerprint:016x}"
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "format {FORMAT_VERSION}, generator {}, driver {:016x}",
            self.generator_version, self.fingerprint_hash
        )
    }
}

// ─── Read Pass ───────────────────────────────────────────────────────────────

/// Outcome of one sequential read pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Records handed to the handler.
    pub delivered: usize,
    /// Complete records skipped because their checksum failed.
    pub rejected: usize,
    /// End offset of the last complete record.
    pub valid_len: u64,
    /// The pass stopped at a record that was cut short.
    pub torn: bool,
}

enum Frame {
    Record { key: Vec<u8>, value: Vec<u8>, checksum: u32 },
    Torn,
}

/// Reads one record starting at `offset`, never past `end`.
fn read_frame<R: Read>(reader: &mut R, offset: u64, end: u64) -> io::Result<Frame> {
    let mut remaining = end - offset;

    let mut field = |reader: &mut R| -> io::Result<Option<Vec<u8>>> {
        let Some(len) = read_u32(reader, &mut remaining)? else {
            return Ok(None);
        };
        if len > MAX_FIELD_LEN || u64::from(len) > remaining {
            return Ok(None);
        }
        remaining -= u64::from(len);
        let mut buf = vec![0u8; len as usize];
        Ok(read_exact_or_eof(reader, &mut buf)?.then_some(buf))
    };

    let Some(key) = field(&mut *reader)? else {
        return Ok(Frame::Torn);
    };
    let Some(value) = field(&mut *reader)? else {
        return Ok(Frame::Torn);
    };
    let Some(checksum) = read_u32(reader, &mut remaining)? else {
        return Ok(Frame::Torn);
    };
    Ok(Frame::Record {
        key,
        value,
        checksum,
    })
}

fn read_u32<R: Read>(reader: &mut R, remaining: &mut u64) -> io::Result<Option<u32>> {
    if *remaining < 4 {
        return Ok(None);
    }
    *remaining -= 4;
    let mut buf = [0u8; 4];
    Ok(read_exact_or_eof(reader, &mut buf)?.then(|| u32::from_le_bytes(buf)))
}

/// `read_exact` that reports a file shorter than expected as `false`.
///
/// The owner may truncate the store under a snapshot reader; that has to
/// look like a torn tail, not an I/O failure.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

fn frame_len(key: &[u8], value: &[u8]) -> u64 {
    (12 + key.len() + value.len()) as u64
}

/// Delivers every valid record in `[HEADER_LEN, end)` of `file`.
fn read_records<F>(file: &File, end: u64, mut handler: F) -> io::Result<ReadSummary>
where
    F: FnMut(&[u8], &[u8]),
{
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(HEADER_LEN))?;

    let mut summary = ReadSummary {
        valid_len: HEADER_LEN,
        ..ReadSummary::default()
    };
    let mut offset = HEADER_LEN;

    while offset < end {
        match read_frame(&mut reader, offset, end)? {
            Frame::Torn => {
                log::warn!(
                    "{}",
                    VestaError::CorruptRecord {
                        offset,
                        reason: "record cut short"
                    }
                );
                summary.torn = true;
                break;
            }
            Frame::Record {
                key,
                value,
                checksum,
            } => {
                if checksum_parts(&[key.as_slice(), value.as_slice()]) == checksum {
                    handler(&key, &value);
                    summary.delivered += 1;
                } else {
                    log::warn!(
                        "{}",
                        VestaError::CorruptRecord {
                            offset,
                            reason: "checksum mismatch"
                        }
                    );
                    summary.rejected += 1;
                }
                offset += frame_len(&key, &value);
                summary.valid_len = offset;
            }
        }
    }

    Ok(summary)
}

/// Finds the end of the last complete frame without reading record bodies.
fn framed_end(file: &mut File, file_len: u64) -> io::Result<u64> {
    let mut offset = HEADER_LEN;
    loop {
        let mut cursor = offset;
        let mut fields_ok = true;
        for _ in 0..2 {
            if cursor + 4 > file_len {
                fields_ok = false;
                break;
            }
            file.seek(SeekFrom::Start(cursor))?;
            let mut buf = [0u8; 4];
            file.read_exact(&mut buf)?;
            let len = u32::from_le_bytes(buf);
            if len > MAX_FIELD_LEN {
                fields_ok = false;
                break;
            }
            cursor += 4 + u64::from(len);
        }
        if !fields_ok || cursor + 4 > file_len {
            return Ok(offset);
        }
        offset = cursor + 4;
    }
}

// ─── DiskCache ───────────────────────────────────────────────────────────────

/// An open store file.
#[derive(Debug)]
pub struct DiskCache {
    path: PathBuf,
    file: File,
    header: CacheHeader,
    /// End of the last complete record; appends land here.
    end: u64,
}

impl DiskCache {
    /// Opens or creates the store at `path`.
    ///
    /// A store written under a different header is discarded, and a torn
    /// tail is truncated.
    pub fn open(path: impl AsRef<Path>, header: CacheHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let mut cache = Self {
            path,
            file,
            header,
            end: HEADER_LEN,
        };

        if file_len == 0 {
            cache.reset()?;
            return Ok(cache);
        }

        if file_len < HEADER_LEN {
            log::info!(
                "Disk cache {} has a truncated header; starting empty",
                cache.path.display()
            );
            cache.reset()?;
            return Ok(cache);
        }

        let mut stored = [0u8; HEADER_LEN as usize];
        cache.file.seek(SeekFrom::Start(0))?;
        cache.file.read_exact(&mut stored)?;
        if let Err(err) = header.verify(&stored) {
            log::info!("{err}; discarding {}", cache.path.display());
            cache.reset()?;
            return Ok(cache);
        }

        cache.end = framed_end(&mut cache.file, file_len)?;
        if cache.end < file_len {
            log::warn!(
                "Disk cache {}: dropping {} bytes of torn tail",
                cache.path.display(),
                file_len - cache.end
            );
            cache.file.set_len(cache.end)?;
        }

        Ok(cache)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> CacheHeader {
        self.header
    }

    /// Byte length of the framed part of the file, header included.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end
    }

    /// No records stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == HEADER_LEN
    }

    /// Delivers every valid record to `handler`, in append order.
    ///
    /// Records failing their checksum are skipped and counted. If the pass
    /// stops at a torn record, the file is truncated at the last complete one.
    pub fn read_all<F>(&mut self, handler: F) -> Result<ReadSummary>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let summary = read_records(&self.file, self.end, handler)?;
        if summary.torn {
            self.file.set_len(summary.valid_len)?;
            self.end = summary.valid_len;
        }
        Ok(summary)
    }

    /// Appends one record and hands it to the OS before returning.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key_len = field_len(key)?;
        let value_len = field_len(value)?;

        let mut record = Vec::with_capacity(key.len() + value.len() + 12);
        record.extend_from_slice(&key_len.to_le_bytes());
        record.extend_from_slice(key);
        record.extend_from_slice(&value_len.to_le_bytes());
        record.extend_from_slice(value);
        record.extend_from_slice(&checksum_parts(&[key, value]).to_le_bytes());

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&record)?;
        self.file.flush()?;
        self.end += record.len() as u64;
        Ok(())
    }

    /// Syncs written records to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Drops every record and rewrites the header.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.encode())?;
        self.file.flush()?;
        self.end = HEADER_LEN;
        Ok(())
    }

    /// Read-only view of the records stored so far, for another thread.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            path: self.path.clone(),
            header: self.header,
            len: self.end,
        }
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        if let Err(err) = self.file.sync_data() {
            log::warn!(
                "Failed to sync disk cache {}: {err}",
                self.path.display()
            );
        }
    }
}

fn field_len(bytes: &[u8]) -> Result<u32> {
    u32::try_from(bytes.len())
        .ok()
        .filter(|&len| len <= MAX_FIELD_LEN)
        .ok_or_else(|| {
            VestaError::IoError(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record field of {} bytes exceeds the store limit", bytes.len()),
            ))
        })
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The records of a store up to a fixed length.
///
/// Reading opens the file separately and never writes, so it can run while
/// the owning [`DiskCache`] keeps appending past `len`.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    path: PathBuf,
    header: CacheHeader,
    len: u64,
}

impl StoreSnapshot {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delivers the snapshot's valid records to `handler`.
    ///
    /// A store whose header no longer matches yields nothing.
    pub fn read<F>(&self, handler: F) -> Result<ReadSummary>
    where
        F: FnMut(&[u8], &[u8]),
    {
        let mut file = File::open(&self.path)?;
        let mut stored = [0u8; HEADER_LEN as usize];
        if self.len < HEADER_LEN || file.read_exact(&mut stored).is_err() {
            return Ok(ReadSummary::default());
        }
        if let Err(err) = self.header.verify(&stored) {
            log::info!("{err}; snapshot of {} is stale", self.path.display());
            return Ok(ReadSummary::default());
        }
        read_records(&file, self.len, handler).map_err(VestaError::from)
    }
}
