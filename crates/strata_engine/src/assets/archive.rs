//! Solid-block resource archive
//!
//! Random-access reader and writer for `.spk` containers. Entries are packed
//! back to back into lz4-compressed "solid" blocks, so several small files
//! share one compressed stream. The reader keeps the last decoded block in a
//! per-handle cache; extracting neighbouring entries from the same block
//! inflates it only once.
//!
//! ## Layout (little-endian)
//!
//! ```text
//! header     magic "SPK7" | version u16 | flags u16 | block_count u32
//!            entry_count u32 | directory_offset u64 | directory_size u32
//!            directory_crc u32
//! blocks     lz4 block data, back to back
//! directory  block_count x { offset u64, packed_size u32, unpacked_size u32, crc u32 }
//!            entry_count x { name_len u16, name utf-8, block u32, offset u32, size u32 }
//! ```
//!
//! Block CRCs cover the decompressed bytes. Zero-length entries are stored
//! with block `u32::MAX` and no data.
//!
//! An [`Archive`] is not safe to extract from on two threads at once; each
//! handle owns its own decode cache, so separate handles never interfere.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

use crate::foundation::memory::{BufferAllocator, SystemAllocator};

use super::wire::ByteReader;

/// File signature
pub const ARCHIVE_MAGIC: [u8; 4] = *b"SPK7";

/// Current container version
pub const ARCHIVE_VERSION: u16 = 1;

/// Size of the fixed header
pub const ARCHIVE_HEADER_SIZE: usize = 32;

/// Default uncompressed size a solid block is filled up to
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

const BLOCK_RECORD_SIZE: usize = 20;
const EMPTY_ENTRY_BLOCK: u32 = u32::MAX;

/// Archive errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Underlying read/write failure
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the archive magic
    #[error("Invalid archive signature: {0:?}")]
    InvalidSignature([u8; 4]),

    /// The container version is not understood
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    /// A checksum did not match its data
    #[error("CRC mismatch in {what}: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Which region failed
        what: String,
        /// Stored checksum
        expected: u32,
        /// Checksum of the bytes read
        computed: u32,
    },

    /// The directory is structurally invalid
    #[error("Corrupt archive directory: {0}")]
    Corrupt(String),

    /// Entry index past the end of the directory
    #[error("Entry index {index} out of range ({count} entries)")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Entries in the archive
        count: usize,
    },

    /// A compressed block could not be inflated
    #[error("Failed to decode block {block}: {reason}")]
    Decode {
        /// Block index
        block: usize,
        /// Decoder message
        reason: String,
    },

    /// Builder input that cannot be represented in the format
    #[error("Invalid archive input: {0}")]
    InvalidInput(String),
}

/// Compressed block record from the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Absolute file offset of the compressed data
    pub offset: u64,
    /// Compressed size in bytes
    pub packed_size: u32,
    /// Decompressed size in bytes
    pub unpacked_size: u32,
    /// CRC-32 of the decompressed bytes
    pub crc: u32,
}

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated entry path
    pub name: String,
    /// Block holding the data; `None` for empty entries
    pub block: Option<u32>,
    /// Offset of the data inside the decompressed block
    pub offset: u32,
    /// Size of the data in bytes
    pub size: u32,
}

/// Counters for the decode-block cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Blocks read from disk and inflated
    pub blocks_decoded: u64,
    /// Extractions served from the already-decoded block
    pub cache_hits: u64,
    /// Total decompressed bytes produced
    pub bytes_inflated: u64,
}

/// Last decoded block
#[derive(Debug, Default)]
struct BlockCache {
    block_index: Option<usize>,
    out_buffer: Vec<u8>,
}

impl BlockCache {
    fn clear(&mut self) {
        self.block_index = None;
        self.out_buffer.clear();
    }
}

/// Open archive handle
#[derive(Debug)]
pub struct Archive<R = BufReader<File>> {
    reader: R,
    blocks: Vec<BlockInfo>,
    entries: Vec<ArchiveEntry>,
    by_name: HashMap<String, usize>,
    cache: BlockCache,
    stats: DecodeStats,
}

impl Archive<BufReader<File>> {
    /// Open an archive file and read its directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let archive = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "Opened archive {:?}: {} entries in {} blocks",
            path,
            archive.entries.len(),
            archive.blocks.len()
        );
        Ok(archive)
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Read the header and directory from any seekable source
    pub fn from_reader(mut reader: R) -> Result<Self, ArchiveError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; ARCHIVE_HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let mut cursor = ByteReader::new(&header);
        let magic = cursor.take(4).and_then(|m| <[u8; 4]>::try_from(m).ok()).unwrap_or_default();
        if magic != ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidSignature(magic));
        }
        let fields = (|| {
            Some((
                cursor.u16()?,
                cursor.u16()?,
                cursor.u32()?,
                cursor.u32()?,
                cursor.u64()?,
                cursor.u32()?,
                cursor.u32()?,
            ))
        })();
        let Some((version, _flags, block_count, entry_count, directory_offset, directory_size, directory_crc)) = fields
        else {
            return Err(ArchiveError::Corrupt("short header".to_string()));
        };
        if version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }

        let file_len = reader.seek(SeekFrom::End(0))?;
        let directory_end = directory_offset.checked_add(u64::from(directory_size));
        if directory_offset < ARCHIVE_HEADER_SIZE as u64 || directory_end.map_or(true, |end| end > file_len) {
            return Err(ArchiveError::Corrupt(format!(
                "directory at {directory_offset}+{directory_size} outside file of {file_len} bytes"
            )));
        }

        reader.seek(SeekFrom::Start(directory_offset))?;
        let mut directory = vec![0u8; directory_size as usize];
        reader.read_exact(&mut directory)?;
        let computed = crc32fast::hash(&directory);
        if computed != directory_crc {
            return Err(ArchiveError::CrcMismatch {
                what: "directory".to_string(),
                expected: directory_crc,
                computed,
            });
        }

        let (blocks, entries) = parse_directory(&directory, block_count, entry_count, directory_offset)?;
        let mut by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if by_name.insert(entry.name.clone(), index).is_some() {
                return Err(ArchiveError::Corrupt(format!("duplicate entry '{}'", entry.name)));
            }
        }

        Ok(Self {
            reader,
            blocks,
            entries,
            by_name,
            cache: BlockCache::default(),
            stats: DecodeStats::default(),
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of compressed blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Walk the directory in order, yielding `(name, index)`
    ///
    /// Every call starts again from the first entry.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.entries.iter().enumerate().map(|(index, entry)| (entry.name.as_str(), index))
    }

    /// Directory entries in order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Entry at `index`
    pub fn entry(&self, index: usize) -> Option<&ArchiveEntry> {
        self.entries.get(index)
    }

    /// Index of the entry called `name`
    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Decode-cache counters since open or the last reset
    pub const fn decode_stats(&self) -> DecodeStats {
        self.stats
    }

    /// Drop the cached block and zero the counters
    pub fn reset_block_cache(&mut self) {
        self.cache.clear();
        self.stats = DecodeStats::default();
    }

    /// Extract an entry into a freshly allocated heap buffer
    pub fn extract(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        self.extract_with(index, &SystemAllocator)
    }

    /// Extract an entry into a buffer obtained from `allocator`
    ///
    /// The caller owns the returned buffer and gives it back through the
    /// same allocator. When the entry lives in the block decoded by the
    /// previous extraction, the cached block is reused without touching
    /// the file.
    pub fn extract_with(&mut self, index: usize, allocator: &dyn BufferAllocator) -> Result<Vec<u8>, ArchiveError> {
        let entry = self.entries.get(index).ok_or(ArchiveError::IndexOutOfRange {
            index,
            count: self.entries.len(),
        })?;
        let Some(block) = entry.block else {
            return Ok(allocator.allocate(0));
        };
        let (block, start, size) = (block as usize, entry.offset as usize, entry.size as usize);

        self.ensure_block(block)?;

        let data = self
            .cache
            .out_buffer
            .get(start..start + size)
            .ok_or_else(|| ArchiveError::Corrupt(format!("entry {index} exceeds block {block}")))?;
        let mut buffer = allocator.allocate(size);
        buffer.copy_from_slice(data);
        Ok(buffer)
    }

    fn ensure_block(&mut self, block: usize) -> Result<(), ArchiveError> {
        if self.cache.block_index == Some(block) {
            self.stats.cache_hits += 1;
            return Ok(());
        }
        let info = *self.blocks.get(block).ok_or_else(|| ArchiveError::Corrupt(format!("no block {block}")))?;

        // Invalidate first so a failed decode never leaves a half-written block cached.
        self.cache.clear();

        self.reader.seek(SeekFrom::Start(info.offset))?;
        let mut packed = vec![0u8; info.packed_size as usize];
        self.reader.read_exact(&mut packed)?;

        self.cache.out_buffer.resize(info.unpacked_size as usize, 0);
        let written = lz4_flex::block::decompress_into(&packed, &mut self.cache.out_buffer).map_err(|e| {
            ArchiveError::Decode {
                block,
                reason: e.to_string(),
            }
        })?;
        if written != info.unpacked_size as usize {
            self.cache.clear();
            return Err(ArchiveError::Decode {
                block,
                reason: format!("expected {} bytes, got {written}", info.unpacked_size),
            });
        }
        let computed = crc32fast::hash(&self.cache.out_buffer);
        if computed != info.crc {
            self.cache.clear();
            return Err(ArchiveError::CrcMismatch {
                what: format!("block {block}"),
                expected: info.crc,
                computed,
            });
        }

        self.cache.block_index = Some(block);
        self.stats.blocks_decoded += 1;
        self.stats.bytes_inflated += u64::from(info.unpacked_size);
        log::debug!("Decoded block {} ({} -> {} bytes)", block, info.packed_size, info.unpacked_size);
        Ok(())
    }
}

/// Largest ratio an lz4 block can inflate by
const LZ4_MAX_EXPANSION: u64 = 255;

fn parse_directory(
    directory: &[u8],
    block_count: u32,
    entry_count: u32,
    blocks_end: u64,
) -> Result<(Vec<BlockInfo>, Vec<ArchiveEntry>), ArchiveError> {
    let truncated = || ArchiveError::Corrupt("directory truncated".to_string());
    let mut cursor = ByteReader::new(directory);

    let block_count = block_count as usize;
    if block_count.saturating_mul(BLOCK_RECORD_SIZE) > directory.len() {
        return Err(truncated());
    }
    let mut blocks = Vec::with_capacity(block_count);
    for index in 0..block_count {
        let info = BlockInfo {
            offset: cursor.u64().ok_or_else(truncated)?,
            packed_size: cursor.u32().ok_or_else(truncated)?,
            unpacked_size: cursor.u32().ok_or_else(truncated)?,
            crc: cursor.u32().ok_or_else(truncated)?,
        };
        let end = info.offset.checked_add(u64::from(info.packed_size));
        if info.offset < ARCHIVE_HEADER_SIZE as u64 || end.map_or(true, |end| end > blocks_end) {
            return Err(ArchiveError::Corrupt(format!("block {index} lies outside the data region")));
        }
        if u64::from(info.unpacked_size) > u64::from(info.packed_size) * LZ4_MAX_EXPANSION {
            return Err(ArchiveError::Corrupt(format!(
                "block {index} claims {} unpacked bytes from {} packed",
                info.unpacked_size, info.packed_size
            )));
        }
        blocks.push(info);
    }

    let mut entries = Vec::new();
    for index in 0..entry_count {
        let name_len = cursor.u16().ok_or_else(truncated)?;
        let name_bytes = cursor.take(usize::from(name_len)).ok_or_else(truncated)?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| ArchiveError::Corrupt(format!("entry {index} name is not UTF-8")))?
            .to_string();
        let block = cursor.u32().ok_or_else(truncated)?;
        let offset = cursor.u32().ok_or_else(truncated)?;
        let size = cursor.u32().ok_or_else(truncated)?;

        let block = if block == EMPTY_ENTRY_BLOCK {
            if size != 0 {
                return Err(ArchiveError::Corrupt(format!("entry '{name}' has data but no block")));
            }
            None
        } else {
            let info = blocks
                .get(block as usize)
                .ok_or_else(|| ArchiveError::Corrupt(format!("entry '{name}' names missing block {block}")))?;
            if u64::from(offset) + u64::from(size) > u64::from(info.unpacked_size) {
                return Err(ArchiveError::Corrupt(format!("entry '{name}' exceeds block {block}")));
            }
            Some(block)
        };
        entries.push(ArchiveEntry { name, block, offset, size });
    }

    if cursor.position() != directory.len() {
        return Err(ArchiveError::Corrupt(format!(
            "{} trailing directory bytes",
            directory.len() - cursor.position()
        )));
    }
    Ok((blocks, entries))
}

/// Writer for the archive format
///
/// Entries keep their insertion order. Consecutive entries are packed into
/// one solid block until adding the next would push it past the block
/// size; an entry larger than the block size gets a block of its own.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    block_size: usize,
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    /// Builder with [`DEFAULT_BLOCK_SIZE`]
    pub fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            entries: Vec::new(),
        }
    }

    /// Set the solid block size in uncompressed bytes
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue an entry
    pub fn add(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.push((name.into(), data.into()));
        self
    }

    /// Queue every file under `root`, named by its `/`-separated relative path
    ///
    /// Files are added in sorted path order. Returns the number added.
    pub fn add_directory(&mut self, root: impl AsRef<Path>) -> Result<usize, ArchiveError> {
        let root = root.as_ref();
        let mut files = Vec::new();
        collect_files(root, root, &mut files)?;
        files.sort();
        let count = files.len();
        for name in files {
            let data = std::fs::read(root.join(&name))?;
            self.add(name, data);
        }
        Ok(count)
    }

    /// Write the archive to `path`
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        log::info!("Wrote archive {:?} with {} entries", path, self.entries.len());
        Ok(())
    }

    /// Serialize the archive into `writer`
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), ArchiveError> {
        let mut seen = std::collections::HashSet::new();
        for (name, data) in &self.entries {
            if name.is_empty() || name.len() > usize::from(u16::MAX) {
                return Err(ArchiveError::InvalidInput(format!("bad entry name length {}", name.len())));
            }
            if !seen.insert(name.as_str()) {
                return Err(ArchiveError::InvalidInput(format!("duplicate entry '{name}'")));
            }
            if u32::try_from(data.len()).is_err() {
                return Err(ArchiveError::InvalidInput(format!("entry '{name}' is too large")));
            }
        }

        // Assign entries to solid blocks.
        let mut raw_blocks: Vec<Vec<u8>> = Vec::new();
        let mut placements = Vec::with_capacity(self.entries.len());
        let mut current: Vec<u8> = Vec::new();
        for (_, data) in &self.entries {
            if data.is_empty() {
                placements.push((EMPTY_ENTRY_BLOCK, 0u32));
                continue;
            }
            let fits = current.len() + data.len() <= self.block_size;
            let fits_u32 = u32::try_from(current.len() + data.len()).is_ok();
            if !current.is_empty() && !(fits && fits_u32) {
                raw_blocks.push(std::mem::take(&mut current));
            }
            let block = u32::try_from(raw_blocks.len())
                .map_err(|_| ArchiveError::InvalidInput("too many blocks".to_string()))?;
            placements.push((block, current.len() as u32));
            current.extend_from_slice(data);
        }
        if !current.is_empty() {
            raw_blocks.push(current);
        }

        let mut directory = Vec::new();
        let mut offset = ARCHIVE_HEADER_SIZE as u64;
        let mut packed_blocks = Vec::with_capacity(raw_blocks.len());
        for raw in &raw_blocks {
            let packed = lz4_flex::block::compress(raw);
            directory.extend_from_slice(&offset.to_le_bytes());
            directory.extend_from_slice(&(packed.len() as u32).to_le_bytes());
            directory.extend_from_slice(&(raw.len() as u32).to_le_bytes());
            directory.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
            offset += packed.len() as u64;
            packed_blocks.push(packed);
        }
        for ((name, data), (block, block_offset)) in self.entries.iter().zip(&placements) {
            directory.extend_from_slice(&(name.len() as u16).to_le_bytes());
            directory.extend_from_slice(name.as_bytes());
            directory.extend_from_slice(&block.to_le_bytes());
            directory.extend_from_slice(&block_offset.to_le_bytes());
            directory.extend_from_slice(&(data.len() as u32).to_le_bytes());
        }

        let directory_size = u32::try_from(directory.len())
            .map_err(|_| ArchiveError::InvalidInput("directory too large".to_string()))?;
        let entry_count = u32::try_from(self.entries.len())
            .map_err(|_| ArchiveError::InvalidInput("too many entries".to_string()))?;

        let mut header = Vec::with_capacity(ARCHIVE_HEADER_SIZE);
        header.extend_from_slice(&ARCHIVE_MAGIC);
        header.extend_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&(packed_blocks.len() as u32).to_le_bytes());
        header.extend_from_slice(&entry_count.to_le_bytes());
        header.extend_from_slice(&offset.to_le_bytes());
        header.extend_from_slice(&directory_size.to_le_bytes());
        header.extend_from_slice(&crc32fast::hash(&directory).to_le_bytes());
        debug_assert_eq!(header.len(), ARCHIVE_HEADER_SIZE);

        writer.write_all(&header)?;
        for packed in &packed_blocks {
            writer.write_all(packed)?;
        }
        writer.write_all(&directory)?;
        log::debug!(
            "Packed {} entries into {} blocks ({} bytes of directory)",
            self.entries.len(),
            packed_blocks.len(),
            directory.len()
        );
        Ok(())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), ArchiveError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(name);
        }
    }
    Ok(())
}
