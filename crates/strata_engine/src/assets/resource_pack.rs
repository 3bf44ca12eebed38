//! Resource Pack - named resource cache with LRU eviction
//!
//! A [`ResourcePack`] exposes a directory or a compressed archive as a flat
//! namespace of `/`-separated resource names. Loaded files stay resident in
//! an ordered map, and a priority list tracks use from most to least
//! recent.
//!
//! ## Memory budget
//!
//! Loads never evict. A load that pushes memory use over the budget only
//! logs a warning, and [`ResourcePack::purge_unused`] reclaims memory by
//! evicting least-recently-used, unpinned files until use is back under the
//! limit. Callers run it periodically (once per frame, or after a batch of
//! loads) since nothing else evicts.
//!
//! ## Ownership
//!
//! File buffers come from the pack's [`BufferAllocator`] and go back to it
//! when a file is purged or the pack is dropped. References returned by
//! [`ResourcePack::load_file`] borrow the pack, so a file cannot be purged
//! while one is held.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::ResourceConfig;
use crate::foundation::collections::{PriorityKey, PriorityList};
use crate::foundation::memory::{BufferAllocator, SystemAllocator};
use crate::render::primitives::Mesh;

use super::archive::{Archive, ArchiveError, DecodeStats};
use super::image_loader::ImageData;
use super::mesh_codec::{self, MeshCodecError};
use super::AssetError;

/// Resource pack errors
#[derive(Error, Debug)]
pub enum PackError {
    /// Filesystem failure while opening or reading
    #[error("Resource pack I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory pack path is not a directory
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// No resource with this name exists in the backing store
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The backing archive failed
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A mesh resource failed to decode
    #[error("Mesh decode error: {0}")]
    Mesh(#[from] MeshCodecError),

    /// A texture resource failed to decode
    #[error("Texture error: {0}")]
    Texture(#[from] AssetError),

    /// The pack has been closed
    #[error("Resource pack is closed")]
    Closed,
}

/// A resident resource
#[derive(Debug)]
pub struct ResourceFile {
    name: String,
    data: Vec<u8>,
    archive_index: Option<usize>,
    pinned: bool,
    priority_key: PriorityKey,
}

impl ResourceFile {
    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Directory index in the backing archive, for archive packs
    pub const fn archive_index(&self) -> Option<usize> {
        self.archive_index
    }

    /// Whether `purge_unused` skips this file
    pub const fn is_pinned(&self) -> bool {
        self.pinned
    }
}

/// Cache counters since the pack was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackStats {
    /// Loads served from memory
    pub hits: u64,
    /// Loads that read the backing store
    pub misses: u64,
    /// Bytes read from the backing store
    pub bytes_read: u64,
    /// Files evicted by `purge_unused`
    pub evictions: u64,
}

enum Backing {
    Directory(PathBuf),
    Archive(Box<Archive>),
    Closed,
}

/// Named resource cache over a directory or archive
pub struct ResourcePack {
    path: PathBuf,
    backing: Backing,
    files: BTreeMap<String, ResourceFile>,
    priority: PriorityList<String>,
    memory_used: usize,
    memory_limit: usize,
    allocator: Arc<dyn BufferAllocator>,
    stats: PackStats,
}

impl ResourcePack {
    /// Open a pack with the system allocator
    ///
    /// `compressed` selects an archive file instead of a directory.
    /// A `memory_limit` of 0 disables the budget.
    pub fn open(path: impl AsRef<Path>, compressed: bool, memory_limit: usize) -> Result<Self, PackError> {
        Self::open_with_allocator(path, compressed, memory_limit, SystemAllocator::shared())
    }

    /// Open a pack described by a [`ResourceConfig`]
    pub fn from_config(config: &ResourceConfig, allocator: Arc<dyn BufferAllocator>) -> Result<Self, PackError> {
        Self::open_with_allocator(&config.pack_path, config.compressed, config.memory_limit_bytes, allocator)
    }

    /// Open a pack whose buffers come from `allocator`
    pub fn open_with_allocator(
        path: impl AsRef<Path>,
        compressed: bool,
        memory_limit: usize,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let backing = if compressed {
            Backing::Archive(Box::new(Archive::open(&path)?))
        } else {
            if !std::fs::metadata(&path)?.is_dir() {
                return Err(PackError::NotADirectory(path));
            }
            Backing::Directory(path.clone())
        };

        log::info!(
            "Opened {} resource pack {:?} (budget: {} bytes)",
            if compressed { "archive" } else { "directory" },
            path,
            memory_limit
        );

        Ok(Self {
            path,
            backing,
            files: BTreeMap::new(),
            priority: PriorityList::new(),
            memory_used: 0,
            memory_limit,
            allocator,
            stats: PackStats::default(),
        })
    }

    /// Path the pack was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the pack reads from an archive
    pub const fn is_compressed(&self) -> bool {
        matches!(self.backing, Backing::Archive(_))
    }

    /// Whether [`close`](Self::close) has been called
    pub const fn is_closed(&self) -> bool {
        matches!(self.backing, Backing::Closed)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Return a resource, reading it from the backing store on first use
    ///
    /// A cached file is moved to the most-recently-used position and
    /// returned without I/O. Otherwise the bytes are read (or extracted),
    /// cached at the front of the priority list and counted against the
    /// budget.
    pub fn load_file(&mut self, name: &str) -> Result<&ResourceFile, PackError> {
        if let Some(key) = self.files.get(name).map(|file| file.priority_key) {
            self.priority.move_to_front(key);
            self.stats.hits += 1;
            log::trace!("Cache hit: {}", name);
            return self.files.get(name).ok_or_else(|| PackError::NotFound(name.to_string()));
        }

        let (data, archive_index) = read_from_backing(&mut self.backing, self.allocator.as_ref(), name)?;
        let size = data.len();

        self.stats.misses += 1;
        self.stats.bytes_read += size as u64;
        self.memory_used += size;
        let priority_key = self.priority.push_front(name.to_string());

        log::debug!("Loaded resource '{}' ({} bytes, {} resident)", name, size, self.memory_used);
        if self.is_over_budget() {
            log::warn!(
                "Resource pack {:?} over budget: {} of {} bytes used",
                self.path,
                self.memory_used,
                self.memory_limit
            );
        }

        let file = ResourceFile {
            name: name.to_string(),
            data,
            archive_index,
            pinned: false,
            priority_key,
        };
        Ok(self.files.entry(name.to_string()).or_insert(file))
    }

    /// Load and decode a mesh resource
    pub fn load_mesh(&mut self, name: &str) -> Result<Mesh, PackError> {
        let file = self.load_file(name)?;
        Ok(mesh_codec::decode(file.data())?)
    }

    /// Load and decode a texture resource to RGBA8
    pub fn load_texture(&mut self, name: &str) -> Result<ImageData, PackError> {
        let file = self.load_file(name)?;
        Ok(ImageData::from_bytes(file.data())?)
    }

    /// Whether the backing store has a resource called `name`
    pub fn contains(&self, name: &str) -> bool {
        if self.files.contains_key(name) {
            return true;
        }
        match &self.backing {
            Backing::Directory(root) => resource_path(root, name).is_some_and(|path| path.is_file()),
            Backing::Archive(archive) => archive.find(name).is_some(),
            Backing::Closed => false,
        }
    }

    /// Whether `name` is resident
    pub fn is_loaded(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Names of resources the pack knows about
    ///
    /// The full directory for archive packs; the resident files for
    /// directory packs.
    pub fn file_names(&self) -> Vec<String> {
        match &self.backing {
            Backing::Archive(archive) => archive.iter().map(|(name, _)| name.to_string()).collect(),
            Backing::Directory(_) | Backing::Closed => self.files.keys().cloned().collect(),
        }
    }

    // ------------------------------------------------------------------
    // Pinning
    // ------------------------------------------------------------------

    /// Load `name` if needed and keep it resident through `purge_unused`
    pub fn pin(&mut self, name: &str) -> Result<(), PackError> {
        self.load_file(name)?;
        if let Some(file) = self.files.get_mut(name) {
            file.pinned = true;
        }
        Ok(())
    }

    /// Make a pinned file evictable again. Returns false if not resident.
    pub fn unpin(&mut self, name: &str) -> bool {
        self.files.get_mut(name).map_or(false, |file| {
            file.pinned = false;
            true
        })
    }

    // ------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------

    /// Evict least-recently-used unpinned files until within budget
    ///
    /// Stops once memory use is at or below the limit or no evictable file
    /// is left. Does nothing without a budget. Returns the number evicted.
    pub fn purge_unused(&mut self) -> usize {
        if self.memory_limit == 0 {
            return 0;
        }
        let mut evicted = 0;
        let mut cursor = self.priority.back();
        while self.memory_used > self.memory_limit {
            let Some(key) = cursor else {
                break;
            };
            cursor = self.priority.prev(key);

            let Some(name) = self.priority.get(key).cloned() else {
                continue;
            };
            if self.files.get(&name).is_some_and(ResourceFile::is_pinned) {
                continue;
            }
            if self.remove_file(&name) {
                self.stats.evictions += 1;
                evicted += 1;
            }
        }

        if evicted > 0 {
            log::debug!(
                "Purged {} resources, {} of {} bytes resident",
                evicted,
                self.memory_used,
                self.memory_limit
            );
        }
        if self.is_over_budget() {
            log::warn!("Resource pack {:?} still over budget after purge (pinned files)", self.path);
        }
        evicted
    }

    /// Remove one file, pinned or not. Returns false if it was not resident.
    pub fn purge_file(&mut self, name: &str) -> bool {
        let removed = self.remove_file(name);
        if removed {
            log::debug!("Purged resource '{}'", name);
        }
        removed
    }

    /// Remove every resident file. Returns the number removed.
    pub fn purge_all(&mut self) -> usize {
        let count = self.files.len();
        for (_, file) in std::mem::take(&mut self.files) {
            self.allocator.release(file.data);
        }
        self.priority.clear();
        self.memory_used = 0;
        if count > 0 {
            log::debug!("Purged all {} resources from {:?}", count, self.path);
        }
        count
    }

    /// Purge everything and release the backing store
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.purge_all();
        self.backing = Backing::Closed;
        log::info!("Closed resource pack {:?}", self.path);
    }

    fn remove_file(&mut self, name: &str) -> bool {
        let Some(file) = self.files.remove(name) else {
            return false;
        };
        self.priority.remove(file.priority_key);
        self.memory_used -= file.data.len();
        log::trace!("Evicted '{}' ({} bytes)", name, file.data.len());
        self.allocator.release(file.data);
        true
    }

    // ------------------------------------------------------------------
    // Budget and statistics
    // ------------------------------------------------------------------

    /// Bytes held by resident files
    pub const fn memory_used(&self) -> usize {
        self.memory_used
    }

    /// Budget in bytes (0 = unlimited)
    pub const fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Change the budget; takes effect on the next purge
    pub fn set_memory_limit(&mut self, limit: usize) {
        self.memory_limit = limit;
    }

    /// Whether resident files exceed the budget
    pub const fn is_over_budget(&self) -> bool {
        self.memory_limit != 0 && self.memory_used > self.memory_limit
    }

    /// Number of resident files
    pub fn loaded_count(&self) -> usize {
        self.files.len()
    }

    /// Cache counters
    pub const fn stats(&self) -> PackStats {
        self.stats
    }

    /// Decode-block cache counters of the backing archive
    pub fn archive_decode_stats(&self) -> Option<DecodeStats> {
        match &self.backing {
            Backing::Archive(archive) => Some(archive.decode_stats()),
            _ => None,
        }
    }

    /// Resident names from least to most recently used
    pub fn lru_order(&self) -> Vec<&str> {
        self.priority.iter_lru().map(|(_, name)| name.as_str()).collect()
    }
}

impl Drop for ResourcePack {
    fn drop(&mut self) {
        self.purge_all();
    }
}

impl std::fmt::Debug for ResourcePack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePack")
            .field("path", &self.path)
            .field("compressed", &self.is_compressed())
            .field("loaded", &self.files.len())
            .field("memory_used", &self.memory_used)
            .field("memory_limit", &self.memory_limit)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Map a resource name to a path under `root`
///
/// Names are relative and `/`-separated; empty, `.` and `..` components
/// are refused.
fn resource_path(root: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.starts_with('/') || name.contains('\\') {
        return None;
    }
    let mut path = root.to_path_buf();
    for component in name.split('/') {
        if component.is_empty() || component == "." || component == ".." || component.contains(':') {
            return None;
        }
        path.push(component);
    }
    Some(path)
}

fn read_from_backing(
    backing: &mut Backing,
    allocator: &dyn BufferAllocator,
    name: &str,
) -> Result<(Vec<u8>, Option<usize>), PackError> {
    match backing {
        Backing::Directory(root) => {
            let path = resource_path(root, name).ok_or_else(|| PackError::NotFound(name.to_string()))?;
            let mut file = File::open(&path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PackError::NotFound(name.to_string()),
                _ => PackError::Io(e),
            })?;
            if !file.metadata()?.is_file() {
                return Err(PackError::NotFound(name.to_string()));
            }
            let len = usize::try_from(file.metadata()?.len())
                .map_err(|_| PackError::Io(std::io::Error::other(format!("'{name}' too large"))))?;
            let mut buffer = allocator.allocate(len);
            if let Err(e) = file.read_exact(&mut buffer) {
                allocator.release(buffer);
                return Err(PackError::Io(e));
            }
            Ok((buffer, None))
        }
        Backing::Archive(archive) => {
            let index = archive.find(name).ok_or_else(|| PackError::NotFound(name.to_string()))?;
            let buffer = archive.extract_with(index, allocator)?;
            Ok((buffer, Some(index)))
        }
        Backing::Closed => Err(PackError::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::memory::TrackingAllocator;

    const MB: usize = 1024 * 1024;

    fn temp_dir(tag: &str) -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("strata_pack_{tag}_{id}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn pack_with_files(tag: &str, files: &[(&str, usize)], limit: usize) -> (ResourcePack, PathBuf, Arc<TrackingAllocator>) {
        let dir = temp_dir(tag);
        for (name, size) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, vec![0xAB; *size]).unwrap();
        }
        let allocator = Arc::new(TrackingAllocator::new());
        let pack = ResourcePack::open_with_allocator(&dir, false, limit, allocator.clone()).unwrap();
        (pack, dir, allocator)
    }

    #[test]
    fn test_second_load_is_a_cache_hit() {
        let (mut pack, dir, _) = pack_with_files("hit", &[("a.bin", 16)], 0);

        assert_eq!(pack.load_file("a.bin").unwrap().size(), 16);
        std::fs::write(dir.join("a.bin"), vec![0u8; 4]).unwrap();

        let file = pack.load_file("a.bin").unwrap();
        assert_eq!(file.size(), 16);
        assert_eq!(file.data()[0], 0xAB);

        let stats = pack.stats();
        assert_eq!((stats.hits, stats.misses, stats.bytes_read), (1, 1, 16));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_purge_evicts_least_recently_used_first() {
        let (mut pack, dir, allocator) =
            pack_with_files("lru", &[("a", 4 * MB), ("b", 4 * MB), ("c", 4 * MB)], 10 * MB);

        pack.load_file("a").unwrap();
        pack.load_file("b").unwrap();
        pack.load_file("c").unwrap();
        assert_eq!(pack.memory_used(), 12 * MB);
        assert!(pack.is_over_budget());

        assert_eq!(pack.purge_unused(), 1);
        assert!(!pack.is_loaded("a"));
        assert!(pack.is_loaded("b") && pack.is_loaded("c"));
        assert_eq!(pack.memory_used(), 8 * MB);
        assert_eq!(allocator.stats().live_bytes, 8 * MB);
        assert_eq!(pack.stats().evictions, 1);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_touch_moves_file_to_front() {
        let (mut pack, dir, _) = pack_with_files("touch", &[("a", 40), ("b", 40), ("c", 40)], 100);

        pack.load_file("a").unwrap();
        pack.load_file("b").unwrap();
        pack.load_file("c").unwrap();
        pack.load_file("a").unwrap();
        assert_eq!(pack.lru_order(), ["b", "c", "a"]);

        pack.purge_unused();
        assert!(!pack.is_loaded("b"));
        assert!(pack.is_loaded("a"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_pinned_files_survive_purge_unused() {
        let (mut pack, dir, _) = pack_with_files("pin", &[("a", 40), ("b", 40), ("c", 40)], 50);

        pack.pin("a").unwrap();
        pack.load_file("b").unwrap();
        pack.load_file("c").unwrap();

        assert_eq!(pack.purge_unused(), 2);
        assert!(pack.is_loaded("a"));
        assert_eq!(pack.memory_used(), 40);

        assert!(pack.purge_file("a"));
        assert!(!pack.is_loaded("a"));
        assert!(!pack.unpin("a"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_purge_without_budget_is_noop() {
        let (mut pack, dir, _) = pack_with_files("nobudget", &[("a", 64)], 0);
        pack.load_file("a").unwrap();
        assert!(!pack.is_over_budget());
        assert_eq!(pack.purge_unused(), 0);
        assert!(pack.is_loaded("a"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_purge_all_and_drop_release_buffers() {
        let (mut pack, dir, allocator) = pack_with_files("all", &[("a", 10), ("sub/b", 20)], 0);
        pack.load_file("a").unwrap();
        pack.load_file("sub/b").unwrap();
        assert_eq!(allocator.stats().live_bytes, 30);

        assert_eq!(pack.purge_all(), 2);
        assert_eq!(pack.memory_used(), 0);
        assert_eq!(allocator.stats().live_bytes, 0);

        pack.load_file("a").unwrap();
        drop(pack);
        assert_eq!(allocator.stats().live_bytes, 0);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_and_unsafe_names_not_found() {
        let (mut pack, dir, _) = pack_with_files("names", &[("a", 1)], 0);
        for name in ["missing", "../a", "/a", "sub//a", "./a", ""] {
            assert!(
                matches!(pack.load_file(name), Err(PackError::NotFound(_))),
                "{name:?} should not resolve"
            );
        }
        assert!(pack.contains("a"));
        assert!(!pack.contains("../a"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_open_failures() {
        let missing = std::env::temp_dir().join("strata_pack_definitely_missing");
        assert!(matches!(ResourcePack::open(&missing, false, 0), Err(PackError::Io(_))));

        let dir = temp_dir("badarchive");
        let file = dir.join("not_an_archive.spk");
        std::fs::write(&file, vec![0u8; 64]).unwrap();
        assert!(matches!(
            ResourcePack::open(&file, true, 0),
            Err(PackError::Archive(ArchiveError::InvalidSignature(_)))
        ));
        assert!(matches!(ResourcePack::open(&file, false, 0), Err(PackError::NotADirectory(_))));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_closed_pack_refuses_loads() {
        let (mut pack, dir, _) = pack_with_files("closed", &[("a", 8)], 0);
        pack.load_file("a").unwrap();
        pack.close();
        assert!(pack.is_closed());
        assert_eq!(pack.loaded_count(), 0);
        assert!(matches!(pack.load_file("a"), Err(PackError::Closed)));
        std::fs::remove_dir_all(dir).ok();
    }
}
