//! Asset management system
//!
//! Everything between bytes on disk and drawable data:
//!
//! - [`archive`]: solid-block compressed archive reader and writer
//! - [`resource_pack`]: named resource cache with LRU eviction under a budget
//! - [`mesh_codec`]: binary mesh format encode/decode
//! - [`image_loader`]: texture decoding to RGBA8

pub mod archive;
pub mod image_loader;
pub mod mesh_codec;
pub mod resource_pack;

mod wire;

pub use archive::{Archive, ArchiveBuilder, ArchiveEntry, ArchiveError, BlockInfo, DecodeStats};
pub use image_loader::ImageData;
pub use mesh_codec::MeshCodecError;
pub use resource_pack::{PackError, PackStats, ResourceFile, ResourcePack};

use thiserror::Error;

/// Asset decoding errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Encoded data could not be decoded
    #[error("Failed to decode asset: {0}")]
    Decode(String),

    /// Data could not be encoded
    #[error("Failed to encode asset: {0}")]
    Encode(String),

    /// In-memory asset data is inconsistent
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
