//! Binary mesh codec (`.m` files)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ HEADER (12 bytes)                                            │
//! │  signature:u32  version:u16  total_size:u32  chunk_count:u16 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CHUNK DESCRIPTORS (40 bytes each)                            │
//! │  layout_hash:u16  vertex_stride:u16  index_width:u8          │
//! │  attribute_count:u8  attributes:[semantic:u8 comps:u8; 8]    │
//! │  option_flags:u16  vertex_count:u32  index_count:u32         │
//! │  material_index:u32  reserved:u32                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ VERTEX DATA (every chunk's f32 components, in chunk order)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ INDEX DATA (every chunk's indices at its recorded width)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All values are little-endian. Decoding checks the signature and version
//! before any size field is trusted, and builds the whole mesh before handing
//! it out, so a rejected buffer never leaves a half-filled mesh behind.

use thiserror::Error;

use super::wire::ByteReader;
use crate::render::primitives::{
    ChunkFlags, IndexWidth, Mesh, MeshChunk, VertexAttribute, VertexLayout, VertexSemantic,
    MAX_VERTEX_ATTRIBUTES,
};

/// File signature: `"SMSH"`
pub const MESH_SIGNATURE: u32 = u32::from_le_bytes(*b"SMSH");

/// Current format version
pub const MESH_VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 12;

/// Size of one chunk descriptor in bytes
pub const CHUNK_DESCRIPTOR_SIZE: usize = 40;

/// Errors raised while encoding or decoding meshes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshCodecError {
    /// The buffer does not start with the mesh signature
    #[error("Invalid mesh signature: {0:#010x}")]
    BadSignature(u32),

    /// The buffer was written by an unknown format version
    #[error("Unsupported mesh version: {0}")]
    UnsupportedVersion(u16),

    /// The buffer is shorter than its header or tables claim
    #[error("Mesh data truncated: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// The size recorded in the header disagrees with the buffer or the chunk table
    #[error("Mesh size mismatch: header says {recorded} bytes, computed {computed}")]
    SizeMismatch {
        /// Size recorded in the header
        recorded: usize,
        /// Size derived from the buffer or chunk table
        computed: usize,
    },

    /// A chunk descriptor or chunk payload is malformed
    #[error("Invalid chunk {chunk}: {reason}")]
    InvalidChunk {
        /// Chunk position within the mesh
        chunk: usize,
        /// What was wrong
        reason: String,
    },

    /// The mesh cannot be represented by the format
    #[error("Mesh too large to encode: {0}")]
    TooLarge(String),
}

fn invalid(chunk: usize, reason: impl Into<String>) -> MeshCodecError {
    MeshCodecError::InvalidChunk {
        chunk,
        reason: reason.into(),
    }
}

/// Exact number of bytes [`encode`] produces for `mesh`
pub fn encode_size(mesh: &Mesh) -> usize {
    HEADER_SIZE
        + mesh.chunks.len() * CHUNK_DESCRIPTOR_SIZE
        + mesh
            .chunks
            .iter()
            .map(|chunk| {
                chunk.vertex_count() * chunk.layout.stride()
                    + chunk.index_count() * chunk.index_width().bytes()
            })
            .sum::<usize>()
}

fn validate_for_encode(index: usize, chunk: &MeshChunk) -> Result<(), MeshCodecError> {
    let per_vertex = chunk.layout.components_per_vertex();
    if per_vertex == 0 && !chunk.vertices.is_empty() {
        return Err(invalid(index, "vertex data without a vertex layout"));
    }
    if per_vertex != 0 && chunk.vertices.len() % per_vertex != 0 {
        return Err(invalid(
            index,
            format!("{} floats is not a multiple of {per_vertex}", chunk.vertices.len()),
        ));
    }
    let vertex_count = chunk.vertex_count();
    if u32::try_from(vertex_count).is_err() || u32::try_from(chunk.index_count()).is_err() {
        return Err(MeshCodecError::TooLarge(format!("chunk {index} element count exceeds u32")));
    }
    if let Some(bad) = chunk.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(invalid(index, format!("index {bad} out of range for {vertex_count} vertices")));
    }
    Ok(())
}

/// Serialize a mesh into the binary format
pub fn encode(mesh: &Mesh) -> Result<Vec<u8>, MeshCodecError> {
    let chunk_count = u16::try_from(mesh.chunks.len())
        .map_err(|_| MeshCodecError::TooLarge(format!("{} chunks", mesh.chunks.len())))?;
    for (index, chunk) in mesh.chunks.iter().enumerate() {
        validate_for_encode(index, chunk)?;
    }

    let total_size = encode_size(mesh);
    let total_size_u32 = u32::try_from(total_size)
        .map_err(|_| MeshCodecError::TooLarge(format!("{total_size} bytes")))?;

    let mut out = Vec::with_capacity(total_size);
    out.extend_from_slice(&MESH_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&MESH_VERSION.to_le_bytes());
    out.extend_from_slice(&total_size_u32.to_le_bytes());
    out.extend_from_slice(&chunk_count.to_le_bytes());

    for chunk in &mesh.chunks {
        let attributes = chunk.layout.attributes();
        out.extend_from_slice(&chunk.layout.layout_hash().to_le_bytes());
        out.extend_from_slice(&(chunk.layout.stride() as u16).to_le_bytes());
        out.push(chunk.index_width().bytes() as u8);
        out.push(attributes.len() as u8);
        for slot in 0..MAX_VERTEX_ATTRIBUTES {
            match attributes.get(slot) {
                Some(attribute) => out.extend_from_slice(&[attribute.semantic as u8, attribute.components]),
                None => out.extend_from_slice(&[0, 0]),
            }
        }
        out.extend_from_slice(&chunk.flags.bits().to_le_bytes());
        out.extend_from_slice(&(chunk.vertex_count() as u32).to_le_bytes());
        out.extend_from_slice(&(chunk.index_count() as u32).to_le_bytes());
        out.extend_from_slice(&chunk.material_index.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    for chunk in &mesh.chunks {
        let whole = chunk.vertex_count() * chunk.layout.components_per_vertex();
        for value in &chunk.vertices[..whole] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    for chunk in &mesh.chunks {
        match chunk.index_width() {
            IndexWidth::U8 => out.extend(chunk.indices.iter().map(|&i| i as u8)),
            IndexWidth::U16 => {
                for &i in &chunk.indices {
                    out.extend_from_slice(&(i as u16).to_le_bytes());
                }
            }
            IndexWidth::U32 => {
                for &i in &chunk.indices {
                    out.extend_from_slice(&i.to_le_bytes());
                }
            }
        }
    }

    debug_assert_eq!(out.len(), total_size);
    Ok(out)
}

struct ChunkDescriptor {
    layout: VertexLayout,
    index_width: IndexWidth,
    flags: ChunkFlags,
    vertex_count: usize,
    index_count: usize,
    material_index: u32,
}

fn read_descriptor(index: usize, reader: &mut ByteReader<'_>) -> Result<ChunkDescriptor, MeshCodecError> {
    let truncated = || invalid(index, "descriptor truncated");
    let layout_hash = reader.u16().ok_or_else(truncated)?;
    let vertex_stride = reader.u16().ok_or_else(truncated)?;
    let index_width_bytes = reader.u8().ok_or_else(truncated)?;
    let attribute_count = usize::from(reader.u8().ok_or_else(truncated)?);
    let attribute_bytes = reader.take(MAX_VERTEX_ATTRIBUTES * 2).ok_or_else(truncated)?;
    let flags = reader.u16().ok_or_else(truncated)?;
    let vertex_count = reader.u32().ok_or_else(truncated)? as usize;
    let index_count = reader.u32().ok_or_else(truncated)? as usize;
    let material_index = reader.u32().ok_or_else(truncated)?;
    let _reserved = reader.u32().ok_or_else(truncated)?;

    if attribute_count > MAX_VERTEX_ATTRIBUTES {
        return Err(invalid(index, format!("{attribute_count} vertex attributes")));
    }
    let mut attributes = Vec::with_capacity(attribute_count);
    for pair in attribute_bytes.chunks_exact(2).take(attribute_count) {
        let semantic = VertexSemantic::from_u8(pair[0])
            .ok_or_else(|| invalid(index, format!("unknown vertex semantic {}", pair[0])))?;
        attributes.push(VertexAttribute::new(semantic, pair[1]));
    }
    let layout = VertexLayout::new(attributes)
        .ok_or_else(|| invalid(index, "vertex attribute with invalid component count"))?;

    if layout.layout_hash() != layout_hash {
        return Err(invalid(index, "vertex layout hash mismatch"));
    }
    if layout.stride() != usize::from(vertex_stride) {
        return Err(invalid(
            index,
            format!("stride {vertex_stride} does not match layout stride {}", layout.stride()),
        ));
    }
    let index_width = IndexWidth::from_bytes(index_width_bytes)
        .ok_or_else(|| invalid(index, format!("index width {index_width_bytes}")))?;
    if layout.components_per_vertex() == 0 && vertex_count > 0 {
        return Err(invalid(index, "vertices without a vertex layout"));
    }

    Ok(ChunkDescriptor {
        layout,
        index_width,
        flags: ChunkFlags::from_bits_retain(flags),
        vertex_count,
        index_count,
        material_index,
    })
}

/// Deserialize a mesh from the binary format
pub fn decode(bytes: &[u8]) -> Result<Mesh, MeshCodecError> {
    let mut reader = ByteReader::new(bytes);
    let header_truncated = || MeshCodecError::Truncated {
        expected: HEADER_SIZE,
        actual: bytes.len(),
    };

    let signature = reader.u32().ok_or_else(header_truncated)?;
    if signature != MESH_SIGNATURE {
        return Err(MeshCodecError::BadSignature(signature));
    }
    let version = reader.u16().ok_or_else(header_truncated)?;
    if version != MESH_VERSION {
        return Err(MeshCodecError::UnsupportedVersion(version));
    }
    let total_size = reader.u32().ok_or_else(header_truncated)? as usize;
    let chunk_count = usize::from(reader.u16().ok_or_else(header_truncated)?);

    if total_size > bytes.len() {
        return Err(MeshCodecError::Truncated {
            expected: total_size,
            actual: bytes.len(),
        });
    }
    if total_size != bytes.len() {
        return Err(MeshCodecError::SizeMismatch {
            recorded: total_size,
            computed: bytes.len(),
        });
    }

    let table_end = HEADER_SIZE + chunk_count * CHUNK_DESCRIPTOR_SIZE;
    if table_end > bytes.len() {
        return Err(MeshCodecError::Truncated {
            expected: table_end,
            actual: bytes.len(),
        });
    }

    let descriptors = (0..chunk_count)
        .map(|index| read_descriptor(index, &mut reader))
        .collect::<Result<Vec<_>, _>>()?;

    let mut computed = table_end;
    for (index, descriptor) in descriptors.iter().enumerate() {
        let too_large = || MeshCodecError::TooLarge(format!("chunk {index} payload size overflows"));
        let vertex_bytes = descriptor
            .vertex_count
            .checked_mul(descriptor.layout.stride())
            .ok_or_else(too_large)?;
        let index_bytes = descriptor
            .index_count
            .checked_mul(descriptor.index_width.bytes())
            .ok_or_else(too_large)?;
        computed = computed
            .checked_add(vertex_bytes)
            .and_then(|sum| sum.checked_add(index_bytes))
            .ok_or_else(too_large)?;
    }
    if computed != total_size {
        return Err(MeshCodecError::SizeMismatch {
            recorded: total_size,
            computed,
        });
    }

    let mut vertex_sets = Vec::with_capacity(chunk_count);
    for (index, descriptor) in descriptors.iter().enumerate() {
        let floats = descriptor.vertex_count * descriptor.layout.components_per_vertex();
        let mut vertices = Vec::with_capacity(floats);
        for _ in 0..floats {
            vertices.push(reader.f32().ok_or_else(|| invalid(index, "vertex data truncated"))?);
        }
        vertex_sets.push(vertices);
    }

    let mut chunks = Vec::with_capacity(chunk_count);
    for (index, (descriptor, vertices)) in descriptors.into_iter().zip(vertex_sets).enumerate() {
        let truncated = || invalid(index, "index data truncated");
        let mut indices = Vec::with_capacity(descriptor.index_count);
        for _ in 0..descriptor.index_count {
            let value = match descriptor.index_width {
                IndexWidth::U8 => u32::from(reader.u8().ok_or_else(truncated)?),
                IndexWidth::U16 => u32::from(reader.u16().ok_or_else(truncated)?),
                IndexWidth::U32 => reader.u32().ok_or_else(truncated)?,
            };
            if value as usize >= descriptor.vertex_count {
                return Err(invalid(
                    index,
                    format!("index {value} out of range for {} vertices", descriptor.vertex_count),
                ));
            }
            indices.push(value);
        }
        chunks.push(MeshChunk {
            layout: descriptor.layout,
            vertices,
            indices,
            material_index: descriptor.material_index,
            flags: descriptor.flags,
        });
    }

    Ok(Mesh::new(chunks))
}

/// Decode into an existing mesh, replacing it only when decoding succeeds
pub fn decode_into(mesh: &mut Mesh, bytes: &[u8]) -> Result<(), MeshCodecError> {
    *mesh = decode(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_fan(vertex_count: usize) -> MeshChunk {
        let vertices = (0..vertex_count)
            .flat_map(|i| {
                let angle = i as f32 * 0.01;
                [angle.cos(), angle.sin(), i as f32]
            })
            .collect();
        let indices = (1..vertex_count as u32 - 1).flat_map(|i| [0, i, i + 1]).collect();
        MeshChunk::new(VertexLayout::position(), vertices, indices)
    }

    fn sample_mesh() -> Mesh {
        let mut mesh = Mesh::cube();
        mesh.chunks.push(
            triangle_fan(300)
                .with_material(2)
                .with_flags(ChunkFlags::DOUBLE_SIDED | ChunkFlags::TRANSPARENT),
        );
        mesh.chunks.push(MeshChunk::new(VertexLayout::position(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], Vec::new()));
        mesh
    }

    #[test]
    fn test_round_trip_mixed_index_widths() {
        let mesh = sample_mesh();
        assert_eq!(mesh.chunks[0].index_width(), IndexWidth::U8);
        assert_eq!(mesh.chunks[1].index_width(), IndexWidth::U16);

        let bytes = encode(&mesh).unwrap();
        assert_eq!(bytes.len(), encode_size(&mesh));
        assert_eq!(decode(&bytes).unwrap(), mesh);
    }

    #[test]
    fn test_round_trip_32_bit_indices() {
        let mesh = Mesh::new(vec![triangle_fan(70_000)]);
        assert_eq!(mesh.chunks[0].index_width(), IndexWidth::U32);
        let decoded = decode(&encode(&mesh).unwrap()).unwrap();
        assert_eq!(decoded, mesh);
    }

    #[test]
    fn test_index_width_is_recorded_per_chunk() {
        let mesh = sample_mesh();
        let bytes = encode(&mesh).unwrap();
        let descriptor = HEADER_SIZE + CHUNK_DESCRIPTOR_SIZE;
        assert_eq!(bytes[HEADER_SIZE + 4], 1);
        assert_eq!(bytes[descriptor + 4], 2);
    }

    #[test]
    fn test_empty_mesh_round_trip() {
        let mesh = Mesh::default();
        let bytes = encode(&mesh).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_bad_signature_leaves_mesh_untouched() {
        let original = Mesh::cube();
        let mut target = original.clone();
        let mut bytes = encode(&sample_mesh()).unwrap();
        bytes[0] ^= 0xFF;

        let result = decode_into(&mut target, &bytes);
        assert!(matches!(result, Err(MeshCodecError::BadSignature(_))));
        assert_eq!(target, original);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = encode(&Mesh::cube()).unwrap();
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(MeshCodecError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_truncated_buffer_fails_closed() {
        let original = sample_mesh();
        let bytes = encode(&original).unwrap();
        let mut target = Mesh::cube();

        for cut in [3, HEADER_SIZE + 5, bytes.len() - 1] {
            assert!(decode_into(&mut target, &bytes[..cut]).is_err(), "cut at {cut}");
            assert_eq!(target, Mesh::cube());
        }
    }

    #[test]
    fn test_tampered_counts_detected() {
        let mut bytes = encode(&Mesh::cube()).unwrap();
        // vertex_count of the first descriptor
        let offset = HEADER_SIZE + 24;
        bytes[offset] = bytes[offset].wrapping_add(1);
        assert!(matches!(decode(&bytes), Err(MeshCodecError::SizeMismatch { .. })));
    }

    #[test]
    fn test_encode_rejects_out_of_range_index() {
        let chunk = MeshChunk::new(VertexLayout::position(), vec![0.0; 9], vec![0, 1, 3]);
        assert!(matches!(
            encode(&Mesh::new(vec![chunk])),
            Err(MeshCodecError::InvalidChunk { chunk: 0, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_partial_vertex() {
        let chunk = MeshChunk::new(VertexLayout::position(), vec![0.0; 10], Vec::new());
        assert!(encode(&Mesh::new(vec![chunk])).is_err());
    }
}
