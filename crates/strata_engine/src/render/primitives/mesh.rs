//! Mesh representation for 3D models
//!
//! A [`Mesh`] is an ordered list of [`MeshChunk`]s. Each chunk is one draw
//! unit: interleaved `f32` vertex data described by a [`VertexLayout`], an
//! optional index list, a material slot and a set of option flags.
//!
//! Indices are always held as `u32` in memory. The on-disk width is picked
//! by the mesh codec from the chunk's vertex count.

use bitflags::bitflags;

/// Maximum number of attributes a vertex layout can describe
pub const MAX_VERTEX_ATTRIBUTES: usize = 8;

/// Meaning of a vertex attribute
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    /// Object-space position
    Position = 0,
    /// Surface normal
    Normal = 1,
    /// First texture coordinate set
    TexCoord0 = 2,
    /// Second texture coordinate set
    TexCoord1 = 3,
    /// Tangent vector
    Tangent = 4,
    /// Vertex color
    Color = 5,
    /// Skinning bone indices (stored as floats)
    BoneIndices = 6,
    /// Skinning bone weights
    BoneWeights = 7,
}

impl VertexSemantic {
    /// Decode a semantic from its wire value
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Position,
            1 => Self::Normal,
            2 => Self::TexCoord0,
            3 => Self::TexCoord1,
            4 => Self::Tangent,
            5 => Self::Color,
            6 => Self::BoneIndices,
            7 => Self::BoneWeights,
            _ => return None,
        })
    }
}

/// One attribute of an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// What the attribute holds
    pub semantic: VertexSemantic,
    /// Number of `f32` components (1..=4)
    pub components: u8,
}

impl VertexAttribute {
    /// Create an attribute description
    pub const fn new(semantic: VertexSemantic, components: u8) -> Self {
        Self { semantic, components }
    }
}

/// Ordered description of an interleaved vertex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Build a layout, returning `None` when it has too many attributes or
    /// an attribute with zero or more than four components
    pub fn new(attributes: Vec<VertexAttribute>) -> Option<Self> {
        let valid = attributes.len() <= MAX_VERTEX_ATTRIBUTES
            && attributes.iter().all(|a| (1..=4).contains(&a.components));
        valid.then_some(Self { attributes })
    }

    /// Position only (3 floats)
    pub fn position() -> Self {
        Self {
            attributes: vec![VertexAttribute::new(VertexSemantic::Position, 3)],
        }
    }

    /// Position, normal and one UV set (8 floats)
    pub fn position_normal_uv() -> Self {
        Self {
            attributes: vec![
                VertexAttribute::new(VertexSemantic::Position, 3),
                VertexAttribute::new(VertexSemantic::Normal, 3),
                VertexAttribute::new(VertexSemantic::TexCoord0, 2),
            ],
        }
    }

    /// The attributes in interleaving order
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Floats per vertex
    pub fn components_per_vertex(&self) -> usize {
        self.attributes.iter().map(|a| usize::from(a.components)).sum()
    }

    /// Bytes per vertex
    pub fn stride(&self) -> usize {
        self.components_per_vertex() * std::mem::size_of::<f32>()
    }

    /// 16-bit fingerprint of the layout, recorded in the mesh format
    pub fn layout_hash(&self) -> u16 {
        let mut hasher = crc32fast::Hasher::new();
        for attribute in &self.attributes {
            hasher.update(&[attribute.semantic as u8, attribute.components]);
        }
        let crc = hasher.finalize();
        ((crc >> 16) ^ (crc & 0xFFFF)) as u16
    }
}

bitflags! {
    /// Per-chunk option flags carried through the mesh format
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChunkFlags: u16 {
        /// Render both faces
        const DOUBLE_SIDED = 1 << 0;
        /// Needs alpha blending
        const TRANSPARENT = 1 << 1;
        /// Casts shadows
        const CASTS_SHADOW = 1 << 2;
        /// Vertices carry bone indices/weights
        const SKINNED = 1 << 3;
    }
}

/// Storage width of index values in the encoded format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    /// 8-bit indices
    U8,
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexWidth {
    /// Smallest width that can address `vertex_count` vertices
    pub const fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= 1 << 8 {
            Self::U8
        } else if vertex_count <= 1 << 16 {
            Self::U16
        } else {
            Self::U32
        }
    }

    /// Size of one index in bytes
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Decode a width from its byte size
    pub const fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            _ => None,
        }
    }
}

/// One draw unit of a mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshChunk {
    /// Interleaved vertex description
    pub layout: VertexLayout,
    /// Interleaved vertex components
    pub vertices: Vec<f32>,
    /// Triangle-list indices; empty for non-indexed chunks
    pub indices: Vec<u32>,
    /// Material slot within the owning mesh node
    pub material_index: u32,
    /// Option flags
    pub flags: ChunkFlags,
}

impl MeshChunk {
    /// Create a chunk with material slot 0 and no flags
    pub fn new(layout: VertexLayout, vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        Self {
            layout,
            vertices,
            indices,
            material_index: 0,
            flags: ChunkFlags::empty(),
        }
    }

    /// Assign the material slot
    #[must_use]
    pub const fn with_material(mut self, material_index: u32) -> Self {
        self.material_index = material_index;
        self
    }

    /// Assign option flags
    #[must_use]
    pub const fn with_flags(mut self, flags: ChunkFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Number of whole vertices
    pub fn vertex_count(&self) -> usize {
        match self.layout.components_per_vertex() {
            0 => 0,
            per_vertex => self.vertices.len() / per_vertex,
        }
    }

    /// Number of indices
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the chunk is drawn with an index buffer
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Triangles this chunk contributes to a draw
    pub fn triangle_count(&self) -> usize {
        if self.is_indexed() {
            self.indices.len() / 3
        } else {
            self.vertex_count() / 3
        }
    }

    /// Index width the encoder will use for this chunk
    pub fn index_width(&self) -> IndexWidth {
        IndexWidth::for_vertex_count(self.vertex_count())
    }

    /// Vertex data as bytes for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes for upload (always 32-bit)
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Chunked mesh resource
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    /// Draw units in submission order
    pub chunks: Vec<MeshChunk>,
}

impl Mesh {
    /// Create a mesh from chunks
    pub fn new(chunks: Vec<MeshChunk>) -> Self {
        Self { chunks }
    }

    /// Whether the mesh has no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total triangles across all chunks
    pub fn triangle_count(&self) -> usize {
        self.chunks.iter().map(MeshChunk::triangle_count).sum()
    }

    /// Unit cube with normals and UVs, 24 vertices and 36 indices
    pub fn cube() -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let corners = [(-1.0, -1.0, 0.0, 0.0), (1.0, -1.0, 1.0, 0.0), (1.0, 1.0, 1.0, 1.0), (-1.0, 1.0, 0.0, 1.0)];

        let mut vertices = Vec::with_capacity(24 * 8);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, right, up)) in faces.iter().enumerate() {
            for (sx, sy, u, v) in corners {
                for axis in 0..3 {
                    vertices.push(normal[axis] + sx * right[axis] + sy * up[axis]);
                }
                vertices.extend_from_slice(normal);
                vertices.extend_from_slice(&[u, v]);
            }
            let base = (face * 4) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(vec![MeshChunk::new(VertexLayout::position_normal_uv(), vertices, indices)])
    }
}
