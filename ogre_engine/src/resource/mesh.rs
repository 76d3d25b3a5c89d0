//! Mesh resource.
//!
//! A mesh is described on the CPU by a [`MeshSource`]: optional shared
//! geometry, a list of submeshes (each with its own geometry or using the
//! shared one) and per-level index lists for generated LODs. Loading
//! uploads the source into shadowed hardware buffers; the GPU side is
//! exposed as [`SubMesh`]es that produce ready-to-draw render operations.
//!
//! # LOD
//!
//! Level 0 is the full mesh. Further levels are registered with
//! [`Mesh::add_lod_level`] as user values (distances, pixel counts) that
//! the mesh's LOD strategy transforms; a level either reuses the submesh
//! geometry with reduced index lists or names another mesh (manual LOD).

use std::sync::Arc;
use glam::Vec3;

use crate::engine_bail;
use crate::error::Result;
use crate::hardware::{
    HardwareBufferManager, HardwareBufferUsage, IndexData, IndexType, VertexBufferBinding,
    VertexData, VertexDeclaration, VertexElementSemantic, VertexElementType,
};
use crate::lod::{DistanceLodStrategy, LodStrategy};
use crate::render_system::{OperationType, RenderOperation};
use crate::resource::{
    ManualResourceLoader, NameValuePairList, ResourceData, ResourceInfo, ResourceManager,
    ResourceRef,
};
use crate::scene::AABB;

const SOURCE: &str = "ogre::Mesh";

/// What meshes need to reach the GPU
pub struct MeshContext {
    buffers: Arc<HardwareBufferManager>,
}

impl MeshContext {
    pub fn new(buffers: Arc<HardwareBufferManager>) -> Self {
        Self { buffers }
    }

    pub fn buffers(&self) -> &Arc<HardwareBufferManager> {
        &self.buffers
    }
}

// ============================================================================
// CPU-side description
// ============================================================================

/// Vertices of a mesh or submesh: declaration plus one byte stream per source
#[derive(Debug, Clone, Default)]
pub struct GeometrySource {
    pub declaration: VertexDeclaration,
    /// (stream index, interleaved vertex bytes)
    pub streams: Vec<(u16, Vec<u8>)>,
    pub vertex_count: usize,
}

impl GeometrySource {
    /// Single stream of `Float3` positions
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let mut declaration = VertexDeclaration::new();
        // A fresh declaration cannot overlap
        let _ = declaration.add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0);
        let floats: Vec<f32> = positions.iter().flat_map(|p| p.to_array()).collect();
        Self {
            declaration,
            streams: vec![(0, bytemuck::cast_slice(&floats).to_vec())],
            vertex_count: positions.len(),
        }
    }

    /// Every declared stream is present with exactly `vertex_count` vertices
    pub fn validate(&self, owner: &str) -> Result<()> {
        for source in self.declaration.sources() {
            let Some((_, bytes)) = self.streams.iter().find(|(s, _)| *s == source) else {
                engine_bail!(SOURCE, InvalidAsset, "'{}': vertex stream {} missing", owner, source);
            };
            let expected = self.declaration.vertex_size(source) * self.vertex_count;
            if bytes.len() != expected {
                engine_bail!(SOURCE, InvalidAsset,
                    "'{}': stream {} holds {} bytes, {} vertices need {}",
                    owner, source, bytes.len(), self.vertex_count, expected);
            }
        }
        Ok(())
    }

    /// Bounds of the `Position` element (null without one)
    pub fn compute_bounds(&self) -> AABB {
        let Some(element) = self
            .declaration
            .find_element_by_semantic(VertexElementSemantic::Position, 0)
            .copied()
        else {
            return AABB::NULL;
        };
        if element.element_type != VertexElementType::Float3 && element.element_type != VertexElementType::Float4 {
            return AABB::NULL;
        }
        let Some((_, bytes)) = self.streams.iter().find(|(s, _)| *s == element.source) else {
            return AABB::NULL;
        };
        let stride = self.declaration.vertex_size(element.source);
        let positions = (0..self.vertex_count).filter_map(|i| {
            let start = i * stride + element.offset;
            let raw = bytes.get(start..start + 12)?;
            Some(Vec3::from_array(bytemuck::pod_read_unaligned::<[f32; 3]>(raw)))
        });
        AABB::from_points(positions)
    }

    fn byte_size(&self) -> usize {
        self.streams.iter().map(|(_, b)| b.len()).sum()
    }
}

/// One drawable part of a mesh
#[derive(Debug, Clone, Default)]
pub struct SubMeshSource {
    pub name: String,
    pub material_name: String,
    pub operation_type: OperationType,
    /// Own vertices, or `None` to use the mesh's shared geometry
    pub geometry: Option<GeometrySource>,
    /// Empty for a non-indexed submesh
    pub indices: Vec<u32>,
    /// Reduced index lists for generated LOD levels 1, 2, ...
    pub lod_indices: Vec<Vec<u32>>,
}

/// Complete CPU description of a mesh
#[derive(Debug, Clone, Default)]
pub struct MeshSource {
    pub shared_geometry: Option<GeometrySource>,
    pub submeshes: Vec<SubMeshSource>,
    /// Null to compute from positions on load
    pub bounds: AABB,
    /// 0 to compute from the bounds on load
    pub bounding_radius: f32,
}

impl MeshSource {
    /// Mesh made of one indexed submesh with its own geometry
    pub fn single(material_name: &str, geometry: GeometrySource, indices: Vec<u32>) -> Self {
        Self {
            submeshes: vec![SubMeshSource {
                name: "0".to_string(),
                material_name: material_name.to_string(),
                geometry: Some(geometry),
                indices,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn byte_size(&self) -> usize {
        let shared = self.shared_geometry.as_ref().map_or(0, |g| g.byte_size());
        shared + self
            .submeshes
            .iter()
            .map(|s| {
                s.geometry.as_ref().map_or(0, |g| g.byte_size())
                    + 4 * (s.indices.len() + s.lod_indices.iter().map(Vec::len).sum::<usize>())
            })
            .sum::<usize>()
    }
}

// ============================================================================
// GPU-side data
// ============================================================================

/// Loaded submesh
#[derive(Debug, Clone)]
pub struct SubMesh {
    name: String,
    material_name: String,
    operation_type: OperationType,
    uses_shared_vertices: bool,
    vertex_data: Arc<VertexData>,
    index_data: Option<Arc<IndexData>>,
    lod_index_data: Vec<Arc<IndexData>>,
}

impl SubMesh {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn material_name(&self) -> &str {
        &self.material_name
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn uses_shared_vertices(&self) -> bool {
        self.uses_shared_vertices
    }

    pub fn vertex_data(&self) -> &Arc<VertexData> {
        &self.vertex_data
    }

    pub fn index_data(&self) -> Option<&Arc<IndexData>> {
        self.index_data.as_ref()
    }

    /// Index data of a generated LOD level (level 0 and missing levels use
    /// the full index list)
    pub fn index_data_for_lod(&self, lod: usize) -> Option<&Arc<IndexData>> {
        match lod {
            0 => self.index_data.as_ref(),
            n => self.lod_index_data.get(n - 1).or(self.index_data.as_ref()),
        }
    }

    pub fn render_operation(&self, lod: usize) -> RenderOperation {
        match self.index_data_for_lod(lod) {
            Some(index) => RenderOperation::indexed(self.vertex_data.clone(), index.clone(), self.operation_type),
            None => RenderOperation::new(self.vertex_data.clone(), self.operation_type),
        }
    }
}

/// One mesh LOD level
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLodUsage {
    /// Value as given (distance, pixels)
    pub user_value: f32,
    /// Value transformed by the mesh's LOD strategy
    pub value: f32,
    /// Replacement mesh for manual LOD levels
    pub manual_mesh_name: Option<String>,
}

pub struct Mesh {
    source: Option<MeshSource>,
    shared_vertex_data: Option<Arc<VertexData>>,
    submeshes: Vec<SubMesh>,
    bounds: AABB,
    bounding_radius: f32,
    lod_strategy: &'static str,
    lod_usages: Vec<MeshLodUsage>,
    gpu_bytes: usize,
}

impl Mesh {
    fn empty() -> Self {
        let strategy = DistanceLodStrategy;
        Self {
            source: None,
            shared_vertex_data: None,
            submeshes: Vec::new(),
            bounds: AABB::NULL,
            bounding_radius: 0.0,
            lod_strategy: strategy.name(),
            lod_usages: vec![MeshLodUsage {
                user_value: 0.0,
                value: strategy.base_value(),
                manual_mesh_name: None,
            }],
            gpu_bytes: 0,
        }
    }

    // ===== SOURCE =====

    pub fn source(&self) -> Option<&MeshSource> {
        self.source.as_ref()
    }

    /// Replace the CPU description; takes effect on the next load
    pub fn set_source(&mut self, source: MeshSource) {
        self.source = Some(source);
    }

    // ===== LOADED DATA =====

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    pub fn submesh(&self, index: usize) -> Option<&SubMesh> {
        self.submeshes.get(index)
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    pub fn shared_vertex_data(&self) -> Option<&Arc<VertexData>> {
        self.shared_vertex_data.as_ref()
    }

    pub fn bounds(&self) -> AABB {
        self.bounds
    }

    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    // ===== LOD =====

    pub fn lod_strategy(&self) -> &'static str {
        self.lod_strategy
    }

    /// Switch strategy, re-transforming every level's user value
    pub fn set_lod_strategy(&mut self, strategy: &dyn LodStrategy) -> Result<()> {
        let mut usages = self.lod_usages.clone();
        usages[0].value = strategy.base_value();
        for usage in usages.iter_mut().skip(1) {
            usage.value = strategy.transform_user_value(usage.user_value);
        }
        let values: Vec<f32> = usages.iter().map(|u| u.value).collect();
        if !strategy.is_sorted(&values) {
            engine_bail!(SOURCE, InvalidParams,
                "LOD levels are not ordered for strategy '{}'", strategy.name());
        }
        self.lod_strategy = strategy.name();
        self.lod_usages = usages;
        Ok(())
    }

    /// Append a level coarser than every existing one
    ///
    /// `strategy` must be the mesh's strategy.
    pub fn add_lod_level(
        &mut self,
        strategy: &dyn LodStrategy,
        user_value: f32,
        manual_mesh_name: Option<&str>,
    ) -> Result<()> {
        if strategy.name() != self.lod_strategy {
            engine_bail!(SOURCE, InvalidParams,
                "LOD level given for strategy '{}', mesh uses '{}'", strategy.name(), self.lod_strategy);
        }
        let value = strategy.transform_user_value(user_value);
        let mut values = self.lod_values();
        values.push(value);
        if !strategy.is_sorted(&values) || values[values.len() - 2] == value {
            engine_bail!(SOURCE, InvalidParams,
                "LOD value {} does not follow the previous level", user_value);
        }
        self.lod_usages.push(MeshLodUsage {
            user_value,
            value,
            manual_mesh_name: manual_mesh_name.map(str::to_string),
        });
        Ok(())
    }

    pub fn lod_usages(&self) -> &[MeshLodUsage] {
        &self.lod_usages
    }

    pub fn lod_usage(&self, index: usize) -> Option<&MeshLodUsage> {
        self.lod_usages.get(index)
    }

    pub fn num_lod_levels(&self) -> usize {
        self.lod_usages.len()
    }

    pub fn lod_values(&self) -> Vec<f32> {
        self.lod_usages.iter().map(|u| u.value).collect()
    }

    /// Level selected by a strategy value
    pub fn lod_index(&self, strategy: &dyn LodStrategy, value: f32) -> usize {
        strategy.lod_index(value, &self.lod_values())
    }

    // ===== UPLOAD =====

    fn upload_geometry(
        buffers: &HardwareBufferManager,
        owner: &str,
        geometry: &GeometrySource,
    ) -> Result<(Arc<VertexData>, usize)> {
        geometry.validate(owner)?;
        let mut binding = VertexBufferBinding::new();
        let mut bytes = 0;
        for (source, data) in &geometry.streams {
            let vertex_size = geometry.declaration.vertex_size(*source);
            if vertex_size == 0 || geometry.vertex_count == 0 {
                continue;
            }
            let buffer = buffers.create_vertex_buffer(
                vertex_size,
                geometry.vertex_count,
                HardwareBufferUsage::STATIC_WRITE_ONLY,
                true,
            )?;
            buffer.write_data(0, data, true)?;
            bytes += data.len();
            binding.set_binding(*source, buffer);
        }
        let vertex_data = VertexData::new(geometry.declaration.clone(), binding, geometry.vertex_count);
        Ok((Arc::new(vertex_data), bytes))
    }

    fn upload_indices(
        buffers: &HardwareBufferManager,
        owner: &str,
        indices: &[u32],
        vertex_count: usize,
    ) -> Result<(Arc<IndexData>, usize)> {
        let max = indices.iter().copied().max().unwrap_or(0);
        if max as usize >= vertex_count {
            engine_bail!(SOURCE, InvalidAsset,
                "'{}': index {} references a vertex beyond the {} available", owner, max, vertex_count);
        }
        let index_type = if max <= u16::MAX as u32 { IndexType::U16 } else { IndexType::U32 };
        let buffer = buffers.create_index_buffer(
            index_type,
            indices.len(),
            HardwareBufferUsage::STATIC_WRITE_ONLY,
            true,
        )?;
        let bytes: Vec<u8> = match index_type {
            IndexType::U16 => indices.iter().flat_map(|&i| (i as u16).to_le_bytes()).collect(),
            IndexType::U32 => indices.iter().flat_map(|&i| i.to_le_bytes()).collect(),
        };
        buffer.write_data(0, &bytes, true)?;
        Ok((Arc::new(IndexData::new(buffer, 0, indices.len())), bytes.len()))
    }

    fn build(&mut self, info: &ResourceInfo, buffers: &HardwareBufferManager) -> Result<()> {
        let Some(source) = self.source.as_ref() else {
            engine_bail!(SOURCE, InvalidState, "Mesh '{}' has no geometry to load", info.name);
        };

        let mut gpu_bytes = 0;
        let shared = match &source.shared_geometry {
            Some(geometry) => {
                let (data, bytes) = Self::upload_geometry(buffers, &info.name, geometry)?;
                gpu_bytes += bytes;
                Some(data)
            }
            None => None,
        };

        let mut submeshes = Vec::with_capacity(source.submeshes.len());
        for (i, sub) in source.submeshes.iter().enumerate() {
            let owner = format!("{}/{}", info.name, if sub.name.is_empty() { i.to_string() } else { sub.name.clone() });
            let (vertex_data, uses_shared) = match (&sub.geometry, &shared) {
                (Some(geometry), _) => {
                    let (data, bytes) = Self::upload_geometry(buffers, &owner, geometry)?;
                    gpu_bytes += bytes;
                    (data, false)
                }
                (None, Some(shared)) => (shared.clone(), true),
                (None, None) => {
                    engine_bail!(SOURCE, InvalidAsset, "'{}' uses shared geometry the mesh does not have", owner);
                }
            };

            let index_data = if sub.indices.is_empty() {
                None
            } else {
                let (data, bytes) = Self::upload_indices(buffers, &owner, &sub.indices, vertex_data.vertex_count)?;
                gpu_bytes += bytes;
                Some(data)
            };
            let mut lod_index_data = Vec::with_capacity(sub.lod_indices.len());
            for indices in &sub.lod_indices {
                let (data, bytes) = Self::upload_indices(buffers, &owner, indices, vertex_data.vertex_count)?;
                gpu_bytes += bytes;
                lod_index_data.push(data);
            }

            submeshes.push(SubMesh {
                name: sub.name.clone(),
                material_name: sub.material_name.clone(),
                operation_type: sub.operation_type,
                uses_shared_vertices: uses_shared,
                vertex_data,
                index_data,
                lod_index_data,
            });
        }

        let mut bounds = source.bounds;
        if bounds.is_null() {
            if let Some(geometry) = &source.shared_geometry {
                bounds.merge(&geometry.compute_bounds());
            }
            for geometry in source.submeshes.iter().filter_map(|s| s.geometry.as_ref()) {
                bounds.merge(&geometry.compute_bounds());
            }
        }
        let bounding_radius = if source.bounding_radius > 0.0 {
            source.bounding_radius
        } else if bounds.is_finite() {
            bounds.min.length().max(bounds.max.length())
        } else {
            0.0
        };

        self.shared_vertex_data = shared;
        self.submeshes = submeshes;
        self.bounds = bounds;
        self.bounding_radius = bounding_radius;
        self.gpu_bytes = gpu_bytes;
        Ok(())
    }
}

impl ResourceData for Mesh {
    type Context = MeshContext;
    const RESOURCE_TYPE: &'static str = "Mesh";
    const LOAD_ORDER: u32 = 200;

    fn create(_info: &ResourceInfo, _params: &NameValuePairList) -> Result<Self> {
        Ok(Mesh::empty())
    }

    fn source_file(&self, info: &ResourceInfo) -> Option<String> {
        if info.is_manual {
            None
        } else {
            Some(info.name.clone())
        }
    }

    fn load(&mut self, info: &ResourceInfo, ctx: &MeshContext) -> Result<()> {
        self.build(info, ctx.buffers())
    }

    fn unload(&mut self, info: &ResourceInfo, _ctx: &MeshContext) {
        self.submeshes.clear();
        self.shared_vertex_data = None;
        self.gpu_bytes = 0;
        if !info.is_manual {
            self.source = None;
        }
    }

    fn calculate_size(&self) -> usize {
        self.gpu_bytes + self.source.as_ref().map_or(0, MeshSource::byte_size)
    }
}

/// Manager of [`Mesh`] resources
pub type MeshManager = ResourceManager<Mesh>;

impl ResourceManager<Mesh> {
    /// Create a mesh from a description built in code
    ///
    /// Without a loader the mesh is loaded immediately.
    pub fn create_manual(
        &self,
        name: &str,
        group: &str,
        source: MeshSource,
        loader: Option<Arc<dyn ManualResourceLoader<Mesh>>>,
    ) -> Result<ResourceRef<Mesh>> {
        let has_loader = loader.is_some();
        let mesh = self.create(name, group, true, loader, None)?;
        if let Some(resource) = mesh.upgrade() {
            resource.data()?.set_source(source);
        }
        if !has_loader {
            self.load(&mesh)?;
        }
        Ok(mesh)
    }

    /// XY plane facing +Z, centered on the origin, two triangles
    pub fn create_plane(
        &self,
        name: &str,
        group: &str,
        width: f32,
        height: f32,
        material_name: &str,
    ) -> Result<ResourceRef<Mesh>> {
        let (w, h) = (width * 0.5, height * 0.5);
        let mut declaration = VertexDeclaration::new();
        declaration.add_element(0, 0, VertexElementType::Float3, VertexElementSemantic::Position, 0)?;
        declaration.add_element(0, 12, VertexElementType::Float3, VertexElementSemantic::Normal, 0)?;
        declaration.add_element(0, 24, VertexElementType::Float2, VertexElementSemantic::TexCoords, 0)?;
        #[rustfmt::skip]
        let vertices: [f32; 32] = [
            -w, -h, 0.0,  0.0, 0.0, 1.0,  0.0, 1.0,
             w, -h, 0.0,  0.0, 0.0, 1.0,  1.0, 1.0,
             w,  h, 0.0,  0.0, 0.0, 1.0,  1.0, 0.0,
            -w,  h, 0.0,  0.0, 0.0, 1.0,  0.0, 0.0,
        ];
        let geometry = GeometrySource {
            declaration,
            streams: vec![(0, bytemuck::cast_slice(&vertices).to_vec())],
            vertex_count: 4,
        };
        self.create_manual(name, group, MeshSource::single(material_name, geometry, vec![0, 1, 2, 0, 2, 3]), None)
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
