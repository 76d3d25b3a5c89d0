/// Entity: an instance of a mesh in the scene.
///
/// Each submesh of the mesh gets a sub-entity carrying its own material,
/// initialised from the submesh's material name. At queue time the entity
/// picks a mesh LOD (generated index lists, or a separate manual LOD mesh)
/// and, per sub-entity, a material LOD; both use the LOD strategy their
/// owner declares.

use glam::Mat4;

use crate::{engine_bail, engine_warn};
use crate::error::Result;
use crate::material::{Material, MaterialManager};
use crate::render_queue::{RenderQueue, Renderable};
use crate::render_system::RenderOperation;
use crate::resource::mesh::{Mesh, MeshManager};
use crate::resource::{ResourceRef, AUTODETECT_RESOURCE_GROUP_NAME};
use super::aabb::AABB;
use super::movable_object::{MovableObject, MovableObjectBase, MovableRenderContext};

const SOURCE: &str = "ogre::Entity";

/// Per-submesh part of an entity
pub struct SubEntity {
    material: ResourceRef<Material>,
    visible: bool,
    material_lod_index: u16,
}

impl SubEntity {
    pub fn material(&self) -> &ResourceRef<Material> {
        &self.material
    }

    pub fn set_material(&mut self, material: ResourceRef<Material>) {
        self.material = material;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Material LOD chosen at the last queue update
    pub fn material_lod_index(&self) -> u16 {
        self.material_lod_index
    }
}

/// A manual LOD level: another mesh with its own materials
struct ManualLod {
    mesh: ResourceRef<Mesh>,
    materials: Vec<ResourceRef<Material>>,
}

pub struct Entity {
    base: MovableObjectBase,
    mesh: ResourceRef<Mesh>,
    sub_entities: Vec<SubEntity>,
    /// Indexed by mesh LOD; `None` for generated levels
    manual_lods: Vec<Option<ManualLod>>,
    bounds: AABB,
    bounding_radius: f32,
    mesh_lod_index: usize,
}

impl Entity {
    /// Instance `mesh`, loading it (and its manual LOD meshes) if needed
    pub fn new(
        name: &str,
        mesh: ResourceRef<Mesh>,
        meshes: &MeshManager,
        materials: &MaterialManager,
    ) -> Result<Self> {
        meshes.load(&mesh)?;
        let Some(resource) = mesh.upgrade() else {
            engine_bail!(SOURCE, ItemNotFound, "Mesh of entity '{}' was removed", name);
        };
        let data = resource.data()?;

        let sub_entities = data
            .submeshes()
            .iter()
            .map(|submesh| {
                Ok(SubEntity {
                    material: resolve_material(materials, submesh.material_name(), name)?,
                    visible: true,
                    material_lod_index: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut manual_lods = Vec::with_capacity(data.num_lod_levels());
        for usage in data.lod_usages() {
            let Some(lod_name) = &usage.manual_mesh_name else {
                manual_lods.push(None);
                continue;
            };
            let Some(lod_mesh) = meshes.get_by_name(lod_name, AUTODETECT_RESOURCE_GROUP_NAME) else {
                engine_warn!(SOURCE, "Entity '{}': manual LOD mesh '{}' not found, using the full mesh",
                    name, lod_name);
                manual_lods.push(None);
                continue;
            };
            meshes.load(&lod_mesh)?;
            let lod_materials = match lod_mesh.upgrade() {
                Some(lod_resource) => lod_resource
                    .data()?
                    .submeshes()
                    .iter()
                    .map(|s| resolve_material(materials, s.material_name(), name))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            manual_lods.push(Some(ManualLod { mesh: lod_mesh, materials: lod_materials }));
        }

        let bounds = data.bounds();
        let bounding_radius = data.bounding_radius();
        drop(data);
        Ok(Self {
            base: MovableObjectBase::new(name),
            mesh,
            sub_entities,
            manual_lods,
            bounds,
            bounding_radius,
            mesh_lod_index: 0,
        })
    }

    pub fn mesh(&self) -> &ResourceRef<Mesh> {
        &self.mesh
    }

    pub fn sub_entities(&self) -> &[SubEntity] {
        &self.sub_entities
    }

    pub fn sub_entity_mut(&mut self, index: usize) -> Option<&mut SubEntity> {
        self.sub_entities.get_mut(index)
    }

    /// Use `material` for every sub-entity
    pub fn set_material(&mut self, material: &ResourceRef<Material>) {
        for sub in &mut self.sub_entities {
            sub.material = material.clone();
        }
    }

    /// Mesh LOD chosen at the last queue update
    pub fn mesh_lod_index(&self) -> usize {
        self.mesh_lod_index
    }

    pub fn set_mesh_lod_bias(&mut self, factor: f32) {
        self.base.mesh_lod_factor = factor;
    }

    pub fn set_material_lod_bias(&mut self, factor: f32) {
        self.base.material_lod_factor = factor;
    }

    /// Render operations and materials for one mesh LOD
    fn lod_geometry(&self, lod: usize) -> Vec<(RenderOperation, ResourceRef<Material>, usize)> {
        if let Some(Some(manual)) = self.manual_lods.get(lod) {
            let Some(resource) = manual.mesh.upgrade() else { return Vec::new() };
            let Ok(data) = resource.data() else { return Vec::new() };
            return data
                .submeshes()
                .iter()
                .zip(&manual.materials)
                .enumerate()
                .map(|(i, (submesh, material))| (submesh.render_operation(0), material.clone(), i))
                .collect();
        }
        let Some(resource) = self.mesh.upgrade() else { return Vec::new() };
        let Ok(data) = resource.data() else { return Vec::new() };
        data.submeshes()
            .iter()
            .zip(&self.sub_entities)
            .enumerate()
            .filter(|(_, (_, sub))| sub.visible)
            .map(|(i, (submesh, sub))| (submesh.render_operation(lod), sub.material.clone(), i))
            .collect()
    }

    fn select_mesh_lod(&self, ctx: &MovableRenderContext, radius: f32) -> usize {
        let Some(resource) = self.mesh.upgrade() else { return 0 };
        let Ok(data) = resource.data() else { return 0 };
        if data.num_lod_levels() <= 1 {
            return 0;
        }
        let strategy = ctx.lod_strategies.strategy_or_default(data.lod_strategy());
        let subject = ctx.lod_subject(radius, strategy.transform_bias(self.base.mesh_lod_factor));
        data.lod_index(strategy.as_ref(), strategy.value(&subject, &ctx.lod_view()))
    }

    fn select_material_lod(
        &self,
        ctx: &MovableRenderContext,
        material: &ResourceRef<Material>,
        radius: f32,
    ) -> u16 {
        let Some(resource) = material.upgrade() else { return 0 };
        let Ok(data) = resource.data() else { return 0 };
        if data.num_lod_levels() <= 1 {
            return 0;
        }
        let strategy = ctx.lod_strategies.strategy_or_default(data.lod_strategy());
        let subject = ctx.lod_subject(radius, strategy.transform_bias(self.base.material_lod_factor));
        data.lod_index(strategy.as_ref(), strategy.value(&subject, &ctx.lod_view()))
    }
}

fn resolve_material(
    materials: &MaterialManager,
    name: &str,
    entity: &str,
) -> Result<ResourceRef<Material>> {
    if let Some(material) = materials.get_by_name(name, AUTODETECT_RESOURCE_GROUP_NAME) {
        return Ok(material);
    }
    if !name.is_empty() {
        engine_warn!(SOURCE, "Entity '{}': material '{}' not found, using '{}'",
            entity, name, MaterialManager::BASE_WHITE);
    }
    match materials.get_by_name(MaterialManager::BASE_WHITE, AUTODETECT_RESOURCE_GROUP_NAME) {
        Some(material) => Ok(material),
        None => engine_bail!(SOURCE, ItemNotFound,
            "Entity '{}': fallback material '{}' is missing", entity, MaterialManager::BASE_WHITE),
    }
}

/// Largest axis scale of a transform
fn max_scale(world: &Mat4) -> f32 {
    world.x_axis.truncate().length()
        .max(world.y_axis.truncate().length())
        .max(world.z_axis.truncate().length())
}

impl MovableObject for Entity {
    fn base(&self) -> &MovableObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MovableObjectBase {
        &mut self.base
    }

    fn movable_type(&self) -> &'static str {
        "Entity"
    }

    fn bounding_box(&self) -> AABB {
        self.bounds
    }

    fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    fn update_render_queue(&mut self, ctx: &MovableRenderContext, queue: &mut RenderQueue) {
        let radius = self.bounding_radius * max_scale(&ctx.world_transform);
        self.mesh_lod_index = self.select_mesh_lod(ctx, radius);

        for (operation, material, sub_index) in self.lod_geometry(self.mesh_lod_index) {
            let material_lod = self.select_material_lod(ctx, &material, radius);
            if let Some(sub) = self.sub_entities.get_mut(sub_index) {
                sub.material_lod_index = material_lod;
            }
            let mut renderable = Renderable::new(operation, material, ctx.world_transform);
            renderable.lod_index = material_lod;
            queue.add_renderable(renderable, self.base.render_queue_group, self.base.render_queue_priority);
        }
    }

    fn as_entity(&self) -> Option<&Entity> {
        Some(self)
    }

    fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        Some(self)
    }
}
