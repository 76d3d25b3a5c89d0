/// Shared fixture for unit tests: every manager wired to a mock backend.

use std::sync::{Arc, Mutex};
use glam::{Mat4, Vec3};

use crate::gpu_program::GpuProgramManager;
use crate::hardware::{HardwareBufferManager, VertexData};
use crate::lod::LodStrategyManager;
use crate::material::{Material, MaterialManager};
use crate::render_queue::Renderable;
use crate::render_system::mock::{MockRecorder, MockRenderSystem};
use crate::render_system::{
    lock_render_system, OperationType, RenderOperation, SceneBlendType, SharedRenderSystem,
};
use crate::resource::mesh::{MeshContext, MeshManager};
use crate::resource::texture::{TextureContext, TextureManager};
use crate::resource::{ResourceGroupManager, ResourceRef, DEFAULT_RESOURCE_GROUP_NAME};
use crate::scene::SceneContext;

pub const GENERAL: &str = DEFAULT_RESOURCE_GROUP_NAME;

pub struct TestEngine {
    pub groups: ResourceGroupManager,
    pub render_system: SharedRenderSystem,
    pub recorder: MockRecorder,
    pub programs: GpuProgramManager,
    pub textures: Arc<TextureManager>,
    pub materials: Arc<MaterialManager>,
    pub buffers: Arc<HardwareBufferManager>,
    pub meshes: Arc<MeshManager>,
    pub lod_strategies: Arc<LodStrategyManager>,
}

impl TestEngine {
    pub fn new() -> Self {
        let mock = MockRenderSystem::new();
        let recorder = mock.recorder();
        let render_system: SharedRenderSystem = Arc::new(Mutex::new(mock));
        let groups = ResourceGroupManager::new();
        let registry = groups.registry().clone();
        let programs = GpuProgramManager::new(registry.clone(), render_system.clone());
        let textures = Arc::new(TextureManager::new(
            registry.clone(),
            Arc::new(TextureContext::new(render_system.clone())),
        ));
        let materials = Arc::new(
            MaterialManager::new(
                registry.clone(),
                render_system.clone(),
                programs.programs().clone(),
                textures.clone(),
            )
            .unwrap(),
        );
        let factory = lock_render_system(&render_system).unwrap().hardware_buffer_factory();
        let buffers = Arc::new(HardwareBufferManager::new(factory));
        let meshes = Arc::new(MeshManager::new(registry, Arc::new(MeshContext::new(buffers.clone()))));
        Self {
            groups,
            render_system,
            recorder,
            programs,
            textures,
            materials,
            buffers,
            meshes,
            lod_strategies: Arc::new(LodStrategyManager::new()),
        }
    }

    pub fn scene_context(&self) -> SceneContext {
        SceneContext {
            materials: self.materials.clone(),
            meshes: self.meshes.clone(),
            buffers: self.buffers.clone(),
            lod_strategies: self.lod_strategies.clone(),
        }
    }

    /// Material with one plain pass, edited by `f`
    pub fn material(&self, name: &str, f: impl FnOnce(&mut Material)) -> ResourceRef<Material> {
        let material = self.materials.create_material(name, GENERAL).unwrap();
        {
            let resource = material.upgrade().unwrap();
            let mut data = resource.data().unwrap();
            f(&mut data);
        }
        material
    }

    /// Material whose only pass alpha-blends
    pub fn transparent_material(&self, name: &str) -> ResourceRef<Material> {
        self.material(name, |m| m.set_scene_blending(SceneBlendType::TransparentAlpha))
    }
}

/// Non-indexed triangle list of `vertex_count` vertices without buffers
pub fn bufferless_operation(vertex_count: usize) -> RenderOperation {
    let vertex_data = VertexData { vertex_count, ..VertexData::empty() };
    RenderOperation::new(Arc::new(vertex_data), OperationType::TriangleList)
}

pub fn renderable_at(material: &ResourceRef<Material>, position: Vec3) -> Renderable {
    Renderable::new(bufferless_operation(3), material.clone(), Mat4::from_translation(position))
}
