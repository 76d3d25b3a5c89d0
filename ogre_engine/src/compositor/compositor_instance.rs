/// One compositor applied in one chain.

use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::render_system::GpuTexture;
use super::compositor::{CompositionTechnique, Compositor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Skipped by its chain; holds no textures
    Disabled,
    /// Will take part in the next compile of its chain
    Enabled,
    /// Textures resolved and operations built
    Compiled,
}

pub struct CompositorInstance {
    compositor: Arc<Compositor>,
    technique: usize,
    state: InstanceState,
    textures: FxHashMap<String, Arc<dyn GpuTexture>>,
}

impl CompositorInstance {
    pub(crate) fn new(compositor: Arc<Compositor>, technique: usize) -> Self {
        Self {
            compositor,
            technique,
            state: InstanceState::Disabled,
            textures: FxHashMap::default(),
        }
    }

    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    pub fn name(&self) -> &str {
        self.compositor.name()
    }

    pub fn technique_index(&self) -> usize {
        self.technique
    }

    pub fn technique(&self) -> &CompositionTechnique {
        &self.compositor.techniques()[self.technique]
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != InstanceState::Disabled
    }

    /// Texture bound to definition `name` since the last compile
    pub fn texture(&self, name: &str) -> Option<&Arc<dyn GpuTexture>> {
        self.textures.get(name)
    }

    pub(crate) fn textures(&self) -> &FxHashMap<String, Arc<dyn GpuTexture>> {
        &self.textures
    }

    pub(crate) fn set_state(&mut self, state: InstanceState) {
        if state == InstanceState::Disabled {
            self.textures.clear();
        }
        self.state = state;
    }

    pub(crate) fn set_textures(&mut self, textures: FxHashMap<String, Arc<dyn GpuTexture>>) {
        self.textures = textures;
        self.state = InstanceState::Compiled;
    }

    /// Back to `Enabled`, dropping resolved textures
    pub(crate) fn release(&mut self) {
        self.textures.clear();
        if self.state == InstanceState::Compiled {
            self.state = InstanceState::Enabled;
        }
    }
}
