/// Compositor manager
///
/// Owns compositor definitions, custom pass factories, the chains attached
/// to viewports, the shared texture pool and global textures.

use std::collections::BTreeMap;
use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::gpu_program::AutoParamDataSource;
use crate::hardware::HardwareBufferManager;
use crate::material::MaterialManager;
use crate::render_system::{lock_render_system, GpuTexture, RenderSystemCapabilities, SharedRenderSystem};
use crate::scene::{Rectangle2D, SceneManager};
use crate::target::{RenderTarget, TargetManager};
use crate::{engine_bail, engine_info, engine_warn};
use super::compositor::Compositor;
use super::compositor_chain::{ChainCompileContext, ChainRenderContext, CompositorChain};
use super::custom_pass::CustomCompositionPass;
use super::texture_pool::TexturePool;

const SOURCE: &str = "ogre::CompositorManager";

type ChainKey = (String, i32);

pub struct CompositorManager {
    materials: Arc<MaterialManager>,
    compositors: FxHashMap<String, Arc<Compositor>>,
    custom_passes: FxHashMap<String, Arc<dyn CustomCompositionPass>>,
    chains: BTreeMap<ChainKey, CompositorChain>,
    pool: TexturePool,
    global_textures: FxHashMap<String, Arc<dyn GpuTexture>>,
    /// Full-screen quad shared by every quad pass
    quad: Rectangle2D,
    auto_params: AutoParamDataSource,
}

impl CompositorManager {
    pub fn new(materials: Arc<MaterialManager>, buffers: &HardwareBufferManager) -> Result<Self> {
        Ok(Self {
            materials,
            compositors: FxHashMap::default(),
            custom_passes: FxHashMap::default(),
            chains: BTreeMap::new(),
            pool: TexturePool::new(),
            global_textures: FxHashMap::default(),
            quad: Rectangle2D::new("ogre/CompositorQuad", buffers)?,
            auto_params: AutoParamDataSource::new(),
        })
    }

    // ===== DEFINITIONS =====

    /// Validate and register a compositor definition
    ///
    /// # Errors
    ///
    /// `DuplicateItem` when the name is taken, `InvalidParams` when the
    /// definition is inconsistent.
    pub fn register_compositor(&mut self, compositor: Compositor) -> Result<Arc<Compositor>> {
        if self.compositors.contains_key(compositor.name()) {
            engine_bail!(SOURCE, DuplicateItem, "Compositor '{}' already exists", compositor.name());
        }
        compositor.validate()?;
        let compositor = Arc::new(compositor);
        self.compositors.insert(compositor.name().to_string(), compositor.clone());
        engine_info!(SOURCE, "Compositor '{}' registered ({} techniques)",
            compositor.name(), compositor.techniques().len());
        Ok(compositor)
    }

    pub fn compositor(&self, name: &str) -> Option<&Arc<Compositor>> {
        self.compositors.get(name)
    }

    pub fn has_compositor(&self, name: &str) -> bool {
        self.compositors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn compositor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.compositors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget a definition; chains already using it keep their copy
    pub fn remove_compositor_definition(&mut self, name: &str) -> bool {
        self.compositors.remove(name).is_some()
    }

    // ===== CUSTOM PASSES =====

    /// # Errors
    ///
    /// `DuplicateItem` when a factory is already registered for `custom_type`.
    pub fn register_custom_composition_pass(
        &mut self,
        custom_type: &str,
        pass: Arc<dyn CustomCompositionPass>,
    ) -> Result<()> {
        if self.custom_passes.contains_key(custom_type) {
            engine_bail!(SOURCE, DuplicateItem, "Custom composition pass '{}' already registered", custom_type);
        }
        self.custom_passes.insert(custom_type.to_string(), pass);
        Ok(())
    }

    pub fn has_custom_composition_pass(&self, custom_type: &str) -> bool {
        self.custom_passes.contains_key(custom_type)
    }

    pub fn unregister_custom_composition_pass(&mut self, custom_type: &str) -> bool {
        self.custom_passes.remove(custom_type).is_some()
    }

    // ===== CHAINS =====

    pub fn chain(&self, target: &str, z_order: i32) -> Option<&CompositorChain> {
        self.chains.get(&(target.to_string(), z_order))
    }

    pub fn chain_mut(&mut self, target: &str, z_order: i32) -> Option<&mut CompositorChain> {
        self.chains.get_mut(&(target.to_string(), z_order))
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// The viewport has a chain with an enabled compositor
    pub fn has_active_chain(&self, target: &str, z_order: i32) -> bool {
        self.chain(target, z_order).is_some_and(CompositorChain::is_active)
    }

    /// Add compositor `name` to the chain of viewport `z_order` of `target`,
    /// creating the chain on first use
    ///
    /// The technique is picked for the viewport's material scheme. The new
    /// instance starts disabled.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` for an unknown compositor or viewport,
    /// `InvalidParams` when no technique is supported.
    pub fn add_compositor(
        &mut self,
        target: &RenderTarget,
        z_order: i32,
        name: &str,
        position: Option<usize>,
        capabilities: &RenderSystemCapabilities,
    ) -> Result<usize> {
        let Some(viewport) = target.viewport(z_order) else {
            engine_bail!(SOURCE, ItemNotFound, "Target '{}' has no viewport {}", target.name(), z_order);
        };
        let Some(compositor) = self.compositors.get(name) else {
            engine_bail!(SOURCE, ItemNotFound, "Compositor '{}' not found", name);
        };
        let scheme = viewport.material_scheme.as_deref().unwrap_or("");
        self.chains
            .entry((target.name().to_string(), z_order))
            .or_insert_with(|| CompositorChain::new(target.name(), z_order))
            .add_compositor(compositor.clone(), capabilities, scheme, position)
    }

    /// # Errors
    ///
    /// `ItemNotFound` when the viewport has no chain or the chain lacks
    /// the compositor.
    pub fn set_compositor_enabled(&mut self, target: &str, z_order: i32, name: &str, enabled: bool) -> Result<()> {
        let Some(chain) = self.chain_mut(target, z_order) else {
            engine_bail!(SOURCE, ItemNotFound, "Viewport {} of '{}' has no compositor chain", z_order, target);
        };
        chain.set_compositor_enabled_by_name(name, enabled)
    }

    pub fn remove_compositor_chain(&mut self, target: &str, z_order: i32) -> bool {
        self.chains.remove(&(target.to_string(), z_order)).is_some()
    }

    /// Drop every chain of `target`; returns how many were removed
    pub fn remove_chains_for_target(&mut self, target: &str) -> usize {
        let before = self.chains.len();
        self.chains.retain(|(name, _), _| name != target);
        before - self.chains.len()
    }

    // ===== TEXTURES =====

    pub fn pooled_texture_count(&self) -> usize {
        self.pool.len()
    }

    pub fn global_texture(&self, name: &str) -> Option<&Arc<dyn GpuTexture>> {
        self.global_textures.get(name)
    }

    /// Release pooled textures no compiled chain uses
    pub fn free_pooled_textures(&mut self) -> usize {
        self.pool.free_unused()
    }

    // ===== COMPILE / RENDER =====

    /// Compile the chain of viewport `z_order` of `target` now
    ///
    /// # Errors
    ///
    /// `ItemNotFound` when there is no chain, or whatever texture
    /// allocation and pass creation report.
    pub fn compile_chain(&mut self, target: &RenderTarget, z_order: i32, render_system: &SharedRenderSystem) -> Result<()> {
        let Self { chains, pool, global_textures, custom_passes, materials, .. } = self;
        let Some(chain) = chains.get_mut(&(target.name().to_string(), z_order)) else {
            engine_bail!(SOURCE, ItemNotFound,
                "Viewport {} of '{}' has no compositor chain", z_order, target.name());
        };
        let Some(viewport) = target.viewport(z_order) else {
            engine_bail!(SOURCE, ItemNotFound, "Target '{}' has no viewport {}", target.name(), z_order);
        };
        let rect = viewport.actual_rect();
        let mut rs = lock_render_system(render_system)?;
        chain.compile(&mut ChainCompileContext {
            render_system: &mut *rs,
            materials,
            pool,
            global_textures,
            custom_passes,
            target_width: rect.width,
            target_height: rect.height,
        })
    }

    /// Render the viewport through its chain, compiling it first when dirty
    ///
    /// Returns `None` when the viewport has no active chain and must be
    /// rendered directly.
    pub fn render_viewport(
        &mut self,
        target: &RenderTarget,
        z_order: i32,
        scene: &mut SceneManager,
        render_system: &SharedRenderSystem,
    ) -> Result<Option<usize>> {
        if !self.has_active_chain(target.name(), z_order) {
            return Ok(None);
        }
        if self.chain(target.name(), z_order).is_some_and(CompositorChain::is_dirty) {
            self.compile_chain(target, z_order, render_system)?;
        }
        let Some(viewport) = target.viewport(z_order) else {
            engine_bail!(SOURCE, ItemNotFound, "Target '{}' has no viewport {}", target.name(), z_order);
        };
        let Self { chains, materials, quad, auto_params, .. } = self;
        let Some(chain) = chains.get_mut(&(target.name().to_string(), z_order)) else {
            return Ok(None);
        };
        chain
            .render(&mut ChainRenderContext {
                render_system,
                target,
                viewport,
                scene,
                materials,
                quad,
                auto_params,
            })
            .map(Some)
    }

    /// Rebuild every compositor texture after targets changed size
    ///
    /// Enabled instances are disabled so their textures return to the
    /// pool, unused pooled and global textures are released, then the
    /// instances are re-enabled and their chains recompiled against the
    /// new sizes. Chains of targets that no longer exist are dropped.
    pub fn reconstruct_all_compositor_resources(
        &mut self,
        targets: &TargetManager,
        render_system: &SharedRenderSystem,
    ) -> Result<()> {
        let dropped = self.chains.len();
        self.chains.retain(|(name, _), _| targets.render_target(name).is_some());
        let dropped = dropped - self.chains.len();
        if dropped > 0 {
            engine_warn!(SOURCE, "{} compositor chains dropped with their targets", dropped);
        }

        let mut enabled: Vec<(ChainKey, Vec<usize>)> = Vec::new();
        for (key, chain) in &mut self.chains {
            let indices: Vec<usize> = (0..chain.num_compositors())
                .filter(|&i| chain.instance(i).is_some_and(|instance| instance.is_enabled()))
                .collect();
            for &index in &indices {
                chain.set_compositor_enabled(index, false)?;
            }
            enabled.push((key.clone(), indices));
        }
        let released = self.pool.free_unused();
        self.global_textures.clear();
        engine_info!(SOURCE, "Compositor resources released ({} pooled textures)", released);

        for ((name, z_order), indices) in enabled {
            if indices.is_empty() {
                continue;
            }
            if let Some(chain) = self.chains.get_mut(&(name.clone(), z_order)) {
                for index in indices {
                    chain.set_compositor_enabled(index, true)?;
                }
            }
            if let Some(target) = targets.render_target(&name) {
                self.compile_chain(target, z_order, render_system)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "compositor_manager_tests.rs"]
mod tests;
