/// Root - the engine context
///
/// Owns the render system, every manager, the scene managers, the render
/// targets and the compositor manager, and drives frames. Create one per
/// process; pass it by reference to whatever needs engine state.
///
/// # Example
///
/// ```no_run
/// use std::sync::{Arc, Mutex};
/// use ogre_engine::ogre::{Root, config::Environment, render::mock::MockRenderSystem};
///
/// let mut root = Root::new(Environment::from_env());
/// root.add_render_system(Arc::new(Mutex::new(MockRenderSystem::new())))?;
/// root.restore_config()?;
/// root.initialise()?;
/// root.create_scene_manager("main")?.create_camera("cam")?;
/// root.create_render_window("window", 1280, 720)?;
/// root.render_one_frame()?;
/// root.shutdown()?;
/// # Ok::<(), ogre_engine::ogre::Error>(())
/// ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::compositor::CompositorManager;
use crate::config::{ConfigFile, Environment, UNNAMED_SECTION};
use crate::error::Result;
use crate::gpu_program::GpuProgramManager;
use crate::hardware::HardwareBufferManager;
use crate::lod::LodStrategyManager;
use crate::material::MaterialManager;
use crate::render_system::{lock_render_system, SharedRenderSystem, TextureDesc};
use crate::resource::mesh::{MeshContext, MeshManager};
use crate::resource::texture::{TextureContext, TextureManager};
use crate::resource::{
    ResourceBackgroundQueue, ResourceGroupManager, DEFAULT_RESOURCE_GROUP_NAME,
    FILE_SYSTEM_ARCHIVE_TYPE,
};
use crate::scene::{SceneContext, SceneManager};
use crate::target::{RenderTarget, RenderTargetKind, TargetManager};
use crate::{engine_bail, engine_error, engine_info, engine_warn};

const SOURCE: &str = "ogre::Root";

/// Render-system config file name
pub const CONFIG_FILE_NAME: &str = "ogre.cfg";
/// Resource locations file name
pub const RESOURCES_FILE_NAME: &str = "resources.cfg";
/// Key of the unnamed section selecting the render system
pub const RENDER_SYSTEM_KEY: &str = "Render System";

// ============================================================================
// Frame listeners
// ============================================================================

/// Timing passed to frame listeners, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameEvent {
    /// Since the previous event of any kind
    pub time_since_last_event: f32,
    /// Since the same event in the previous frame
    pub time_since_last_frame: f32,
}

/// Hooks called around every frame
///
/// Returning `false` from any hook ends the rendering loop once the
/// current frame completes.
pub trait FrameListener: Send {
    /// Before any target is updated
    fn frame_started(&mut self, _event: &FrameEvent) -> bool {
        true
    }

    /// After every target was drawn, before buffers are swapped
    fn frame_rendering_queued(&mut self, _event: &FrameEvent) -> bool {
        true
    }

    /// After buffers were swapped
    fn frame_ended(&mut self, _event: &FrameEvent) -> bool {
        true
    }
}

pub type FrameListenerId = u64;

#[derive(Clone, Copy, PartialEq, Eq)]
enum FrameStage {
    Started,
    RenderingQueued,
    Ended,
}

/// Last time each frame stage fired
#[derive(Default)]
struct FrameTimes {
    started: Option<Instant>,
    rendering_queued: Option<Instant>,
    ended: Option<Instant>,
    last_event: Option<Instant>,
}

impl FrameTimes {
    fn event(&mut self, stage: FrameStage, now: Instant) -> FrameEvent {
        let seconds = |since: Option<Instant>| since.map(|t| (now - t).as_secs_f32()).unwrap_or(0.0);
        let slot = match stage {
            FrameStage::Started => &mut self.started,
            FrameStage::RenderingQueued => &mut self.rendering_queued,
            FrameStage::Ended => &mut self.ended,
        };
        let event = FrameEvent {
            time_since_last_event: seconds(self.last_event),
            time_since_last_frame: seconds(*slot),
        };
        *slot = Some(now);
        self.last_event = Some(now);
        event
    }
}

/// Handle asking a running loop to stop at the next frame boundary
#[derive(Clone)]
pub struct EndRenderingHandle(Arc<AtomicBool>);

impl EndRenderingHandle {
    pub fn queue_end_rendering(&self) {
        self.0.store(true, Ordering::Release);
    }
}

// ============================================================================
// Root
// ============================================================================

/// Managers that need an initialised render system
struct Subsystems {
    render_system: SharedRenderSystem,
    groups: Arc<ResourceGroupManager>,
    programs: GpuProgramManager,
    textures: Arc<TextureManager>,
    materials: Arc<MaterialManager>,
    buffers: Arc<HardwareBufferManager>,
    meshes: Arc<MeshManager>,
    lod_strategies: Arc<LodStrategyManager>,
    background: ResourceBackgroundQueue,
    compositors: CompositorManager,
}

pub struct Root {
    environment: Environment,
    render_systems: Vec<SharedRenderSystem>,
    active_render_system: Option<usize>,
    subsystems: Option<Subsystems>,
    scene_managers: BTreeMap<String, SceneManager>,
    targets: TargetManager,
    listeners: Vec<(FrameListenerId, Box<dyn FrameListener>)>,
    next_listener_id: FrameListenerId,
    end_rendering: Arc<AtomicBool>,
    microcode_cache_path: Option<PathBuf>,
    start_time: Instant,
    frame_times: FrameTimes,
    frame_count: u64,
}

impl Root {
    pub fn new(environment: Environment) -> Self {
        engine_info!(SOURCE, "*-*-* Root created");
        Self {
            environment,
            render_systems: Vec::new(),
            active_render_system: None,
            subsystems: None,
            scene_managers: BTreeMap::new(),
            targets: TargetManager::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            end_rendering: Arc::new(AtomicBool::new(false)),
            microcode_cache_path: None,
            start_time: Instant::now(),
            frame_times: FrameTimes::default(),
            frame_count: 0,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// `ogre.cfg` location, honouring `OGRE_CONFIG_DIR`
    pub fn config_path(&self) -> PathBuf {
        self.environment.config_path(CONFIG_FILE_NAME)
    }

    // ===== RENDER SYSTEMS =====

    /// Make a render system available; the first one becomes active
    ///
    /// # Errors
    ///
    /// `DuplicateItem` when one with the same name is already registered.
    pub fn add_render_system(&mut self, render_system: SharedRenderSystem) -> Result<()> {
        let name = lock_render_system(&render_system)?.name().to_string();
        if self.find_render_system(&name)?.is_some() {
            engine_bail!(SOURCE, DuplicateItem, "Render system '{}' already registered", name);
        }
        self.render_systems.push(render_system);
        if self.active_render_system.is_none() {
            self.active_render_system = Some(self.render_systems.len() - 1);
        }
        engine_info!(SOURCE, "Render system '{}' available", name);
        Ok(())
    }

    /// Names of the available render systems, in registration order
    pub fn available_render_systems(&self) -> Result<Vec<String>> {
        self.render_systems
            .iter()
            .map(|rs| Ok(lock_render_system(rs)?.name().to_string()))
            .collect()
    }

    /// # Errors
    ///
    /// `ItemNotFound` for an unknown name, `InvalidState` once initialised.
    pub fn set_render_system(&mut self, name: &str) -> Result<()> {
        if self.subsystems.is_some() {
            engine_bail!(SOURCE, InvalidState, "Cannot change render system after initialise");
        }
        let Some(index) = self.find_render_system(name)? else {
            engine_bail!(SOURCE, ItemNotFound, "Render system '{}' is not available", name);
        };
        self.active_render_system = Some(index);
        Ok(())
    }

    pub fn render_system(&self) -> Option<&SharedRenderSystem> {
        self.active_render_system.and_then(|i| self.render_systems.get(i))
    }

    fn find_render_system(&self, name: &str) -> Result<Option<usize>> {
        for (index, rs) in self.render_systems.iter().enumerate() {
            if lock_render_system(rs)?.name() == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    // ===== CONFIG =====

    /// Write the active render system and every render system's options
    /// to `ogre.cfg`
    ///
    /// An existing file is updated in place, so saving unchanged settings
    /// rewrites identical bytes.
    pub fn save_config(&self) -> Result<()> {
        let path = self.config_path();
        let mut config = if path.exists() { ConfigFile::load(&path)? } else { ConfigFile::new() };
        if let Some(rs) = self.render_system() {
            let name = lock_render_system(rs)?.name().to_string();
            config.set(UNNAMED_SECTION, RENDER_SYSTEM_KEY, &name);
        }
        for rs in &self.render_systems {
            let rs = lock_render_system(rs)?;
            for option in rs.config_options() {
                config.set(rs.name(), &option.name, &option.current_value);
            }
        }
        config.save(&path)?;
        engine_info!(SOURCE, "Configuration saved to '{}'", path.display());
        Ok(())
    }

    /// Apply `ogre.cfg` to the available render systems
    ///
    /// Returns `false` when there is no file or it names an unavailable
    /// render system. Options a render system rejects are skipped.
    pub fn restore_config(&mut self) -> Result<bool> {
        let path = self.config_path();
        if !path.exists() {
            engine_info!(SOURCE, "No configuration at '{}'", path.display());
            return Ok(false);
        }
        let config = ConfigFile::load(&path)?;
        for rs in &self.render_systems {
            let mut rs = lock_render_system(rs)?;
            let name = rs.name().to_string();
            for (key, value) in config.section(&name) {
                if let Err(e) = rs.set_config_option(key, value) {
                    engine_warn!(SOURCE, "Option '{}' of '{}' ignored: {}", key, name, e);
                }
            }
        }
        let Some(selected) = config.get(UNNAMED_SECTION, RENDER_SYSTEM_KEY) else {
            return Ok(false);
        };
        match self.find_render_system(selected)? {
            Some(index) if self.subsystems.is_none() => {
                self.active_render_system = Some(index);
                Ok(true)
            }
            Some(index) => Ok(self.active_render_system == Some(index)),
            None => {
                engine_warn!(SOURCE, "Configured render system '{}' is not available", selected);
                Ok(false)
            }
        }
    }

    // ===== LIFECYCLE =====

    /// File the microcode cache is loaded from at initialise and saved to
    /// at shutdown
    pub fn set_microcode_cache_path(&mut self, path: Option<PathBuf>) {
        self.microcode_cache_path = path;
    }

    pub fn is_initialised(&self) -> bool {
        self.subsystems.is_some()
    }

    /// Initialise the active render system and build every manager
    ///
    /// Locations from `resources.cfg` and `OGRE_MEDIA_DIR` are added when
    /// present. The microcode cache is loaded when a cache path is set and
    /// the file exists.
    ///
    /// # Errors
    ///
    /// `InvalidState` when already initialised or no render system is
    /// available.
    pub fn initialise(&mut self) -> Result<()> {
        if self.subsystems.is_some() {
            engine_bail!(SOURCE, InvalidState, "Root already initialised");
        }
        let Some(render_system) = self.render_system().cloned() else {
            engine_bail!(SOURCE, InvalidState, "No render system available");
        };
        let factory = {
            let mut rs = lock_render_system(&render_system)?;
            rs.initialise()?;
            engine_info!(SOURCE, "Render system '{}' initialised", rs.name());
            rs.hardware_buffer_factory()
        };

        let groups = Arc::new(ResourceGroupManager::new());
        let registry = groups.registry().clone();
        let programs = GpuProgramManager::new(registry.clone(), render_system.clone());
        let textures = Arc::new(TextureManager::new(
            registry.clone(),
            Arc::new(TextureContext::new(render_system.clone())),
        ));
        let materials = Arc::new(MaterialManager::new(
            registry.clone(),
            render_system.clone(),
            programs.programs().clone(),
            textures.clone(),
        )?);
        let buffers = Arc::new(HardwareBufferManager::new(factory));
        let meshes = Arc::new(MeshManager::new(registry, Arc::new(MeshContext::new(buffers.clone()))));
        groups.register_resource_manager(programs.programs().clone());
        groups.register_resource_manager(textures.clone());
        groups.register_resource_manager(materials.materials().clone());
        groups.register_resource_manager(meshes.clone());

        self.add_configured_locations(&groups)?;
        if let Some(path) = self.microcode_cache_path.as_deref().filter(|p| p.exists()) {
            let count = programs.load_microcode_cache_from_file(path)?;
            engine_info!(SOURCE, "Loaded {} microcodes from '{}'", count, path.display());
        }

        let background = ResourceBackgroundQueue::new(groups.clone(), 1)?;
        let compositors = CompositorManager::new(materials.clone(), &buffers)?;
        self.subsystems = Some(Subsystems {
            render_system,
            groups,
            programs,
            textures,
            materials,
            buffers,
            meshes,
            lod_strategies: Arc::new(LodStrategyManager::new()),
            background,
            compositors,
        });
        self.start_time = Instant::now();
        self.frame_times = FrameTimes::default();
        engine_info!(SOURCE, "*-*-* Root initialised");
        Ok(())
    }

    fn add_configured_locations(&self, groups: &ResourceGroupManager) -> Result<()> {
        let resources = self.environment.config_path(RESOURCES_FILE_NAME);
        if resources.exists() {
            groups.add_locations_from_config(&ConfigFile::load(&resources)?)?;
        }
        if let Some(media) = self.environment.media_dir.as_deref().and_then(Path::to_str) {
            if Path::new(media).is_dir() {
                groups.add_resource_location(media, FILE_SYSTEM_ARCHIVE_TYPE, DEFAULT_RESOURCE_GROUP_NAME, true)?;
            } else {
                engine_warn!(SOURCE, "Media directory '{}' does not exist", media);
            }
        }
        Ok(())
    }

    /// Tear everything down and save the configuration
    ///
    /// Waits for background work, persists the microcode cache when it
    /// changed and saving is enabled, releases scenes, targets and GPU
    /// resources, then shuts the render system down.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(mut subsystems) = self.subsystems.take() {
            subsystems.background.shutdown();
            if let Some(path) = &self.microcode_cache_path {
                let programs = &subsystems.programs;
                if programs.save_microcodes_to_cache() && programs.is_cache_dirty() {
                    programs.save_microcode_cache_to_file(path)?;
                    engine_info!(SOURCE, "Microcode cache saved to '{}'", path.display());
                }
            }
            self.scene_managers.clear();
            self.targets.clear();
            let render_system = subsystems.render_system.clone();
            drop(subsystems);
            lock_render_system(&render_system)?.shutdown();
            engine_info!(SOURCE, "*-*-* Root shut down");
        }
        self.save_config()
    }

    // ===== SUBSYSTEMS =====

    fn subsystems(&self) -> Result<&Subsystems> {
        match &self.subsystems {
            Some(subsystems) => Ok(subsystems),
            None => Err(crate::engine_err!(SOURCE, InvalidState, "Root is not initialised")),
        }
    }

    fn subsystems_mut(&mut self) -> Result<&mut Subsystems> {
        match &mut self.subsystems {
            Some(subsystems) => Ok(subsystems),
            None => Err(crate::engine_err!(SOURCE, InvalidState, "Root is not initialised")),
        }
    }

    pub fn resource_groups(&self) -> Result<&Arc<ResourceGroupManager>> {
        Ok(&self.subsystems()?.groups)
    }

    pub fn gpu_programs(&self) -> Result<&GpuProgramManager> {
        Ok(&self.subsystems()?.programs)
    }

    pub fn gpu_programs_mut(&mut self) -> Result<&mut GpuProgramManager> {
        Ok(&mut self.subsystems_mut()?.programs)
    }

    pub fn textures(&self) -> Result<&Arc<TextureManager>> {
        Ok(&self.subsystems()?.textures)
    }

    pub fn materials(&self) -> Result<&Arc<MaterialManager>> {
        Ok(&self.subsystems()?.materials)
    }

    pub fn hardware_buffers(&self) -> Result<&Arc<HardwareBufferManager>> {
        Ok(&self.subsystems()?.buffers)
    }

    pub fn meshes(&self) -> Result<&Arc<MeshManager>> {
        Ok(&self.subsystems()?.meshes)
    }

    pub fn lod_strategies(&self) -> Result<&Arc<LodStrategyManager>> {
        Ok(&self.subsystems()?.lod_strategies)
    }

    pub fn background_queue_mut(&mut self) -> Result<&mut ResourceBackgroundQueue> {
        Ok(&mut self.subsystems_mut()?.background)
    }

    pub fn compositors(&self) -> Result<&CompositorManager> {
        Ok(&self.subsystems()?.compositors)
    }

    pub fn compositors_mut(&mut self) -> Result<&mut CompositorManager> {
        Ok(&mut self.subsystems_mut()?.compositors)
    }

    // ===== SCENE MANAGERS =====

    /// # Errors
    ///
    /// `DuplicateItem` when the name is taken, `InvalidState` before
    /// initialise.
    pub fn create_scene_manager(&mut self, name: &str) -> Result<&mut SceneManager> {
        if self.scene_managers.contains_key(name) {
            engine_bail!(SOURCE, DuplicateItem, "Scene manager '{}' already exists", name);
        }
        let subsystems = self.subsystems()?;
        let context = SceneContext {
            materials: subsystems.materials.clone(),
            meshes: subsystems.meshes.clone(),
            buffers: subsystems.buffers.clone(),
            lod_strategies: subsystems.lod_strategies.clone(),
        };
        Ok(self
            .scene_managers
            .entry(name.to_string())
            .or_insert_with(|| SceneManager::new(name, context)))
    }

    pub fn scene_manager(&self, name: &str) -> Option<&SceneManager> {
        self.scene_managers.get(name)
    }

    pub fn scene_manager_mut(&mut self, name: &str) -> Option<&mut SceneManager> {
        self.scene_managers.get_mut(name)
    }

    pub fn destroy_scene_manager(&mut self, name: &str) -> bool {
        self.scene_managers.remove(name).is_some()
    }

    // ===== TARGETS =====

    pub fn targets(&self) -> &TargetManager {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetManager {
        &mut self.targets
    }

    pub fn create_render_window(&mut self, name: &str, width: u32, height: u32) -> Result<&mut RenderTarget> {
        self.targets.create_render_window(name, width, height)
    }

    /// # Errors
    ///
    /// `InvalidState` before initialise, plus what target creation reports.
    pub fn create_render_texture(&mut self, desc: &TextureDesc) -> Result<&mut RenderTarget> {
        let render_system = self.subsystems()?.render_system.clone();
        let mut rs = lock_render_system(&render_system)?;
        self.targets.create_render_texture(desc, &mut *rs)
    }

    /// Remove a target with its compositor chains
    pub fn remove_render_target(&mut self, name: &str) -> Option<RenderTarget> {
        if let Some(subsystems) = self.subsystems.as_mut() {
            subsystems.compositors.remove_chains_for_target(name);
        }
        self.targets.remove_render_target(name)
    }

    /// Resize a target and rebuild every compositor texture for the new size
    pub fn resize_render_target(&mut self, name: &str, width: u32, height: u32) -> Result<()> {
        let Self { targets, subsystems, .. } = self;
        let Some(subsystems) = subsystems.as_mut() else {
            engine_bail!(SOURCE, InvalidState, "Root is not initialised");
        };
        {
            let mut rs = lock_render_system(&subsystems.render_system)?;
            targets.resize_target(name, width, height, &mut *rs)?;
        }
        subsystems
            .compositors
            .reconstruct_all_compositor_resources(targets, &subsystems.render_system)
    }

    // ===== COMPOSITORS =====

    /// Add a registered compositor to a viewport's chain (disabled)
    pub fn add_compositor(&mut self, target: &str, z_order: i32, compositor: &str, position: Option<usize>) -> Result<usize> {
        let Self { targets, subsystems, .. } = self;
        let Some(subsystems) = subsystems.as_mut() else {
            engine_bail!(SOURCE, InvalidState, "Root is not initialised");
        };
        let Some(render_target) = targets.render_target(target) else {
            engine_bail!(SOURCE, ItemNotFound, "Render target '{}' not found", target);
        };
        let capabilities = lock_render_system(&subsystems.render_system)?.capabilities().clone();
        subsystems
            .compositors
            .add_compositor(render_target, z_order, compositor, position, &capabilities)
    }

    pub fn set_compositor_enabled(&mut self, target: &str, z_order: i32, compositor: &str, enabled: bool) -> Result<()> {
        self.subsystems_mut()?
            .compositors
            .set_compositor_enabled(target, z_order, compositor, enabled)
    }

    // ===== FRAME LISTENERS =====

    pub fn add_frame_listener(&mut self, listener: Box<dyn FrameListener>) -> FrameListenerId {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_frame_listener(&mut self, id: FrameListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn fire(&mut self, stage: FrameStage) -> bool {
        let event = self.frame_times.event(stage, Instant::now());
        let mut keep_going = true;
        for (_, listener) in &mut self.listeners {
            let result = match stage {
                FrameStage::Started => listener.frame_started(&event),
                FrameStage::RenderingQueued => listener.frame_rendering_queued(&event),
                FrameStage::Ended => listener.frame_ended(&event),
            };
            keep_going &= result;
        }
        keep_going
    }

    // ===== FRAMES =====

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Seconds since initialise
    pub fn elapsed_time(&self) -> f32 {
        self.start_time.elapsed().as_secs_f32()
    }

    /// Stop [`start_rendering`](Self::start_rendering) once the current
    /// frame completes
    pub fn queue_end_rendering(&self) {
        self.end_rendering.store(true, Ordering::Release);
    }

    pub fn end_rendering_handle(&self) -> EndRenderingHandle {
        EndRenderingHandle(self.end_rendering.clone())
    }

    pub fn is_end_rendering_queued(&self) -> bool {
        self.end_rendering.load(Ordering::Acquire)
    }

    /// Render until a frame listener returns `false` or end of rendering
    /// is queued
    pub fn start_rendering(&mut self) -> Result<()> {
        self.subsystems()?;
        self.end_rendering.store(false, Ordering::Release);
        while !self.is_end_rendering_queued() {
            if !self.render_one_frame()? {
                break;
            }
        }
        engine_info!(SOURCE, "Rendering loop ended after {} frames", self.frame_count);
        Ok(())
    }

    /// Fire listeners, dispatch background responses, update every target
    /// and swap window buffers
    ///
    /// Returns `false` when a listener asked to stop. Targets update in
    /// priority order (render textures before windows); each viewport goes
    /// through its compositor chain when one is active.
    pub fn render_one_frame(&mut self) -> Result<bool> {
        self.subsystems()?;
        let mut keep_going = self.fire(FrameStage::Started);

        let time = self.elapsed_time();
        for scene in self.scene_managers.values_mut() {
            scene.set_time(time);
        }
        let windows = self.update_all_render_targets()?;
        keep_going &= self.fire(FrameStage::RenderingQueued);

        let render_system = self.subsystems()?.render_system.clone();
        for window in &windows {
            lock_render_system(&render_system)?.swap_buffers(window)?;
        }
        keep_going &= self.fire(FrameStage::Ended);
        self.frame_count += 1;
        Ok(keep_going)
    }

    /// Returns the names of the windows drawn
    fn update_all_render_targets(&mut self) -> Result<Vec<String>> {
        let frame = self.frame_count;
        let Self { targets, scene_managers, subsystems, .. } = self;
        let Some(subsystems) = subsystems.as_mut() else {
            engine_bail!(SOURCE, InvalidState, "Root is not initialised");
        };
        subsystems.background.process_responses();
        let render_system = subsystems.render_system.clone();

        lock_render_system(&render_system)?.begin_frame()?;
        let mut drawn = Vec::new();
        let mut windows = Vec::new();
        let result = (|| -> Result<()> {
            for name in targets.update_order() {
                let Some(target) = targets.render_target(&name) else { continue };
                let mut batches = 0;
                for viewport in target.viewports() {
                    let Some(scene) = scene_managers.get_mut(viewport.scene_manager()) else {
                        engine_warn!(SOURCE, "Viewport {} of '{}': scene manager '{}' not found",
                            viewport.z_order(), name, viewport.scene_manager());
                        continue;
                    };
                    let composited = subsystems
                        .compositors
                        .render_viewport(target, viewport.z_order(), scene, &render_system)?;
                    batches += match composited {
                        Some(count) => count,
                        None => {
                            {
                                let mut rs = lock_render_system(&render_system)?;
                                rs.set_render_target(target)?;
                                if viewport.clear_every_frame {
                                    viewport.clear(&mut *rs);
                                }
                            }
                            scene.render_scene(viewport.camera(), &render_system, &viewport.render_options())?
                        }
                    };
                }
                if target.kind() == RenderTargetKind::Window {
                    windows.push(name.clone());
                }
                drawn.push((name, batches));
            }
            Ok(())
        })();
        let ended = lock_render_system(&render_system)?.end_frame();
        if let Err(e) = &result {
            engine_error!(SOURCE, "Frame {} failed: {}", frame, e);
        }
        result?;
        ended?;

        for (name, batches) in drawn {
            if let Some(target) = targets.render_target_mut(&name) {
                target.notify_frame_rendered(batches);
            }
        }
        Ok(windows)
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        if self.subsystems.is_some() {
            if let Err(e) = self.shutdown() {
                engine_error!(SOURCE, "Shutdown on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "root_tests.rs"]
mod tests;
