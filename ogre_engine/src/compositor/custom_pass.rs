/// Custom composition passes.
///
/// Users register a `CustomCompositionPass` under a type name; every
/// `RenderCustom` pass of that type asks it for a `CompositorOperation` when
/// its chain compiles, and the operation runs each time the pass executes.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::render_system::SharedRenderSystem;
use crate::scene::SceneManager;

/// Work recorded by a custom pass into the current target
pub trait CompositorOperation: Send {
    fn execute(&mut self, scene: &mut SceneManager, render_system: &SharedRenderSystem) -> Result<()>;
}

/// Factory of operations for one custom pass type
pub trait CustomCompositionPass: Send + Sync {
    /// Build the operation of a `RenderCustom` pass in `compositor`
    fn create_operation(
        &self,
        compositor: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Box<dyn CompositorOperation>>;
}

/// Closure-backed operation
pub struct CustomOperation {
    callback: Box<dyn FnMut(&mut SceneManager, &SharedRenderSystem) -> Result<()> + Send>,
}

impl CustomOperation {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&mut SceneManager, &SharedRenderSystem) -> Result<()> + Send + 'static,
    {
        Self { callback: Box::new(callback) }
    }
}

impl CompositorOperation for CustomOperation {
    fn execute(&mut self, scene: &mut SceneManager, render_system: &SharedRenderSystem) -> Result<()> {
        (self.callback)(scene, render_system)
    }
}
