//! Compositor module
//!
//! Post-processing definitions, the chains that apply them to viewports,
//! the shared texture pool and custom pass hooks.

mod compositor;
mod custom_pass;
mod texture_pool;
mod compositor_instance;
mod compositor_chain;
mod compositor_manager;

pub use compositor::{
    CompositionPass, CompositionTargetPass, CompositionTechnique, Compositor, InputMode, QuadInput,
    TextureDefinition, TextureReference, TextureScope, TextureSize,
};
pub use custom_pass::{CompositorOperation, CustomCompositionPass, CustomOperation};
pub use texture_pool::{PoolKey, TexturePool};
pub use compositor_instance::{CompositorInstance, InstanceState};
pub use compositor_chain::{CompositorChain, TargetOperation};
pub use compositor_manager::CompositorManager;
