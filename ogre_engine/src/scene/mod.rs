//! Scene module
//!
//! Scene graph, movable objects, culling strategies and the scene manager
//! that turns a camera view into render queue contents and draw calls.

mod aabb;
mod scene_graph;
mod movable_object;
mod light;
mod simple_renderable;
mod entity;
mod culler;
mod pass_renderer;
mod scene_manager;

pub use aabb::AABB;
pub use scene_graph::{SceneGraph, SceneNode, SceneNodeKey};
pub use movable_object::{
    MovableObject, MovableObjectBase, MovableObjectKey, MovableRenderContext, ALL_VISIBILITY_FLAGS,
};
pub use light::{Light, LightType};
pub use simple_renderable::{Rectangle2D, SimpleRenderable};
pub use entity::{Entity, SubEntity};
pub use culler::{BruteForceCuller, CameraCuller, FrustumCuller};
pub use pass_renderer::{compositor_texture_key, CompositorTextureMap, PassRenderer};
pub use scene_manager::{
    RenderSceneOptions, SceneContext, SceneManager, SpecialCaseRenderQueueMode,
};
