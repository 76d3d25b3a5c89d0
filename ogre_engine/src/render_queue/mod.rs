//! Render queue: renderables grouped, sorted and handed to a visitor.

mod renderable;
mod render_queue;

pub use renderable::Renderable;
pub use render_queue::{
    QueuedRenderable, RenderPriorityGroup, RenderQueue, RenderQueueGroup, RenderQueueVisitor,
    DEFAULT_RENDERABLE_PRIORITY, RENDER_QUEUE_BACKGROUND, RENDER_QUEUE_MAIN, RENDER_QUEUE_MAX,
    RENDER_QUEUE_OVERLAY, RENDER_QUEUE_SKIES_EARLY, RENDER_QUEUE_SKIES_LATE,
    RENDER_QUEUE_WORLD_GEOMETRY_1, RENDER_QUEUE_WORLD_GEOMETRY_2,
};
