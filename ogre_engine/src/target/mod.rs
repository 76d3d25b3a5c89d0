//! Render target management module
//!
//! A render target defines where a scene gets rendered to (window or
//! texture); viewports split it between cameras.

mod render_target;
mod viewport;
mod target_manager;

pub use render_target::{
    FrameStats, RenderTarget, RenderTargetKind, RENDER_TEXTURE_PRIORITY, RENDER_WINDOW_PRIORITY,
};
pub use viewport::Viewport;
pub use target_manager::TargetManager;
