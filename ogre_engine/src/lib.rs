/*!
# OGRE Engine

Retained-mode render pipeline core: a scene graph of nodes and movable
objects, named resources loaded through groups and archives, materials with
techniques and passes, a render queue with priority groups, and a
post-processing compositor, all driving an abstract render system.

The API is backend-agnostic. Concrete render systems implement the
`RenderSystem` trait; a recording mock backend ships with the crate for
headless use and tests.

## Architecture

- **Root**: engine context owning every manager and driving frames
- **ResourceGroupManager**: groups, archives, declarations, background loads
- **MaterialManager**: materials, techniques, passes, schemes
- **SceneManager**: scene graph, cameras, culling, render queue
- **TargetManager**: windows and render textures with their viewports
- **CompositorManager**: per-viewport post-processing chains
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod work_queue;
pub mod resource;
pub mod hardware;
pub mod render_system;
pub mod gpu_program;
pub mod material;
pub mod lod;
pub mod camera;
pub mod scene;
pub mod render_queue;
pub mod target;
pub mod compositor;
mod root;

#[cfg(test)]
mod test_support;

// Main ogre namespace module
pub mod ogre {
    // Error types
    pub use crate::error::{Error, ErrorKind, Result};

    // Logging facade
    pub use crate::engine::Engine;

    // Engine context
    pub use crate::root::{
        EndRenderingHandle, FrameEvent, FrameListener, FrameListenerId, Root,
        CONFIG_FILE_NAME, RENDER_SYSTEM_KEY, RESOURCES_FILE_NAME,
    };

    // Logging sub-module (types only; the engine_* macros are exported at the crate root)
    pub mod log {
        pub use crate::log::*;
    }

    pub mod config {
        pub use crate::config::*;
    }

    // Render system abstraction and the mock backend
    pub mod render {
        pub use crate::render_system::*;
        pub use crate::render_system::mock;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod hardware {
        pub use crate::hardware::*;
    }

    pub mod gpu_program {
        pub use crate::gpu_program::*;
    }

    pub mod material {
        pub use crate::material::*;
    }

    pub mod lod {
        pub use crate::lod::*;
    }

    pub mod camera {
        pub use crate::camera::*;
    }

    pub mod scene {
        pub use crate::scene::*;
    }

    pub mod render_queue {
        pub use crate::render_queue::*;
    }

    pub mod target {
        pub use crate::target::*;
    }

    pub mod compositor {
        pub use crate::compositor::*;
    }

    pub mod work_queue {
        pub use crate::work_queue::*;
    }
}

// Re-export math library at crate root
pub use glam;
