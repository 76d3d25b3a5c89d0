//! Material module: materials, techniques, passes and texture units.

mod material;
mod material_manager;
mod technique;
mod pass;
mod texture_unit_state;

pub use material::{Material, MaterialContext};
pub use material_manager::{
    MaterialManager, MaterialSchemes, SchemeNotFoundListener, DEFAULT_SCHEME_INDEX,
};
pub use technique::{CompileFailure, CompileResult, Technique, DEFAULT_SCHEME_NAME};
pub use pass::{Pass, PassProgramUsage};
pub use texture_unit_state::{
    LayerBlendOperation, TexCoordGeneration, TextureContentType, TextureUnitState,
};
