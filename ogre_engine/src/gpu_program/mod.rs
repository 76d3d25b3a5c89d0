//! GPU program module: compiled shaders, their parameters and the
//! microcode cache.

mod gpu_program;
mod gpu_program_manager;
mod parameters;
mod auto_param_data_source;
mod microcode_cache;

pub use gpu_program::{GpuProgram, GpuProgramContext, GpuProgramType};
pub use gpu_program_manager::GpuProgramManager;
pub use parameters::{
    AutoConstantEntry, AutoConstantType, GpuConstantDefinition, GpuParamVariability,
    GpuProgramParameters,
};
pub use auto_param_data_source::{AutoParamDataSource, LightParams};
pub use microcode_cache::{MicrocodeCache, MICROCODE_CACHE_MAGIC, MICROCODE_CACHE_VERSION};
