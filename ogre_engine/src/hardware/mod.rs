/// Hardware buffer layer - GPU buffers, vertex layouts and pixel formats

pub mod hardware_buffer;
pub mod hardware_buffer_manager;
pub mod pixel_buffer;
pub mod pixel_format;
pub mod vertex_data;
pub mod vertex_declaration;

pub use hardware_buffer::*;
pub use hardware_buffer_manager::*;
pub use pixel_buffer::*;
pub use pixel_format::*;
pub use vertex_data::*;
pub use vertex_declaration::*;
