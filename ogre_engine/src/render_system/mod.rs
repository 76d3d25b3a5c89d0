/// Render system module - the backend contract and its mock implementation

pub mod render_system;
pub mod render_state;
pub mod capabilities;
pub mod render_operation;
pub mod gpu_objects;
pub mod mock;

pub use render_system::*;
pub use render_state::*;
pub use capabilities::*;
pub use render_operation::*;
pub use gpu_objects::*;
