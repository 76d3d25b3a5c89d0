//! Level-of-detail strategies shared by meshes and materials.

mod lod_strategy;
mod lod_strategy_manager;

pub use lod_strategy::{DistanceBoxLodStrategy, DistanceLodStrategy, LodStrategy, LodSubject, LodView, PixelCountLodStrategy};
pub use lod_strategy_manager::LodStrategyManager;

#[cfg(test)]
#[path = "lod_tests.rs"]
mod tests;
