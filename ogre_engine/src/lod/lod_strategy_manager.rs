/// Registry of LOD strategies, looked up by name from meshes and materials

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::engine_bail;
use crate::error::Result;
use super::lod_strategy::{DistanceBoxLodStrategy, DistanceLodStrategy, LodStrategy, PixelCountLodStrategy};

const SOURCE: &str = "ogre::LodStrategyManager";

pub struct LodStrategyManager {
    strategies: FxHashMap<&'static str, Arc<dyn LodStrategy>>,
    default_strategy: Arc<dyn LodStrategy>,
}

impl LodStrategyManager {
    /// Registry holding the distance (default), box distance and pixel
    /// count strategies
    pub fn new() -> Self {
        let distance: Arc<dyn LodStrategy> = Arc::new(DistanceLodStrategy);
        let builtins: [Arc<dyn LodStrategy>; 2] = [Arc::new(DistanceBoxLodStrategy), Arc::new(PixelCountLodStrategy)];
        let mut strategies = FxHashMap::default();
        strategies.insert(distance.name(), distance.clone());
        for strategy in builtins {
            strategies.insert(strategy.name(), strategy);
        }
        Self { strategies, default_strategy: distance }
    }

    pub fn add_strategy(&mut self, strategy: Arc<dyn LodStrategy>) -> Result<()> {
        if self.strategies.contains_key(strategy.name()) {
            engine_bail!(SOURCE, DuplicateItem, "LOD strategy '{}' already registered", strategy.name());
        }
        self.strategies.insert(strategy.name(), strategy);
        Ok(())
    }

    pub fn strategy(&self, name: &str) -> Option<Arc<dyn LodStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Named strategy, or the default one for unknown names
    pub fn strategy_or_default(&self, name: &str) -> Arc<dyn LodStrategy> {
        self.strategy(name).unwrap_or_else(|| self.default_strategy.clone())
    }

    pub fn default_strategy(&self) -> &Arc<dyn LodStrategy> {
        &self.default_strategy
    }

    pub fn set_default_strategy(&mut self, name: &str) -> Result<()> {
        let Some(strategy) = self.strategy(name) else {
            engine_bail!(SOURCE, ItemNotFound, "LOD strategy '{}' not registered", name);
        };
        self.default_strategy = strategy;
        Ok(())
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for LodStrategyManager {
    fn default() -> Self {
        Self::new()
    }
}
