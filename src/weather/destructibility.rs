use std::collections::HashMap;

use crate::constants::strength::{BASE_THRESHOLD, FALLBACK_RELATIVE_HARDNESS, HARDNESS_SCALE};
use crate::world::{BlockId, BlockProperties, BlockRegistry};

/// Maps block types to the windspeed (mph) needed to destroy them
#[derive(Debug, Clone, Default)]
pub struct BlockDestructibility {
    overrides: HashMap<BlockId, f32>,
}

impl BlockDestructibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the weather mod's configured strengths where present
    pub fn with_overrides(overrides: HashMap<BlockId, f32>) -> Self {
        let overrides = overrides
            .into_iter()
            .filter(|(_, mph)| mph.is_finite() && *mph >= 0.0)
            .collect();
        Self { overrides }
    }

    pub fn set_overrides(&mut self, overrides: Option<HashMap<BlockId, f32>>) {
        *self = match overrides {
            Some(table) => Self::with_overrides(table),
            None => Self::new(),
        };
    }

    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Windspeed required to destroy `block`
    pub fn threshold(&self, block: BlockId, registry: &BlockRegistry) -> f32 {
        if let Some(mph) = self.overrides.get(&block) {
            return *mph;
        }
        let relative = registry
            .get(block)
            .map(relative_hardness)
            .unwrap_or(FALLBACK_RELATIVE_HARDNESS);
        BASE_THRESHOLD + relative.sqrt() * HARDNESS_SCALE
    }

    /// Whether wind of `windspeed` destroys `block`
    pub fn is_destroyed(&self, block: BlockId, windspeed: f32, registry: &BlockRegistry) -> bool {
        windspeed >= self.threshold(block, registry)
    }
}

/// Destroy time normalised by the reference tool's effectiveness
fn relative_hardness(properties: &BlockProperties) -> f32 {
    let relative = properties.hardness / properties.tool_speed;
    if properties.hardness < 0.0 || !relative.is_finite() || relative < 0.0 {
        FALLBACK_RELATIVE_HARDNESS
    } else {
        relative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::BlockCategory;

    #[test]
    fn test_formula_thresholds() {
        let registry = BlockRegistry::with_defaults();
        let d = BlockDestructibility::new();
        let grass = d.threshold(BlockId::GRASS, &registry);
        assert!((grass - (60.0 + 0.6f32.sqrt() * 60.0)).abs() < 1e-3);
        assert!(d.threshold(BlockId::STONE, &registry) > grass);
    }

    #[test]
    fn test_unbreakable_falls_back() {
        let registry = BlockRegistry::with_defaults();
        let d = BlockDestructibility::new();
        assert!((d.threshold(BlockId::BEDROCK, &registry) - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_tool_speed_falls_back() {
        let mut registry = BlockRegistry::new();
        registry.register("odd", BlockId(300), BlockProperties::new(4.0, 0.0, BlockCategory::Structure));
        let d = BlockDestructibility::new();
        assert!((d.threshold(BlockId(300), &registry) - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_override_wins() {
        let registry = BlockRegistry::with_defaults();
        let mut table = HashMap::new();
        table.insert(BlockId::GLASS, 45.0);
        table.insert(BlockId::BRICK, f32::NAN);
        let d = BlockDestructibility::with_overrides(table);
        assert_eq!(d.threshold(BlockId::GLASS, &registry), 45.0);
        assert!(d.is_destroyed(BlockId::GLASS, 50.0, &registry));
        assert!(d.threshold(BlockId::BRICK, &registry).is_finite());
    }
}
