use std::collections::HashMap;

use super::{BlockCategory, BlockId, BlockProperties};

/// Registry that stores the physical properties of every known block type
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    blocks: HashMap<BlockId, BlockProperties>,
    name_to_id: HashMap<String, BlockId>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BlockRegistry {
    /// Empty registry; unknown blocks are treated as air
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            name_to_id: HashMap::new(),
        }
    }

    /// Registry pre-populated with the vanilla-like block set
    pub fn with_defaults() -> Self {
        use BlockCategory::*;

        let mut registry = Self::new();
        registry.register("air", BlockId::AIR, BlockProperties::new(0.0, 1.0, Air));
        registry.register("grass", BlockId::GRASS, BlockProperties::new(0.6, 1.0, Grass));
        registry.register("dirt", BlockId::DIRT, BlockProperties::new(0.5, 1.0, Ground));
        registry.register("stone", BlockId::STONE, BlockProperties::new(1.5, 1.0, Ground));
        registry.register("sand", BlockId::SAND, BlockProperties::new(0.5, 1.0, Ground));
        registry.register("water", BlockId::WATER, BlockProperties::new(100.0, 1.0, Fluid));
        registry.register("log", BlockId::LOG, BlockProperties::new(2.0, 1.0, Log));
        registry.register(
            "stripped_log",
            BlockId::STRIPPED_LOG,
            BlockProperties::new(2.0, 1.0, StrippedLog),
        );
        registry.register("leaves", BlockId::LEAVES, BlockProperties::new(0.2, 1.0, Leaves));
        registry.register("planks", BlockId::PLANKS, BlockProperties::new(2.0, 1.0, Structure));
        registry.register(
            "cobblestone",
            BlockId::COBBLESTONE,
            BlockProperties::new(2.0, 1.0, Structure),
        );
        registry.register("brick", BlockId::BRICK, BlockProperties::new(2.0, 1.0, Structure));
        registry.register("glass", BlockId::GLASS, BlockProperties::new(0.3, 1.0, Structure));
        registry.register("bedrock", BlockId::BEDROCK, BlockProperties::new(-1.0, 1.0, Ground));
        registry.register("tall_grass", BlockId::TALL_GRASS, BlockProperties::new(0.0, 1.0, Plant));
        registry.register("obsidian", BlockId::OBSIDIAN, BlockProperties::new(50.0, 1.0, Structure));
        registry
    }

    /// Register or replace a block type
    pub fn register(&mut self, name: &str, id: BlockId, properties: BlockProperties) {
        if self.blocks.insert(id, properties).is_some() {
            log::debug!("Replaced block properties for '{}' ({})", name, id.0);
        }
        self.name_to_id.insert(name.to_string(), id);
    }

    /// Register the weather mod's scouring marker blocks
    pub fn register_scouring_markers(&mut self) {
        self.register(
            "medium_scoured",
            BlockId::MEDIUM_SCOURED,
            BlockProperties::new(0.6, 1.0, BlockCategory::ScouredGround),
        );
        self.register(
            "heavy_scoured",
            BlockId::HEAVY_SCOURED,
            BlockProperties::new(0.8, 1.0, BlockCategory::ScouredGround),
        );
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockProperties> {
        self.blocks.get(&id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    pub fn get_id(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    pub fn category(&self, id: BlockId) -> BlockCategory {
        self.blocks
            .get(&id)
            .map(|p| p.category)
            .unwrap_or(BlockCategory::Air)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
