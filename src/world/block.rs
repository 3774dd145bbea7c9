use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a block type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct BlockId(pub u16);

impl Default for BlockId {
    fn default() -> Self {
        BlockId::AIR
    }
}

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const GRASS: BlockId = BlockId(1);
    pub const DIRT: BlockId = BlockId(2);
    pub const STONE: BlockId = BlockId(3);
    pub const SAND: BlockId = BlockId(4);
    pub const WATER: BlockId = BlockId(5);
    pub const LOG: BlockId = BlockId(6);
    pub const STRIPPED_LOG: BlockId = BlockId(7);
    pub const LEAVES: BlockId = BlockId(8);
    pub const PLANKS: BlockId = BlockId(9);
    pub const COBBLESTONE: BlockId = BlockId(10);
    pub const BRICK: BlockId = BlockId(11);
    pub const GLASS: BlockId = BlockId(12);
    pub const BEDROCK: BlockId = BlockId(13);
    pub const TALL_GRASS: BlockId = BlockId(14);
    pub const OBSIDIAN: BlockId = BlockId(15);

    /// Scouring markers supplied by the weather mod; absent from plain worlds
    pub const MEDIUM_SCOURED: BlockId = BlockId(100);
    pub const HEAVY_SCOURED: BlockId = BlockId(101);

    pub fn is_air(&self) -> bool {
        *self == BlockId::AIR
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            BlockId::AIR => write!(f, "Air"),
            BlockId::GRASS => write!(f, "Grass"),
            BlockId::DIRT => write!(f, "Dirt"),
            BlockId::STONE => write!(f, "Stone"),
            BlockId::SAND => write!(f, "Sand"),
            BlockId::WATER => write!(f, "Water"),
            BlockId::LOG => write!(f, "Log"),
            BlockId::STRIPPED_LOG => write!(f, "Stripped Log"),
            BlockId::LEAVES => write!(f, "Leaves"),
            BlockId::PLANKS => write!(f, "Planks"),
            BlockId::COBBLESTONE => write!(f, "Cobblestone"),
            BlockId::BRICK => write!(f, "Brick"),
            BlockId::GLASS => write!(f, "Glass"),
            BlockId::BEDROCK => write!(f, "Bedrock"),
            BlockId::TALL_GRASS => write!(f, "Tall Grass"),
            BlockId::OBSIDIAN => write!(f, "Obsidian"),
            BlockId::MEDIUM_SCOURED => write!(f, "Medium Scoured Ground"),
            BlockId::HEAVY_SCOURED => write!(f, "Heavy Scoured Ground"),
            _ => write!(f, "Block({})", self.0),
        }
    }
}

/// Coarse block classification used by the evidence heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockCategory {
    Air,
    /// Natural ground cover (dirt, stone, sand)
    Ground,
    Grass,
    Log,
    StrippedLog,
    Leaves,
    /// Small plants; destroyed but not recorded
    Plant,
    /// Player-built material
    Structure,
    Fluid,
    /// Scouring marker blocks
    ScouredGround,
}

/// Physical properties the damage model needs from a block type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockProperties {
    /// Destroy time; negative means unbreakable
    pub hardness: f32,
    /// Effectiveness of the reference tool against this block
    pub tool_speed: f32,
    pub category: BlockCategory,
}

impl BlockProperties {
    pub const fn new(hardness: f32, tool_speed: f32, category: BlockCategory) -> Self {
        Self {
            hardness,
            tool_speed,
            category,
        }
    }

    /// Whether the block is part of natural forest cover
    pub fn is_forest_cover(&self) -> bool {
        matches!(
            self.category,
            BlockCategory::Log | BlockCategory::StrippedLog | BlockCategory::Leaves | BlockCategory::Grass
        )
    }

    /// Blocks whose destruction counts as damage evidence
    pub fn is_damage_candidate(&self) -> bool {
        matches!(
            self.category,
            BlockCategory::Structure | BlockCategory::Log | BlockCategory::Leaves
        )
    }
}
