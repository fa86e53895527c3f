//! Census block layer: TIGER polygons joined with SF1 race composition.

pub mod attributes;
pub mod features;

pub use attributes::{get_block_attributes, BlockAttributes};
pub use features::{get_block_features, Block, BlockFeature};
