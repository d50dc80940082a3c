//! # AMREL Tiles
//!
//! File-backed terrain and point-cloud data for the AMREL road extractor:
//! - NVM normal-map tiles and the assembled [`TerrainMap`]
//! - `.til` point tiles in three nested resolution classes
//! - the sector-wide [`PointTileSet`] with its sliding residency buffer
//! - importers for ESRI ASC grids and raw XYZ clouds

pub mod import;
pub mod nvm;
pub mod terrain;
pub mod til;
pub mod tileset;

pub use nvm::{NormalMap, NormalMapHeader, NVM_SUFFIX};
pub use terrain::{shade, ShadingMode, TerrainMap};
pub use til::{CloudAccess, PointTile, PointTileHeader, TIL_SUFFIX, XYZ_UNIT};
pub use tileset::PointTileSet;
