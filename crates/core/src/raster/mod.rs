//! Raster grid and sector geometry

mod geometry;
mod grid;

pub use geometry::{serpentine, TileGeometry, GRID_SUBDIVISION};
pub use grid::Raster;
