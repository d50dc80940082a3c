//! # AMREL Core
//!
//! Core types for the AMREL forest-road extractor:
//! - `Raster<T>`: dense raster grid
//! - `TileGeometry`: sector tiling and the serpentine iteration order
//! - `Pt2i` / `Vr2i`: integer pixels and gradient vectors
//! - `DigitalStraightSegment`: rational-endpoint segments from the
//!   blurred-segment extractor

pub mod dss;
pub mod error;
pub mod point;
pub mod raster;

pub use dss::{DigitalStraightSegment, RationalPoint};
pub use error::{Error, Result};
pub use point::{Pt2i, Vr2i};
pub use raster::{serpentine, Raster, TileGeometry, GRID_SUBDIVISION};
