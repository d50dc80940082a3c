//! # AMREL Algorithms
//!
//! Image and geometry kernels of the AMREL forest-road extractor:
//! - RORPO elongated-structure enhancement
//! - Sobel 5x5 gradient maps
//! - FBSD blurred-segment extraction
//! - seed generation along retained segments
//! - ASD carriage-track detection over the raw point cloud

pub mod asd;
pub mod fbsd;
pub mod gradient;
pub mod rorpo;
pub mod seeds;

pub use asd::{CTrackDetector, CarriageTrack, Plateau, TrackScan};
pub use fbsd::BsDetector;
pub use gradient::GradientMap;
pub use rorpo::rorpo;
pub use seeds::{PadRef, SeedBuilder, SeedStats};
