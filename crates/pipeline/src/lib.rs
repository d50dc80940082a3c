//! # AMREL Pipeline
//!
//! Stage orchestration of the AMREL forest-road extractor: the typed
//! configuration, the stage store persisting every inter-stage artifact,
//! the road label map, the sawing scheduler and the `AmrelTool`
//! orchestrator, plus PNG and shapefile outputs.

pub mod config;
pub mod export;
pub mod output;
pub mod road_map;
pub mod store;
pub mod tool;

pub use config::{AmrelConfig, ExportMode, Step, VERSION};
pub use road_map::RoadMap;
pub use store::{MapHeader, StageStore};
pub use tool::AmrelTool;
