//! Configuration system for flowloop.
//!
//! Two layers:
//! 1. Global config (~/.config/flowloop/flowloop.yml or .flowloop.yml)
//! 2. Per-node loop settings, normalized into `LoopConfig`

pub use self::global::{EngineConfig, GlobalConfig};
pub use self::loop_config::{
    DEFAULT_COUNT, DEFAULT_INDEX_NAME, DEFAULT_ITEM_NAME, DEFAULT_MAX_ITERATIONS, LoopConfig, LoopType,
};

mod global;
mod loop_config;

