#![doc = include_str!("../README.md")]

pub mod manager;
pub mod registry;

// --- 주요 타입 re-export ---

pub use manager::{Manager, ManagerBuilder, OUT_OF_TREE_KEY};
pub use registry::{Configs, Registry, configure_factories};
