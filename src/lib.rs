//! Vertex-centric BSP worker substrate over columnar graph fragments.

pub mod aggregator;
pub mod archive;
pub mod config;
pub mod degree;
pub mod driver;
pub mod edge;
pub mod error;
pub mod fragment;
pub mod memory_manager;
pub mod types;
pub mod vertex;
