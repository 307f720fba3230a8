//! Helm chart assembly
//!
//! A [`Chart`] is built in memory from a Compose project and can then be
//! written out as a chart directory or packaged as a `.tgz` archive.

pub mod assembler;
pub mod bundle;

pub use assembler::{derive_target_dir, ChartAssembler};
pub use bundle::{Chart, ChartFile, ChartMetadata, Template, DEFAULT_CHART_VERSION};
