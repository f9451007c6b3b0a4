//! # ThermoGIS Parallel
//!
//! Tiled processing for whole-raster passes.
//!
//! This crate provides:
//! - Tile decomposition of a raster grid, with optional overlap
//! - Deterministic tiled reductions (zonal statistics)
//! - Tiled focal passes (neighborhood operators)
//!
//! With the `parallel` feature (default) tiles run on the Rayon pool;
//! without it they run sequentially with identical results.

pub mod tiled;

pub use tiled::{Tile, TileIterator, TiledProcessor};
