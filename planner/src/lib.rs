// This file makes `planner` into a rust library crate.

// It is useful for debugging and for embedding the planner with custom
// appearance samplers.

// The file `main.rs` still exists to make `planner` into an executable.

pub mod catalog;
pub mod curve;
pub mod debug_image;
pub mod estimate;
pub mod fit_curves;
pub mod misc;
pub mod rank_views;
pub mod report;
pub mod sampler;
pub mod selection;
pub mod solver;
pub mod technique;

#[cfg(test)]
mod testing;

pub use base;
pub use base::vset;
