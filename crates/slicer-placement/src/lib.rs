//! slicer-placement: Slice placement for slicer
//!
//! This crate decides where a requested slice goes:
//! - Placement requests and decisions
//! - The first-fit search over cluster inventory
//! - Reserved strategies that refuse to run

pub mod first_fit;
pub mod placement;

pub use first_fit::FirstFitStrategy;
pub use placement::{
    strategy_for, Placement, PlacementOutcome, PlacementRequest, PlacementStrategy,
    ReservedStrategy,
};
