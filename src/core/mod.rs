//! Core types for vtr-task.
//!
//! Circuits, flow steps, parameter sets and the install-root asset resolver
//! shared by every other module.

pub mod assets;
pub mod circuit;
pub mod params;

// Re-export key types for convenience
pub use assets::{Asset, Assets, VTR_ROOT_ENV};
pub use circuit::{CircuitKind, FlowStep, ParamSet, Triple, TripleKey, TripleState};
pub use params::{FlowParams, HdlParser, SynthTool};
