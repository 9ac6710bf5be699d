//! Sequence generation: model adapter, procedural model, fallback library

pub mod fallback;
pub mod generator;
pub mod procedural;

pub use generator::{GeneratedSequence, GeneratorAdapter, SeedContext, SequenceModel};
pub use procedural::ProceduralModel;
