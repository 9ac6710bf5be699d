//! Semantic feature extraction and musical parameter mapping

pub mod features;
pub mod mapper;

pub use features::{FeatureExtractor, ObjectContext, SemanticFeatures};
pub use mapper::{DefaultMapping, MappingDecision, MappingStrategy, MappingWeights, MusicalHistory, ParameterMapper};
