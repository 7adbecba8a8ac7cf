pub mod config;
pub mod data_loader;
pub mod engine;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod provider;
pub mod server;

pub use crate::engine::{Engine, GraphEncoding, InferenceEngine, InferenceError, TensorLayout};
pub use crate::pipeline::{Classifier, PipelineError};
pub use crate::postprocess::{ClassLabels, Prediction};
