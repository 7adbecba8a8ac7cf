mod fake;
mod tract;

pub use self::fake::FakeEngine;
pub use self::tract::TractEngine;

use crate::preprocess::{CHANNELS, HEIGHT, WIDTH};
use tract_onnx::prelude::tract_ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Shared handle to the loaded model. Read-only once built.
pub type Engine = Arc<dyn InferenceEngine + Send + Sync>;

/// GraphEncoding
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEncoding {
    #[default]
    Onnx,
    Tensorflow,
}

impl FromStr for GraphEncoding {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(GraphEncoding::Onnx),
            "tensorflow" | "tf" | "pb" => Ok(GraphEncoding::Tensorflow),
            _ => Err(InferenceError::InvalidEncodingError(s.to_string())),
        }
    }
}

/// Memory layout of the model's input batch.
///
/// Keras exports keep channels last, which is what the bundled CIFAR-10 model
/// was trained with.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

impl TensorLayout {
    /// Shape of a single-example batch in this layout.
    pub fn input_shape(&self) -> [usize; 4] {
        let (h, w, c) = (HEIGHT as usize, WIDTH as usize, CHANNELS as usize);
        match self {
            TensorLayout::Nhwc => [1, h, w, c],
            TensorLayout::Nchw => [1, c, h, w],
        }
    }

    /// Axis holding the color channels.
    pub fn channel_axis(&self) -> usize {
        match self {
            TensorLayout::Nhwc => 3,
            TensorLayout::Nchw => 1,
        }
    }
}

impl FromStr for TensorLayout {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nhwc" | "channels_last" => Ok(TensorLayout::Nhwc),
            "nchw" | "channels_first" => Ok(TensorLayout::Nchw),
            _ => Err(InferenceError::InvalidLayoutError(s.to_string())),
        }
    }
}

/// InferenceEngine
///
/// A loaded classifier. Implementations must be pure functions of their fixed
/// weights and the input batch so that a single instance can serve concurrent
/// requests without locking.
pub trait InferenceEngine {
    /// Shape of the batch `compute` expects.
    fn input_shape(&self) -> [usize; 4];

    /// Length of one output vector, if the graph declares it statically.
    fn output_classes(&self) -> Option<usize>;

    /// Run a forward pass. Returns one row of scores per batch entry.
    fn compute(&self, input: Array4<f32>) -> InferenceResult<Array2<f32>>;
}

/// Rejects a batch whose shape differs from what the engine was built for.
pub(crate) fn check_input_shape(expected: [usize; 4], input: &Array4<f32>) -> InferenceResult<()> {
    if input.shape() != expected {
        log::error!(
            "check_input_shape() - expected {:?}, got {:?}",
            expected,
            input.shape()
        );
        return Err(InferenceError::CorruptInputTensor {
            expected: expected.to_vec(),
            actual: input.shape().to_vec(),
        });
    }
    Ok(())
}

/// InferenceResult
pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Invalid encoding '{0}', expected 'onnx' or 'tensorflow'")]
    InvalidEncodingError(String),

    #[error("Invalid tensor layout '{0}', expected 'nhwc' or 'nchw'")]
    InvalidLayoutError(String),

    #[error("Failed to build model from buffer: {0}")]
    FailedToBuildModelFromBuffer(String),

    #[error("Corrupt input tensor: expected shape {expected:?}, got {actual:?}")]
    CorruptInputTensor {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Re-shaping of tensor failed {0}")]
    ReShapeError(String),

    #[error("Model produces {outputs} scores per image but {labels} class labels are configured")]
    LabelCountMismatch { labels: usize, outputs: usize },

    #[error("Inference runtime error: {0}")]
    RuntimeError(#[from] ::tract_onnx::prelude::TractError),
}
