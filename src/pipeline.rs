use crate::engine::{Engine, InferenceError, TensorLayout};
use crate::postprocess::{classify, ClassLabels, NdArrayTensor, Prediction, ScoreCountMismatch};
use crate::preprocess::{preprocess, PreprocessError};
use tract_onnx::prelude::tract_ndarray::Axis;
use std::sync::Arc;

/// decode → preprocess → predict → label, over one shared read-only model.
///
/// Cloning is cheap; clones share the model and the label set.
#[derive(Clone)]
pub struct Classifier {
    engine: Engine,
    labels: Arc<ClassLabels>,
    layout: TensorLayout,
    apply_softmax: bool,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("labels", &self.labels)
            .field("layout", &self.layout)
            .field("apply_softmax", &self.apply_softmax)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    /// Couple a loaded model with its label set.
    ///
    /// Fails when the model declares an output width that differs from the
    /// number of labels, or when it expects a different input batch than the
    /// configured layout produces.
    pub fn new(engine: Engine, labels: ClassLabels, layout: TensorLayout) -> Result<Self, InferenceError> {
        if engine.input_shape() != layout.input_shape() {
            return Err(InferenceError::CorruptInputTensor {
                expected: engine.input_shape().to_vec(),
                actual: layout.input_shape().to_vec(),
            });
        }

        if let Some(outputs) = engine.output_classes() {
            if outputs != labels.len() {
                return Err(InferenceError::LabelCountMismatch {
                    labels: labels.len(),
                    outputs,
                });
            }
        }

        Ok(Classifier {
            engine,
            labels: Arc::new(labels),
            layout,
            apply_softmax: false,
        })
    }

    /// Normalize raw logits before labelling them.
    pub fn with_softmax(mut self, apply_softmax: bool) -> Self {
        self.apply_softmax = apply_softmax;
        self
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Classify one encoded image.
    ///
    /// The returned mapping holds exactly one score per label and is owned by
    /// the caller.
    pub fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, PipelineError> {
        let batch = preprocess(image_bytes, self.layout)?;

        let mut scores = self.engine.compute(batch)?;

        if self.apply_softmax {
            scores = scores.softmax(Axis(1));
        }

        let first = scores
            .axis_iter(Axis(0))
            .next()
            .ok_or(PipelineError::EmptyOutput)?;

        Ok(classify(&self.labels, first)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    OutputMismatch(#[from] ScoreCountMismatch),

    #[error("model returned an empty batch")]
    EmptyOutput,
}

impl PipelineError {
    /// Whether the uploaded payload, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Preprocess(_))
    }
}
