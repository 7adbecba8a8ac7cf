use super::{check_input_shape, InferenceEngine, InferenceResult, TensorLayout};
use crate::postprocess::NdArrayTensor;
use tract_onnx::prelude::tract_ndarray::{Array1, Array2, Array4, Axis};

/// Deterministic stand-in for a trained classifier.
///
/// Class `k` scores the mean of color channel `k % 3`, weighted by `k + 1`.
/// Distinct images therefore produce distinct score vectors, which is all the
/// serving layer needs to be exercised without a model artifact on disk.
#[derive(Clone, Debug)]
pub struct FakeEngine {
    classes: usize,
    layout: TensorLayout,
    normalized: bool,
    declared: bool,
}

impl FakeEngine {
    /// Engine ending in a softmax layer.
    pub fn new(classes: usize, layout: TensorLayout) -> Self {
        FakeEngine {
            classes,
            layout,
            normalized: true,
            declared: true,
        }
    }

    /// Emit raw logits instead of a probability distribution.
    pub fn with_raw_logits(mut self) -> Self {
        self.normalized = false;
        self
    }

    /// Hide the output width, as graphs with symbolic output shapes do.
    pub fn with_undeclared_output(mut self) -> Self {
        self.declared = false;
        self
    }
}

impl InferenceEngine for FakeEngine {
    fn input_shape(&self) -> [usize; 4] {
        self.layout.input_shape()
    }

    fn output_classes(&self) -> Option<usize> {
        self.declared.then_some(self.classes)
    }

    fn compute(&self, input: Array4<f32>) -> InferenceResult<Array2<f32>> {
        check_input_shape(self.input_shape(), &input)?;

        let channel_axis = Axis(self.layout.channel_axis());
        let batch = input.len_of(Axis(0));
        let mut scores = Array2::<f32>::zeros((batch, self.classes));

        for (n, example) in input.axis_iter(Axis(0)).enumerate() {
            // batch axis is gone, so the channel axis shifts down by one
            let means: Array1<f32> = example
                .lanes(Axis(channel_axis.index() - 1))
                .into_iter()
                .fold(Array1::zeros(3), |acc, lane| acc + &lane);
            let pixels = (example.len() / 3) as f32;

            for k in 0..self.classes {
                scores[[n, k]] = means[k % 3] / pixels * (k + 1) as f32 / 255.0;
            }
        }

        if self.normalized {
            scores = scores.softmax(Axis(1));
        }

        Ok(scores)
    }
}
