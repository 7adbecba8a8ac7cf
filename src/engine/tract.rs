use super::{check_input_shape, GraphEncoding, InferenceEngine, InferenceError, InferenceResult, TensorLayout};
use tract_onnx::prelude::tract_ndarray::{Array2, Array4};
use std::io::Cursor;
use tract_onnx::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Tract backed engine for ONNX and TensorFlow frozen graphs.
pub struct TractEngine {
    plan: Plan,
    input_shape: [usize; 4],
    output_classes: Option<usize>,
}

impl TractEngine {
    /// Parse, type and optimize a serialized graph for a fixed input batch.
    pub fn load(model: &[u8], encoding: GraphEncoding, layout: TensorLayout) -> InferenceResult<Self> {
        let input_shape = layout.input_shape();
        let mut reader = Cursor::new(model);

        log::debug!(
            "load() - building {:?} graph of {} bytes for input {:?}",
            encoding,
            model.len(),
            input_shape
        );

        let graph = match encoding {
            GraphEncoding::Onnx => tract_onnx::onnx().model_for_read(&mut reader),
            GraphEncoding::Tensorflow => tract_tensorflow::tensorflow().model_for_read(&mut reader),
        }
        .map_err(|e| InferenceError::FailedToBuildModelFromBuffer(format!("{:#}", e)))?;

        let optimized = graph
            .with_input_fact(0, f32::fact(input_shape).into())
            .and_then(|g| g.into_optimized())
            .map_err(|e| InferenceError::FailedToBuildModelFromBuffer(format!("{:#}", e)))?;

        let output_classes = optimized
            .output_fact(0)?
            .shape
            .as_concrete()
            .map(|shape| scores_per_example(shape.iter().product(), input_shape[0]));

        if output_classes.is_none() {
            log::warn!("load() - output width of the graph is symbolic, it will be checked per request");
        }

        let plan = optimized
            .into_runnable()
            .map_err(|e| InferenceError::FailedToBuildModelFromBuffer(format!("{:#}", e)))?;

        Ok(TractEngine {
            plan,
            input_shape,
            output_classes,
        })
    }
}

impl InferenceEngine for TractEngine {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn output_classes(&self) -> Option<usize> {
        self.output_classes
    }

    fn compute(&self, input: Array4<f32>) -> InferenceResult<Array2<f32>> {
        check_input_shape(self.input_shape, &input)?;

        let batch = input.shape()[0];
        let outputs = self.plan.run(tvec!(input.into_tensor().into()))?;

        let scores = outputs
            .first()
            .ok_or_else(|| InferenceError::ReShapeError("graph produced no outputs".to_string()))?
            .to_array_view::<f32>()?;

        let width = scores_per_example(scores.len(), batch);

        Array2::from_shape_vec((batch, width), scores.iter().copied().collect())
            .map_err(|e| InferenceError::ReShapeError(e.to_string()))
    }
}

/// Every non-batch axis of the output counts towards the class scores, so
/// `[1, N]` and `[1, N, 1, 1]` both describe `N` classes.
fn scores_per_example(output_len: usize, batch: usize) -> usize {
    output_len / batch.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::IMAGENET_MEAN_BGR;
    use std::path::PathBuf;
    use tract_onnx::prelude::tract_ndarray::Axis;

    fn fixture(name: &str) -> Vec<u8> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name);
        std::fs::read(path).unwrap()
    }

    /// Softmax of `mean(input, h, w) . W + B` with the weights baked into the fixtures.
    fn expected_scores(bgr: [f32; 3]) -> Vec<f32> {
        let logits: Vec<f32> = (0..10)
            .map(|k| {
                let dot: f32 = (0..3)
                    .map(|c| bgr[c] * (k as f32 - 4.5) * 0.01 * (c + 1) as f32)
                    .sum();
                dot + 0.1 * k as f32
            })
            .collect();
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exp.iter().sum();
        exp.iter().map(|e| e / sum).collect()
    }

    #[test]
    fn garbage_onnx_is_rejected() {
        let result = TractEngine::load(b"definitely not a protobuf", GraphEncoding::Onnx, TensorLayout::Nhwc);
        assert!(matches!(
            result,
            Err(InferenceError::FailedToBuildModelFromBuffer(_))
        ));
    }

    #[test]
    fn onnx_graph_declares_its_output_width() {
        let engine = TractEngine::load(&fixture("pooled_softmax.onnx"), GraphEncoding::Onnx, TensorLayout::Nhwc).unwrap();

        assert_eq!(engine.input_shape(), [1, 224, 224, 3]);
        assert_eq!(engine.output_classes(), Some(10));
    }

    #[test]
    fn compute_runs_the_graph() {
        let engine = TractEngine::load(&fixture("pooled_softmax.onnx"), GraphEncoding::Onnx, TensorLayout::Nhwc).unwrap();

        // a solid normalized pixel, as a solid RGB(40, 90, 200) image becomes
        let bgr = [
            200.0 - IMAGENET_MEAN_BGR[0],
            90.0 - IMAGENET_MEAN_BGR[1],
            40.0 - IMAGENET_MEAN_BGR[2],
        ];
        let mut input = Array4::<f32>::zeros(engine.input_shape());
        for (c, value) in bgr.iter().enumerate() {
            input.index_axis_mut(Axis(3), c).fill(*value);
        }

        let scores = engine.compute(input).unwrap();

        assert_eq!(scores.shape(), &[1, 10]);
        assert!((scores.sum() - 1.0).abs() < 1e-4);
        for (got, want) in scores.row(0).iter().zip(expected_scores(bgr)) {
            assert!((got - want).abs() < 1e-4, "{got} != {want}");
        }
    }

    #[test]
    fn trailing_unit_axes_do_not_hide_the_classes() {
        let flat = TractEngine::load(&fixture("pooled_softmax.onnx"), GraphEncoding::Onnx, TensorLayout::Nhwc).unwrap();
        let spatial = TractEngine::load(&fixture("pooled_softmax_4d.onnx"), GraphEncoding::Onnx, TensorLayout::Nhwc).unwrap();
        let input = Array4::<f32>::from_elem(flat.input_shape(), -20.0);

        assert_eq!(spatial.output_classes(), Some(10));
        assert_eq!(flat.compute(input.clone()).unwrap(), spatial.compute(input).unwrap());
    }

    #[test]
    fn wrong_input_shape_is_rejected_before_running() {
        let engine = TractEngine::load(&fixture("pooled_softmax.onnx"), GraphEncoding::Onnx, TensorLayout::Nhwc).unwrap();

        let result = engine.compute(Array4::<f32>::zeros((1, 3, 224, 224)));

        assert!(matches!(result, Err(InferenceError::CorruptInputTensor { .. })));
    }
}
