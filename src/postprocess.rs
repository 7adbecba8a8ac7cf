//! Mapping of raw model scores onto class names.
//!
//! Every class is reported. There is no ranking, thresholding or top-k.

use crate::config::CIFAR10_LABELS;
use tract_onnx::prelude::tract_ndarray::{self as ndarray, Array, ArrayBase, ArrayView1, Axis};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Class name to score, built fresh for every request.
///
/// Keys serialize in sorted order.
pub type Prediction = BTreeMap<String, f32>;

/// Ordered class names. Position `i` names output index `i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    pub fn new(labels: Vec<String>) -> Self {
        ClassLabels(labels)
    }

    /// The ten CIFAR-10 categories in training order.
    pub fn cifar10() -> Self {
        ClassLabels(CIFAR10_LABELS.iter().map(|l| l.to_string()).collect())
    }

    /// One label per line; surrounding whitespace and blank lines are ignored.
    pub fn from_lines(text: &str) -> Self {
        ClassLabels(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// First name that appears more than once, if any.
    ///
    /// Names are the keys of a `Prediction`, so a repeated name would swallow
    /// the score of its earlier occurrence.
    pub fn first_duplicate(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.0.len());
        self.0
            .iter()
            .find(|label| !seen.insert(label.as_str()))
            .map(String::as_str)
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        ClassLabels::cifar10()
    }
}

/// Zip scores with labels in index order.
pub fn classify(labels: &ClassLabels, scores: ArrayView1<f32>) -> Result<Prediction, ScoreCountMismatch> {
    if scores.len() != labels.len() {
        return Err(ScoreCountMismatch {
            labels: labels.len(),
            scores: scores.len(),
        });
    }

    Ok(labels
        .as_slice()
        .iter()
        .cloned()
        .zip(scores.iter().copied())
        .collect())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("model returned {scores} scores for {labels} class labels")]
pub struct ScoreCountMismatch {
    pub labels: usize,
    pub scores: usize,
}

pub trait NdArrayTensor<S, T, D> {
    /// Numerically stable [softmax](https://en.wikipedia.org/wiki/Softmax_function) along `axis`.
    fn softmax(&self, axis: Axis) -> Array<T, D>
    where
        D: ndarray::RemoveAxis,
        S: ndarray::RawData + ndarray::Data + ndarray::RawData<Elem = T>,
        <S as ndarray::RawData>::Elem: std::clone::Clone,
        T: ndarray::NdFloat + std::ops::SubAssign + std::ops::DivAssign;
}

impl<S, T, D> NdArrayTensor<S, T, D> for ArrayBase<S, D>
where
    D: ndarray::RemoveAxis,
    S: ndarray::RawData + ndarray::Data + ndarray::RawData<Elem = T>,
    <S as ndarray::RawData>::Elem: std::clone::Clone,
    T: ndarray::NdFloat + std::ops::SubAssign + std::ops::DivAssign,
{
    fn softmax(&self, axis: Axis) -> Array<T, D> {
        let max = self
            .fold_axis(axis, T::neg_infinity(), |&m, &v| m.max(v))
            .insert_axis(axis);

        let mut new_array: Array<T, D> = self.to_owned();
        new_array -= &max;
        new_array.map_inplace(|v| *v = v.exp());
        let sum = new_array.sum_axis(axis).insert_axis(axis);
        new_array /= &sum;

        new_array
    }
}
