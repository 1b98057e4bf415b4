//! Attribution shape decoder
//!
//! Attribution routines disagree on how they lay out per-class output for a
//! binary classifier. Every observed shape is classified into one of a
//! closed set of [`Layout`]s, each with an explicit extraction rule. Shapes
//! outside that set are errors, never guesses.

use std::fmt;

use ndarray::{Array2, ArrayD, Axis, Ix2};

use super::ExplainError;

/// Class index of "default" in every per-class output
const POSITIVE_CLASS: usize = 1;

/// Length of the class axis for a binary classifier
const CLASS_AXIS_LEN: usize = 2;

/// Raw output of an attribution engine
#[derive(Debug, Clone)]
pub enum RawAttribution {
    /// A single array of any rank
    Array(ArrayD<f64>),
    /// One array per class, class 0 first
    PerClass(Vec<ArrayD<f64>>),
}

/// Known layouts. `n` = samples, `p` = features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `(n, p)`, already the positive class
    SamplesFeatures,
    /// `(n, p, 2)`
    SamplesFeaturesClasses,
    /// `(2, n, p)`
    ClassesSamplesFeatures,
    /// `(n, 2, p)`
    SamplesClassesFeatures,
}

impl Layout {
    /// Rank-3 layouts in match priority
    const RANK3: [Layout; 3] = [
        Layout::SamplesFeaturesClasses,
        Layout::ClassesSamplesFeatures,
        Layout::SamplesClassesFeatures,
    ];

    fn expected_shape(self, n_samples: usize, n_features: usize) -> Vec<usize> {
        match self {
            Layout::SamplesFeatures => vec![n_samples, n_features],
            Layout::SamplesFeaturesClasses => vec![n_samples, n_features, CLASS_AXIS_LEN],
            Layout::ClassesSamplesFeatures => vec![CLASS_AXIS_LEN, n_samples, n_features],
            Layout::SamplesClassesFeatures => vec![n_samples, CLASS_AXIS_LEN, n_features],
        }
    }

    fn class_axis(self) -> Option<usize> {
        match self {
            Layout::SamplesFeatures => None,
            Layout::SamplesFeaturesClasses => Some(2),
            Layout::ClassesSamplesFeatures => Some(0),
            Layout::SamplesClassesFeatures => Some(1),
        }
    }

    /// Classifies an observed shape. When several rank-3 layouts fit (for
    /// instance when the sample count equals the feature count) the first
    /// in priority order wins and the ambiguity is logged.
    pub fn classify(
        shape: &[usize],
        n_samples: usize,
        n_features: usize,
    ) -> Result<Layout, ExplainError> {
        let fits =
            |layout: &Layout| shape == layout.expected_shape(n_samples, n_features).as_slice();
        match shape.len() {
            2 if fits(&Layout::SamplesFeatures) => Ok(Layout::SamplesFeatures),
            2 => Err(ExplainError::UnrecognizedShape {
                shape: shape.to_vec(),
                n_samples,
                n_features,
            }),
            3 => {
                let matching: Vec<Layout> = Layout::RANK3
                    .into_iter()
                    .filter(|layout| fits(layout))
                    .collect();
                match matching.as_slice() {
                    [] => Err(ExplainError::UnrecognizedShape {
                        shape: shape.to_vec(),
                        n_samples,
                        n_features,
                    }),
                    [only] => Ok(*only),
                    [first, ..] => {
                        tracing::warn!(
                            "Ambiguous attribution shape {:?} (n={}, p={}) matches {:?}, using {}",
                            shape,
                            n_samples,
                            n_features,
                            matching,
                            first
                        );
                        Ok(*first)
                    }
                }
            }
            ndim => Err(ExplainError::UnsupportedRank {
                ndim,
                shape: shape.to_vec(),
            }),
        }
    }

    /// Applies this layout's extraction rule
    fn extract(self, values: ArrayD<f64>) -> Result<Array2<f64>, ExplainError> {
        let matrix = match self.class_axis() {
            None => values,
            Some(axis) => values.index_axis_move(Axis(axis), POSITIVE_CLASS),
        };
        Ok(matrix.into_dimensionality::<Ix2>()?)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Layout::SamplesFeatures => "(n, p)",
            Layout::SamplesFeaturesClasses => "(n, p, 2)",
            Layout::ClassesSamplesFeatures => "(2, n, p)",
            Layout::SamplesClassesFeatures => "(n, 2, p)",
        };
        f.write_str(s)
    }
}

/// Reduces raw attribution output to an `(n_samples, n_features)` matrix
/// for the positive class, columns in canonical feature order.
pub fn positive_class_matrix(
    raw: RawAttribution,
    n_samples: usize,
    n_features: usize,
) -> Result<Array2<f64>, ExplainError> {
    let values = match raw {
        RawAttribution::Array(values) => values,
        RawAttribution::PerClass(mut per_class) => {
            // The last entry is the positive class when there are several
            per_class.pop().ok_or(ExplainError::EmptyClassList)?
        }
    };
    let layout = Layout::classify(values.shape(), n_samples, n_features)?;
    tracing::trace!("Attribution layout {} for shape {:?}", layout, values.shape());
    layout.extract(values)
}
