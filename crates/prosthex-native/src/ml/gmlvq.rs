//! Prototype classification with a learned metric (GMLVQ)
//!
//! A trained model holds `K` labelled prototypes in an `m`-dimensional
//! feature space plus a positive semi-definite `m × m` metric `Λ`. The
//! distance of a point `x` to prototype `w_k` is
//! `(x − w_k)ᵗ · Λ · (x − w_k)` and a point takes the label of its nearest
//! prototype.

use nalgebra::{DMatrix, DVector};

use prosthex_core::error::{ProcessingError, ProcessingResult};

/// Nearest-prototype classifier under a learned quadratic metric
#[derive(Clone, Debug)]
pub struct PrototypeClassifier {
    /// `K × m`, one prototype per row
    prototypes: DMatrix<f64>,
    labels: Vec<i32>,
    /// `m × m`
    lambda: DMatrix<f64>,
}

impl PrototypeClassifier {
    /// Create a classifier from prototypes, their labels and the metric `Λ`.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::InvalidParameter`] if there are no prototypes
    /// - [`ProcessingError::DimensionMismatch`] if the label count differs
    ///   from the prototype count or `Λ` is not `m × m`
    pub fn new(prototypes: DMatrix<f64>, labels: Vec<i32>, lambda: DMatrix<f64>) -> ProcessingResult<Self> {
        if prototypes.nrows() == 0 {
            return Err(ProcessingError::invalid("prototypes", "at least one prototype is required"));
        }
        if labels.len() != prototypes.nrows() {
            return Err(ProcessingError::mismatch("prototype labels", prototypes.nrows(), labels.len()));
        }
        let m = prototypes.ncols();
        if lambda.nrows() != m {
            return Err(ProcessingError::mismatch("metric matrix rows", m, lambda.nrows()));
        }
        if lambda.ncols() != m {
            return Err(ProcessingError::mismatch("metric matrix columns", m, lambda.ncols()));
        }
        Ok(Self { prototypes, labels, lambda })
    }

    /// Create a classifier from the metric factor `Ω`, with `Λ = Ω · Ωᵗ`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), applied to the derived `Λ`.
    pub fn from_omega(prototypes: DMatrix<f64>, labels: Vec<i32>, omega: &DMatrix<f64>) -> ProcessingResult<Self> {
        let lambda = omega * omega.transpose();
        Self::new(prototypes, labels, lambda)
    }

    /// Number of prototypes `K`
    #[inline]
    #[must_use]
    pub fn num_prototypes(&self) -> usize {
        self.prototypes.nrows()
    }

    /// Feature dimensionality `m`
    #[inline]
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.prototypes.ncols()
    }

    /// Prototype labels in prototype order
    #[must_use]
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// Metric matrix `Λ`
    #[must_use]
    pub const fn lambda(&self) -> &DMatrix<f64> {
        &self.lambda
    }

    /// Squared metric distance from `x` to every prototype.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::DimensionMismatch`] if `x` does not have
    /// [`dimension`](Self::dimension) entries.
    pub fn distance_to_prototypes(&self, x: &[f64]) -> ProcessingResult<Vec<f64>> {
        if x.len() != self.dimension() {
            return Err(ProcessingError::mismatch("classifier input", self.dimension(), x.len()));
        }
        let x = DVector::from_column_slice(x);
        let distances = self
            .prototypes
            .row_iter()
            .map(|w| {
                let diff = &x - w.transpose();
                diff.dot(&(&self.lambda * &diff))
            })
            .collect();
        Ok(distances)
    }

    /// Label of the nearest prototype. Ties go to the lowest prototype index.
    ///
    /// # Errors
    ///
    /// Same as [`distance_to_prototypes`](Self::distance_to_prototypes).
    pub fn classify(&self, x: &[f64]) -> ProcessingResult<i32> {
        let d = self.distance_to_prototypes(x)?;
        Ok(self.labels[nearest(&d)])
    }

    /// Nearest label with a normalized margin
    /// `(d_second − d_nearest) / (d_second + d_nearest)`.
    ///
    /// The margin is 1 with a single prototype and 0 when both distances are
    /// zero.
    ///
    /// # Errors
    ///
    /// Same as [`distance_to_prototypes`](Self::distance_to_prototypes).
    pub fn confidence(&self, x: &[f64]) -> ProcessingResult<(i32, f64)> {
        let d = self.distance_to_prototypes(x)?;
        let best = nearest(&d);
        let second = d
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != best)
            .map(|(_, &v)| v)
            .fold(f64::INFINITY, f64::min);

        let confidence = if second.is_infinite() {
            1.0
        } else if second + d[best] == 0.0 {
            0.0
        } else {
            (second - d[best]) / (second + d[best])
        };
        Ok((self.labels[best], confidence))
    }

    /// Classify `x` with a combined two degree of freedom model and split
    /// the label into `(opening, rotation)` directions.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::DimensionMismatch`] for a wrongly sized input
    /// - [`ProcessingError::InvalidParameter`] if the label is outside `1..=9`
    pub fn two_dof_output(&self, x: &[f64]) -> ProcessingResult<(i8, i8)> {
        split_two_dof_label(self.classify(x)?)
    }
}

/// Split a combined label `1..=9` into `(opening, rotation)` in `{-1, 0, 1}²`.
///
/// Labels enumerate the grid row-major: 1 is `(-1, -1)`, 5 is `(0, 0)`, 9 is
/// `(1, 1)`.
///
/// # Errors
///
/// Returns [`ProcessingError::InvalidParameter`] for any other label.
pub fn split_two_dof_label(label: i32) -> ProcessingResult<(i8, i8)> {
    if !(1..=9).contains(&label) {
        return Err(ProcessingError::invalid("label", format!("{label} is outside [1, 9]")));
    }
    let index = label - 1;
    #[allow(clippy::cast_possible_truncation)]
    let (opening, rotation) = ((index / 3 - 1) as i8, (index % 3 - 1) as i8);
    Ok((opening, rotation))
}

fn nearest(d: &[f64]) -> usize {
    let mut best = 0;
    for (k, &v) in d.iter().enumerate().skip(1) {
        if v < d[best] {
            best = k;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_prototypes() -> PrototypeClassifier {
        let prototypes = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 4.0, 0.0]);
        PrototypeClassifier::new(prototypes, vec![0, 1], DMatrix::identity(2, 2)).unwrap()
    }

    #[test]
    fn test_construction_checks() {
        let err = PrototypeClassifier::new(DMatrix::zeros(2, 3), vec![1], DMatrix::identity(3, 3)).unwrap_err();
        assert_eq!(err, ProcessingError::mismatch("prototype labels", 2, 1));

        let err = PrototypeClassifier::new(DMatrix::zeros(2, 3), vec![1, 2], DMatrix::zeros(3, 2)).unwrap_err();
        assert_eq!(err, ProcessingError::mismatch("metric matrix columns", 3, 2));

        let err = PrototypeClassifier::new(DMatrix::zeros(2, 3), vec![1, 2], DMatrix::identity(2, 2)).unwrap_err();
        assert_eq!(err, ProcessingError::mismatch("metric matrix rows", 3, 2));

        assert!(PrototypeClassifier::new(DMatrix::zeros(0, 3), vec![], DMatrix::identity(3, 3)).is_err());
    }

    #[test]
    fn test_euclidean_nearest() {
        let model = two_prototypes();
        assert_eq!(model.classify(&[1.0, 3.0]).unwrap(), 0);
        assert_eq!(model.classify(&[3.0, -3.0]).unwrap(), 1);
    }

    #[test]
    fn test_tie_goes_to_first_prototype() {
        let model = two_prototypes();
        assert_eq!(model.classify(&[2.0, 1.0]).unwrap(), 0);
    }

    #[test]
    fn test_metric_distance() {
        let prototypes = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let lambda = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let model = PrototypeClassifier::new(prototypes, vec![7], lambda).unwrap();
        // diff (1, 2): 2·1 + 2·1·2 + 3·4 = 18
        let d = model.distance_to_prototypes(&[2.0, 3.0]).unwrap();
        assert!((d[0] - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_input_length_checked() {
        let err = two_prototypes().distance_to_prototypes(&[1.0]).unwrap_err();
        assert_eq!(err, ProcessingError::mismatch("classifier input", 2, 1));
    }

    #[test]
    fn test_confidence_grows_away_from_boundary() {
        let model = two_prototypes();
        let mut last = -1.0;
        for step in 0..=8 {
            let x = 2.0 + 0.25 * f64::from(step);
            let (label, confidence) = model.confidence(&[x, 0.0]).unwrap();
            if step > 0 {
                assert_eq!(label, 1);
                assert!(confidence > last);
            }
            last = confidence;
        }
        // On the prototype itself the margin is 1
        assert!((last - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_uses_second_nearest() {
        // Nearest prototype first in order, farther ones after
        let prototypes = DMatrix::from_row_slice(3, 1, &[0.0, 3.0, 2.0]);
        let model = PrototypeClassifier::new(prototypes, vec![1, 2, 3], DMatrix::identity(1, 1)).unwrap();
        let (label, confidence) = model.confidence(&[0.0]).unwrap();
        assert_eq!(label, 1);
        // d = [0, 9, 4], second nearest is 4
        assert!((confidence - 1.0).abs() < 1e-12);

        let (label, confidence) = model.confidence(&[1.0]).unwrap();
        assert_eq!(label, 1);
        // d = [1, 4, 1], tie resolved to index 0 and second nearest is 1
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_confidence_edge_cases() {
        let single = PrototypeClassifier::new(DMatrix::zeros(1, 1), vec![4], DMatrix::identity(1, 1)).unwrap();
        assert_eq!(single.confidence(&[2.0]).unwrap(), (4, 1.0));

        let zero_metric = PrototypeClassifier::new(DMatrix::zeros(2, 1), vec![1, 2], DMatrix::zeros(1, 1)).unwrap();
        assert_eq!(zero_metric.confidence(&[2.0]).unwrap(), (1, 0.0));
    }

    #[test]
    fn test_lambda_from_omega_is_symmetric() {
        let omega = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.0, 0.5, -1.0, 3.0]);
        let model = PrototypeClassifier::from_omega(DMatrix::zeros(1, 2), vec![0], &omega).unwrap();
        let lambda = model.lambda();
        assert_eq!(lambda[(0, 1)], lambda[(1, 0)]);
        assert!((lambda[(0, 0)] - 5.0).abs() < 1e-12);
        assert!((lambda[(0, 1)] + 1.5).abs() < 1e-12);
        assert!((lambda[(1, 1)] - 10.25).abs() < 1e-12);
    }

    #[test]
    fn test_two_dof_labels() {
        assert_eq!(split_two_dof_label(1).unwrap(), (-1, -1));
        assert_eq!(split_two_dof_label(2).unwrap(), (-1, 0));
        assert_eq!(split_two_dof_label(5).unwrap(), (0, 0));
        assert_eq!(split_two_dof_label(6).unwrap(), (0, 1));
        assert_eq!(split_two_dof_label(7).unwrap(), (1, -1));
        assert_eq!(split_two_dof_label(9).unwrap(), (1, 1));
        assert!(split_two_dof_label(0).is_err());
        assert!(split_two_dof_label(10).is_err());
    }

    #[test]
    fn test_two_dof_output() {
        let prototypes = DMatrix::from_row_slice(2, 1, &[-1.0, 1.0]);
        let model = PrototypeClassifier::new(prototypes, vec![4, 8], DMatrix::identity(1, 1)).unwrap();
        assert_eq!(model.two_dof_output(&[-0.9]).unwrap(), (0, -1));
        assert_eq!(model.two_dof_output(&[0.9]).unwrap(), (1, 0));
    }
}
