//! Echo state network inference
//!
//! A leaky-integrator reservoir driven by EMG feature vectors. With `K`
//! inputs, `M` hidden neurons and `N` outputs:
//!
//! - `W_in` is a dense `M × K` input projection
//! - `W` is a sparse `M × M` recurrent matrix
//! - `W_out` is a dense `N × M` readout
//!
//! Each update computes
//!
//! ```text
//! state = dt · tanh(W_in · u + W · state) + (1 − dt) · state
//! ```
//!
//! where `u` is the input normalized into `[-1, 1]`. Only the readout is
//! trained; the network here is inference-only.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use prosthex_core::error::{ProcessingError, ProcessingResult};
use prosthex_core::math::SparseWeightMatrix;

/// Half-width of the neutral zone of [`ReservoirNetwork::normalized_output`]
pub const OUTPUT_DEADBAND: f64 = 0.2;

/// Threshold separating the classes of
/// [`ReservoirNetwork::output_classification`]
pub const CLASSIFICATION_THRESHOLD: f64 = 0.5;

// ============================================================================
// Scaling
// ============================================================================

/// Per-dimension affine normalization: an offset plus a `[low, high]` range.
///
/// Inputs are mapped from `[low + offset, high + offset]` onto `[-1, 1]`;
/// outputs are mapped back the other way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    /// Offset subtracted before (added after) the range mapping
    pub offset: Vec<f64>,
    /// Lower range limit per dimension
    pub low: Vec<f64>,
    /// Upper range limit per dimension
    pub high: Vec<f64>,
}

impl Scaling {
    /// Scaling that leaves `[-1, 1]` untouched
    #[must_use]
    pub fn identity(dims: usize) -> Self {
        Self { offset: vec![0.0; dims], low: vec![-1.0; dims], high: vec![1.0; dims] }
    }

    /// Number of dimensions
    #[must_use]
    pub fn len(&self) -> usize {
        self.offset.len()
    }

    /// True for a zero-dimensional scaling
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset.is_empty()
    }

    /// Map a raw value of dimension `i` into `[-1, 1]`.
    ///
    /// A zero-width range maps every value to the range midpoint, 0.
    #[inline]
    #[must_use]
    pub fn normalize(&self, i: usize, value: f64) -> f64 {
        let width = self.high[i] - self.low[i];
        if width == 0.0 {
            return 0.0;
        }
        2.0 * (value - self.offset[i] - self.low[i]) / width - 1.0
    }

    /// Map a value of dimension `i` from `[-1, 1]` back into its range
    #[inline]
    #[must_use]
    pub fn denormalize(&self, i: usize, value: f64) -> f64 {
        0.5 * (self.high[i] - self.low[i]) * (value + 1.0) + self.low[i] + self.offset[i]
    }

    fn validate(&self, context: &'static str, dims: usize) -> ProcessingResult<()> {
        for len in [self.offset.len(), self.low.len(), self.high.len()] {
            if len != dims {
                return Err(ProcessingError::mismatch(context, dims, len));
            }
        }
        let inverted = |i: usize| self.low[i] > self.high[i] || self.low[i].is_nan() || self.high[i].is_nan();
        if let Some(i) = (0..dims).find(|&i| inverted(i)) {
            return Err(ProcessingError::invalid(
                context,
                format!("range of dimension {i} has lower bound {} above upper bound {}", self.low[i], self.high[i]),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Reservoir Network
// ============================================================================

/// Echo state network with a sparse recurrent reservoir
#[derive(Clone, Debug)]
pub struct ReservoirNetwork {
    w_in: DMatrix<f64>,
    w_res: SparseWeightMatrix,
    w_out: DMatrix<f64>,
    dt: f64,
    input_scaling: Scaling,
    output_scaling: Scaling,
    state: DVector<f64>,
}

impl ReservoirNetwork {
    /// Assemble a network from its trained parts. The state starts at zero.
    ///
    /// # Errors
    ///
    /// - [`ProcessingError::DimensionMismatch`] if `W_in` rows differ from the
    ///   reservoir size, the reservoir is not square, `W_out` columns differ
    ///   from the reservoir size, or a scaling does not have one entry per
    ///   input/output
    /// - [`ProcessingError::InvalidParameter`] if `dt` is outside `[0, 1]` or a
    ///   range has its lower bound above its upper bound
    pub fn new(
        w_in: DMatrix<f64>,
        w_res: SparseWeightMatrix,
        w_out: DMatrix<f64>,
        dt: f64,
        input_scaling: Scaling,
        output_scaling: Scaling,
    ) -> ProcessingResult<Self> {
        if w_in.nrows() != w_res.rows() {
            return Err(ProcessingError::mismatch("input weight rows", w_res.rows(), w_in.nrows()));
        }
        if !w_res.is_square() {
            return Err(ProcessingError::mismatch("reservoir matrix columns", w_res.rows(), w_res.cols()));
        }
        if w_out.ncols() != w_res.cols() {
            return Err(ProcessingError::mismatch("output weight columns", w_res.cols(), w_out.ncols()));
        }
        validate_dt(dt)?;
        input_scaling.validate("input scaling", w_in.ncols())?;
        output_scaling.validate("output scaling", w_out.nrows())?;

        let state = DVector::zeros(w_res.rows());
        Ok(Self { w_in, w_res, w_out, dt, input_scaling, output_scaling, state })
    }

    /// Number of inputs `K`
    #[inline]
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.w_in.ncols()
    }

    /// Number of hidden neurons `M`
    #[inline]
    #[must_use]
    pub const fn num_neurons(&self) -> usize {
        self.w_res.rows()
    }

    /// Number of outputs `N`
    #[inline]
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.w_out.nrows()
    }

    /// State retention coefficient
    #[inline]
    #[must_use]
    pub const fn dt(&self) -> f64 {
        self.dt
    }

    /// Change the state retention coefficient.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if `dt` is outside `[0, 1]`.
    pub fn set_dt(&mut self, dt: f64) -> ProcessingResult<()> {
        validate_dt(dt)?;
        self.dt = dt;
        Ok(())
    }

    /// Current hidden state
    #[must_use]
    pub fn state(&self) -> &[f64] {
        self.state.as_slice()
    }

    /// Reinitialize the hidden state to zeros
    pub fn reset_state(&mut self) {
        self.state.fill(0.0);
    }

    /// Input normalization
    #[must_use]
    pub const fn input_scaling(&self) -> &Scaling {
        &self.input_scaling
    }

    /// Output denormalization
    #[must_use]
    pub const fn output_scaling(&self) -> &Scaling {
        &self.output_scaling
    }

    /// Advance the reservoir by one step. The input is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::DimensionMismatch`] if `input` does not have
    /// [`num_inputs`](Self::num_inputs) entries.
    pub fn update(&mut self, input: &[f64]) -> ProcessingResult<()> {
        if input.len() != self.num_inputs() {
            return Err(ProcessingError::mismatch("reservoir input", self.num_inputs(), input.len()));
        }
        let u = DVector::from_iterator(
            input.len(),
            input.iter().enumerate().map(|(i, &v)| self.input_scaling.normalize(i, v)),
        );

        let recurrent = self.w_res.apply(self.state.as_slice())?;
        let driven = &self.w_in * u;

        let dt = self.dt;
        for (i, s) in self.state.iter_mut().enumerate() {
            let h = (driven[i] + recurrent[i]).tanh();
            *s = dt * h + (1.0 - dt) * *s;
        }
        Ok(())
    }

    /// Readout `W_out · state`, denormalized into the output ranges
    #[must_use]
    pub fn output(&self) -> Vec<f64> {
        let y = &self.w_out * &self.state;
        y.iter().enumerate().map(|(i, &v)| self.output_scaling.denormalize(i, v)).collect()
    }

    /// [`output`](Self::output) clipped to `[-1, 1]` with a neutral zone:
    /// values within ±0.2 become 0 and the rest is rescaled away from the
    /// zone edge by a factor of two, then clipped again.
    #[must_use]
    pub fn normalized_output(&self) -> Vec<f64> {
        self.output().into_iter().map(deadband).collect()
    }

    /// [`output`](Self::output) rounded to `{-1, 0, 1}` with thresholds at ±0.5
    #[must_use]
    pub fn output_classification(&self) -> Vec<i8> {
        self.output()
            .into_iter()
            .map(|y| {
                if y < -CLASSIFICATION_THRESHOLD {
                    -1
                } else if y < CLASSIFICATION_THRESHOLD {
                    0
                } else {
                    1
                }
            })
            .collect()
    }
}

fn validate_dt(dt: f64) -> ProcessingResult<()> {
    if (0.0..=1.0).contains(&dt) {
        Ok(())
    } else {
        Err(ProcessingError::invalid("dt", format!("{dt} is outside [0, 1]")))
    }
}

fn deadband(y: f64) -> f64 {
    let x = y.clamp(-1.0, 1.0);
    let scaled = if x > OUTPUT_DEADBAND {
        2.0 * (x - OUTPUT_DEADBAND)
    } else if x < -OUTPUT_DEADBAND {
        2.0 * (x + OUTPUT_DEADBAND)
    } else {
        0.0
    };
    scaled.clamp(-1.0, 1.0)
}

/// Fold a transfer mapping into input weights, `W_in · T`.
///
/// The folded network consumes inputs in the source space of `T`.
///
/// # Errors
///
/// Returns [`ProcessingError::DimensionMismatch`] if `T` does not have one
/// row per column of `W_in`.
pub fn fold_transfer(w_in: &DMatrix<f64>, transfer: &DMatrix<f64>) -> ProcessingResult<DMatrix<f64>> {
    if transfer.nrows() != w_in.ncols() {
        return Err(ProcessingError::mismatch("transfer mapping rows", w_in.ncols(), transfer.nrows()));
    }
    Ok(w_in * transfer)
}
