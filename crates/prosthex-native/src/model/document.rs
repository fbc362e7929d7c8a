//! JSON model documents
//!
//! Serde mirrors of the files written by the offline training tools. Dense
//! matrices are nested row-major arrays. Sparse matrices are triplet lists
//! with 1-based indices:
//!
//! ```json
//! { "_ArraySize_": [3, 3], "_ArrayData_": [[1, 2, 0.5], [3, 1, -0.25]] }
//! ```
//!
//! (`size` and `data` are accepted as field names as well.)

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use prosthex_core::math::SparseWeightMatrix;

use super::error::{ModelError, ModelResult};
use crate::ml::esn::Scaling;
use crate::ml::gmlvq::PrototypeClassifier;

/// Update rule identifier accepted in reservoir documents
pub const LEAKY_TANH: &str = "leaky-tanh";

// ============================================================================
// Matrices
// ============================================================================

/// Dense matrix as nested row-major arrays
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenseDoc(pub Vec<Vec<f64>>);

impl DenseDoc {
    /// Convert to a matrix, rejecting empty and ragged documents.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Format`] naming `name` and the offending row.
    pub fn to_matrix(&self, name: &str) -> ModelResult<DMatrix<f64>> {
        let rows = self.0.len();
        let cols = self.0.first().map_or(0, Vec::len);
        if rows == 0 || cols == 0 {
            return Err(ModelError::format(format!("matrix '{name}' is empty")));
        }
        if let Some((i, row)) = self.0.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(ModelError::format(format!(
                "matrix '{name}' is ragged: expected {cols} columns but row {i} has {}",
                row.len()
            )));
        }
        Ok(DMatrix::from_fn(rows, cols, |i, j| self.0[i][j]))
    }
}

impl From<&DMatrix<f64>> for DenseDoc {
    fn from(m: &DMatrix<f64>) -> Self {
        Self(m.row_iter().map(|r| r.iter().copied().collect()).collect())
    }
}

/// Sparse matrix as 1-based `[row, col, value]` triplets
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseDoc {
    /// `[rows, cols]`
    #[serde(rename = "_ArraySize_", alias = "size")]
    pub size: [usize; 2],
    /// 1-based triplets
    #[serde(rename = "_ArrayData_", alias = "data", default)]
    pub data: Vec<[f64; 3]>,
}

impl SparseDoc {
    /// Convert to a compressed sparse row matrix.
    ///
    /// # Errors
    ///
    /// - [`ModelError::Format`] if an index is not a positive integer
    /// - [`ModelError::Processing`] if an index exceeds the declared size
    pub fn to_matrix(&self, name: &str) -> ModelResult<SparseWeightMatrix> {
        let triplets = self
            .data
            .iter()
            .map(|&[r, c, v]| Ok((index(name, r)?, index(name, c)?, v)))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(SparseWeightMatrix::from_one_based(&triplets, self.size[0], self.size[1])?)
    }
}

fn index(name: &str, raw: f64) -> ModelResult<usize> {
    if raw.fract() != 0.0 || raw < 1.0 || raw > f64::from(u32::MAX) {
        return Err(ModelError::format(format!("matrix '{name}' has invalid 1-based index {raw}")));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(raw as usize)
}

/// Build a [`Scaling`] from an offset vector and a `2 × n` range matrix
/// (lower limits in the first row, upper limits in the second).
///
/// # Errors
///
/// Returns [`ModelError::Format`] if the range matrix does not have two rows.
pub fn scaling_from(name: &str, offset: &[f64], range: &DenseDoc) -> ModelResult<Scaling> {
    let range = range.to_matrix(name)?;
    if range.nrows() != 2 {
        return Err(ModelError::format(format!(
            "range '{name}' needs a lower and an upper row but has {} rows",
            range.nrows()
        )));
    }
    Ok(Scaling {
        offset: offset.to_vec(),
        low: range.row(0).iter().copied().collect(),
        high: range.row(1).iter().copied().collect(),
    })
}

// ============================================================================
// Echo State Network
// ============================================================================

/// `current_reservoir.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReservoirFile {
    /// Reservoir block
    pub esn: ReservoirDoc,
}

/// Input side of an echo state network
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservoirDoc {
    /// Dense `M × K` input weights
    pub w_inp: DenseDoc,
    /// Sparse `M × M` recurrent weights
    pub w_res: SparseDoc,
    /// State retention coefficient
    pub dt: f64,
    /// Per-input offset
    pub inp_offset: Vec<f64>,
    /// `2 × K` input range
    pub inp_range: DenseDoc,
    /// Update equation the model was trained with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_rule: Option<String>,
}

impl ReservoirDoc {
    /// Reject documents trained with a different update equation.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Format`] for any rule other than
    /// [`LEAKY_TANH`].
    pub fn check_update_rule(&self) -> ModelResult<()> {
        match self.update_rule.as_deref() {
            None | Some(LEAKY_TANH) => Ok(()),
            Some(other) => Err(ModelError::format(format!(
                "unsupported reservoir update rule '{other}', expected '{LEAKY_TANH}'"
            ))),
        }
    }
}

/// `current_output_weights.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputFile {
    /// Readout block
    pub esn: OutputDoc,
}

/// Readout of an echo state network
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDoc {
    /// Dense `N × M` output weights
    pub w_out: DenseDoc,
    /// Per-output offset, zeros when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_offset: Option<Vec<f64>>,
    /// `2 × N` output range, `[-1, 1]` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_range: Option<DenseDoc>,
}

impl OutputDoc {
    /// Output scaling for `outputs` dimensions, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Format`] for a malformed range matrix.
    pub fn scaling(&self, outputs: usize) -> ModelResult<Scaling> {
        let mut scaling = match &self.out_range {
            Some(range) => scaling_from("outRange", &[], range)?,
            None => Scaling::identity(outputs),
        };
        scaling.offset = self.out_offset.clone().unwrap_or_else(|| vec![0.0; outputs]);
        Ok(scaling)
    }
}

/// `transfer_mapping.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferFile {
    /// Linear map from the current electrode placement to the trained one
    #[serde(rename = "transfMap")]
    pub transfer_map: DenseDoc,
}

// ============================================================================
// GMLVQ
// ============================================================================

/// `gmlvq_model.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GmlvqFile {
    /// One model, or one model per degree of freedom
    pub gmlvq: GmlvqEntry,
}

/// Single or multi-model layout
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GmlvqEntry {
    /// `"gmlvq": {...}`
    Single(GmlvqDoc),
    /// `"gmlvq": [{...}, {...}]`
    List(Vec<GmlvqDoc>),
    /// `"gmlvq": [[{...}], [{...}]]`, only the first entry of each inner
    /// list is used
    Nested(Vec<Vec<GmlvqDoc>>),
}

impl GmlvqEntry {
    /// Model documents in declaration order
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Format`] if a nested entry is an empty list.
    pub fn documents(&self) -> ModelResult<Vec<&GmlvqDoc>> {
        match self {
            Self::Single(doc) => Ok(vec![doc]),
            Self::List(docs) => Ok(docs.iter().collect()),
            Self::Nested(docs) => docs
                .iter()
                .enumerate()
                .map(|(i, inner)| inner.first().ok_or_else(|| ModelError::format(format!("gmlvq entry {i} is empty"))))
                .collect(),
        }
    }
}

/// Prototype labels, flat or as a column vector
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelsDoc {
    /// `[1, 2, 3]`
    Flat(Vec<f64>),
    /// `[[1], [2], [3]]`
    Column(Vec<Vec<f64>>),
}

impl LabelsDoc {
    /// Integer labels.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Format`] for non-integral labels or column rows
    /// with other than one entry.
    pub fn to_labels(&self) -> ModelResult<Vec<i32>> {
        let flat: Vec<f64> = match self {
            Self::Flat(values) => values.clone(),
            Self::Column(rows) => rows
                .iter()
                .enumerate()
                .map(|(i, r)| match r.as_slice() {
                    [v] => Ok(*v),
                    _ => Err(ModelError::format(format!("label row {i} has {} entries, expected 1", r.len()))),
                })
                .collect::<ModelResult<_>>()?,
        };
        flat.into_iter()
            .map(|v| {
                if v.fract() != 0.0 || v.abs() > f64::from(i32::MAX) {
                    return Err(ModelError::format(format!("prototype label {v} is not an integer")));
                }
                #[allow(clippy::cast_possible_truncation)]
                Ok(v as i32)
            })
            .collect()
    }
}

/// One trained GMLVQ model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GmlvqDoc {
    /// `K × m` prototypes
    pub w: DenseDoc,
    /// `K` prototype labels
    pub c_w: LabelsDoc,
    /// Metric factor `Ω`, with `Λ = Ω·Ωᵗ`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omega: Option<DenseDoc>,
    /// Precomputed metric `Λ`, preferred over `omega` when both are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<DenseDoc>,
}

impl GmlvqDoc {
    /// Build the classifier.
    ///
    /// # Errors
    ///
    /// - [`ModelError::Format`] for malformed matrices or a missing metric
    /// - [`ModelError::Processing`] for inconsistent dimensions
    pub fn to_classifier(&self) -> ModelResult<PrototypeClassifier> {
        let prototypes = self.w.to_matrix("w")?;
        let labels = self.c_w.to_labels()?;
        let classifier = match (&self.lambda, &self.omega) {
            (Some(lambda), _) => PrototypeClassifier::new(prototypes, labels, lambda.to_matrix("lambda")?)?,
            (None, Some(omega)) => PrototypeClassifier::from_omega(prototypes, labels, &omega.to_matrix("omega")?)?,
            (None, None) => return Err(ModelError::format("gmlvq model carries neither 'omega' nor 'lambda'")),
        };
        Ok(classifier)
    }
}
