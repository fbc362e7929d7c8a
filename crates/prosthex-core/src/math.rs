//! Sparse linear algebra for reservoir weights
//!
//! The recurrent connectivity of an echo state reservoir is large and mostly
//! zero, so it is stored in compressed sparse row (CSR) form and applied to
//! dense state vectors in `O(nnz)` time.

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, ProcessingResult};

/// One non-zero entry of a sparse matrix (0-based indices).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseEntry {
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
    /// Entry value
    pub value: f64,
}

impl SparseEntry {
    /// Create an entry
    #[must_use]
    pub const fn new(row: usize, col: usize, value: f64) -> Self {
        Self { row, col, value }
    }
}

// ============================================================================
// Compressed Sparse Row Matrix
// ============================================================================

/// Immutable `rows × cols` matrix in compressed sparse row storage.
///
/// Invariants established by [`SparseWeightMatrix::new`]:
/// - `row_ptr` has `rows + 1` monotonically non-decreasing entries
/// - every stored column index is `< cols`
/// - entries within a row are sorted by column
#[derive(Clone, Debug, PartialEq)]
pub struct SparseWeightMatrix {
    values: Vec<f64>,
    col_idx: Vec<usize>,
    row_ptr: Vec<usize>,
    rows: usize,
    cols: usize,
}

impl SparseWeightMatrix {
    /// Build a matrix from 0-based triplets.
    ///
    /// Entries are sorted by `(row, col)` before compression. Duplicate
    /// coordinates are kept and sum up in [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::IndexOutOfBounds`] if any entry lies outside
    /// the declared shape, or [`ProcessingError::InvalidParameter`] if `rows`
    /// cannot be indexed.
    pub fn new(mut entries: Vec<SparseEntry>, rows: usize, cols: usize) -> ProcessingResult<Self> {
        let row_slots = rows
            .checked_add(1)
            .ok_or_else(|| ProcessingError::invalid("rows", format!("{rows} rows cannot be addressed")))?;
        entries.sort_by(|a, b| (a.row, a.col).cmp(&(b.row, b.col)));

        let mut row_ptr = vec![0usize; row_slots];
        let mut col_idx = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());

        for entry in &entries {
            if entry.row >= rows {
                return Err(ProcessingError::IndexOutOfBounds { axis: "row", index: entry.row, bound: rows });
            }
            if entry.col >= cols {
                return Err(ProcessingError::IndexOutOfBounds { axis: "column", index: entry.col, bound: cols });
            }
            row_ptr[entry.row + 1] += 1;
            col_idx.push(entry.col);
            values.push(entry.value);
        }

        // Per-row counts to prefix sums
        for i in 0..rows {
            row_ptr[i + 1] += row_ptr[i];
        }

        Ok(Self { values, col_idx, row_ptr, rows, cols })
    }

    /// Build a matrix from 1-based `(row, col, value)` triplets as found in
    /// exported model documents.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::IndexOutOfBounds`] for a zero index or an
    /// index beyond the declared shape.
    pub fn from_one_based(triplets: &[(usize, usize, f64)], rows: usize, cols: usize) -> ProcessingResult<Self> {
        let mut entries = Vec::with_capacity(triplets.len());
        for &(i, j, value) in triplets {
            let row = i
                .checked_sub(1)
                .ok_or(ProcessingError::IndexOutOfBounds { axis: "row", index: 0, bound: rows })?;
            let col = j
                .checked_sub(1)
                .ok_or(ProcessingError::IndexOutOfBounds { axis: "column", index: 0, bound: cols })?;
            entries.push(SparseEntry::new(row, col, value));
        }
        Self::new(entries, rows, cols)
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries
    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// True when rows and columns agree
    #[inline]
    #[must_use]
    pub const fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Stored `(col, value)` pairs of row `i`, in column order
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()].iter().copied().zip(self.values[range].iter().copied())
    }

    /// Multiply this matrix from the left onto `x`, returning `W · x`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::DimensionMismatch`] if `x.len() != cols`.
    pub fn apply(&self, x: &[f64]) -> ProcessingResult<Vec<f64>> {
        if x.len() != self.cols {
            return Err(ProcessingError::mismatch("sparse matrix-vector product", self.cols, x.len()));
        }
        let mut y = vec![0.0; self.rows];
        for (i, yi) in y.iter_mut().enumerate() {
            let mut acc = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                acc += self.values[k] * x[self.col_idx[k]];
            }
            *yi = acc;
        }
        Ok(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> SparseWeightMatrix {
        // [[0, 2, 0],
        //  [0, 0, 0],
        //  [1, 0, 3]]
        SparseWeightMatrix::new(
            vec![
                SparseEntry::new(2, 2, 3.0),
                SparseEntry::new(0, 1, 2.0),
                SparseEntry::new(2, 0, 1.0),
            ],
            3,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_apply_matches_dense_product() {
        let w = sample_matrix();
        let y = w.apply(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(y, vec![4.0, 0.0, 10.0]);
    }

    #[test]
    fn test_apply_zero_vector_yields_zeros_of_row_count() {
        let w = SparseWeightMatrix::new(vec![SparseEntry::new(3, 1, 0.5), SparseEntry::new(0, 0, -1.0)], 4, 2)
            .unwrap();
        let y = w.apply(&[0.0, 0.0]).unwrap();
        assert_eq!(y, vec![0.0; 4]);
    }

    #[test]
    fn test_unaddressable_row_count_is_rejected() {
        let err = SparseWeightMatrix::new(Vec::new(), usize::MAX, 1).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidParameter { parameter: "rows", .. }));
    }

    #[test]
    fn test_rows_are_sorted_and_pointers_monotone() {
        let w = sample_matrix();
        assert_eq!(w.nnz(), 3);
        assert!(w.row_ptr.windows(2).all(|p| p[0] <= p[1]));
        let row2: Vec<(usize, f64)> = w.row(2).collect();
        assert_eq!(row2, vec![(0, 1.0), (2, 3.0)]);
        assert_eq!(w.row(1).count(), 0);
    }

    #[test]
    fn test_out_of_range_indices() {
        let err = SparseWeightMatrix::new(vec![SparseEntry::new(3, 0, 1.0)], 3, 3).unwrap_err();
        assert!(matches!(err, ProcessingError::IndexOutOfBounds { axis: "row", index: 3, bound: 3 }));

        let err = SparseWeightMatrix::new(vec![SparseEntry::new(0, 5, 1.0)], 3, 3).unwrap_err();
        assert!(matches!(err, ProcessingError::IndexOutOfBounds { axis: "column", index: 5, bound: 3 }));
    }

    #[test]
    fn test_one_based_conversion() {
        let w = SparseWeightMatrix::from_one_based(&[(1, 2, 2.0), (3, 1, 1.0), (3, 3, 3.0)], 3, 3).unwrap();
        assert_eq!(w, sample_matrix());

        let err = SparseWeightMatrix::from_one_based(&[(0, 1, 1.0)], 3, 3).unwrap_err();
        assert!(matches!(err, ProcessingError::IndexOutOfBounds { index: 0, .. }));
    }

    #[test]
    fn test_apply_dimension_mismatch() {
        let w = sample_matrix();
        let err = w.apply(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err, ProcessingError::mismatch("sparse matrix-vector product", 3, 2));
    }

    #[test]
    fn test_duplicate_entries_sum() {
        let w = SparseWeightMatrix::new(vec![SparseEntry::new(0, 0, 1.0), SparseEntry::new(0, 0, 2.0)], 1, 1)
            .unwrap();
        assert_eq!(w.apply(&[2.0]).unwrap(), vec![6.0]);
    }
}
