/*!
The binary feature-allocation matrix.

Rows are observations, columns are latent features, and entry `(i, k)` is `1` when
feature `k` is active for observation `i`. The number of columns changes only through
[`FeatureAllocationMatrix::select_columns`] and
[`FeatureAllocationMatrix::with_singletons`], which always build a fresh buffer.

# Examples

```rust
use pgfa::feature_matrix::FeatureAllocationMatrix;

let z = FeatureAllocationMatrix::from_rows(&[
    vec![1, 0, 1],
    vec![1, 0, 0],
    vec![0, 0, 0],
])
.unwrap();

// Column sums with row 0 left out.
assert_eq!(z.column_counts_excluding(0), vec![1, 0, 0]);
assert_eq!(z.non_singleton_idxs(0), vec![0]);
assert_eq!(z.singleton_idxs(0), vec![1, 2]);
```
*/

use ndarray::{Array2, ArrayView1, Axis};

use crate::error::SamplerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAllocationMatrix {
    z: Array2<u8>,
}

impl FeatureAllocationMatrix {
    /// An all-zero matrix with `num_rows` observations and `num_features` features.
    pub fn zeros(num_rows: usize, num_features: usize) -> Self {
        Self {
            z: Array2::zeros((num_rows, num_features)),
        }
    }

    /// Wraps an existing array, checking that every entry is 0 or 1.
    pub fn from_array(z: Array2<u8>) -> Result<Self, SamplerError> {
        if let Some(((row_idx, col_idx), &value)) = z.indexed_iter().find(|(_, v)| **v > 1) {
            return Err(SamplerError::NonBinaryEntry {
                row_idx,
                col_idx,
                value: value as i64,
            });
        }
        Ok(Self { z })
    }

    /// Builds a matrix from row vectors of equal length.
    pub fn from_rows(rows: &[Vec<i64>]) -> Result<Self, SamplerError> {
        let num_features = rows.first().map_or(0, |r| r.len());
        let mut z = Array2::zeros((rows.len(), num_features));
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != num_features {
                return Err(SamplerError::DimensionMismatch {
                    what: "feature allocation row length",
                    expected: num_features,
                    found: row.len(),
                });
            }
            for (col_idx, &value) in row.iter().enumerate() {
                if value != 0 && value != 1 {
                    return Err(SamplerError::NonBinaryEntry {
                        row_idx,
                        col_idx,
                        value,
                    });
                }
                z[(row_idx, col_idx)] = value as u8;
            }
        }
        Ok(Self { z })
    }

    pub fn num_rows(&self) -> usize {
        self.z.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.z.ncols()
    }

    pub fn as_array(&self) -> &Array2<u8> {
        &self.z
    }

    /// The matrix as floats, convenient for likelihood code.
    pub fn to_f64(&self) -> Array2<f64> {
        self.z.mapv(f64::from)
    }

    #[inline]
    pub fn get(&self, row_idx: usize, col_idx: usize) -> u8 {
        self.z[(row_idx, col_idx)]
    }

    #[inline]
    pub fn set(&mut self, row_idx: usize, col_idx: usize, value: u8) {
        debug_assert!(value <= 1, "feature allocation entries are binary");
        self.z[(row_idx, col_idx)] = value;
    }

    pub fn row(&self, row_idx: usize) -> ArrayView1<'_, u8> {
        self.z.row(row_idx)
    }

    /// Values of `row_idx` at the given columns, in the order the columns are listed.
    pub fn row_values(&self, row_idx: usize, cols: &[usize]) -> Vec<u8> {
        cols.iter().map(|&k| self.z[(row_idx, k)]).collect()
    }

    /// Writes `values[j]` into column `cols[j]` of `row_idx`.
    pub fn set_row_values(&mut self, row_idx: usize, cols: &[usize], values: &[u8]) {
        debug_assert_eq!(cols.len(), values.len());
        for (&k, &v) in cols.iter().zip(values) {
            self.set(row_idx, k, v);
        }
    }

    /// Number of active entries per column.
    pub fn column_counts(&self) -> Vec<usize> {
        self.z
            .axis_iter(Axis(1))
            .map(|col| col.iter().filter(|&&v| v == 1).count())
            .collect()
    }

    /// Number of active entries per column, not counting `row_idx`.
    pub fn column_counts_excluding(&self, row_idx: usize) -> Vec<usize> {
        let row = self.z.row(row_idx);
        self.column_counts()
            .into_iter()
            .zip(row.iter())
            .map(|(m, &v)| m - v as usize)
            .collect()
    }

    /// Columns that some other row also uses.
    pub fn non_singleton_idxs(&self, row_idx: usize) -> Vec<usize> {
        self.column_counts_excluding(row_idx)
            .into_iter()
            .enumerate()
            .filter_map(|(k, m)| (m > 0).then_some(k))
            .collect()
    }

    /// Columns no other row uses. Includes columns that are empty altogether.
    pub fn singleton_idxs(&self, row_idx: usize) -> Vec<usize> {
        self.column_counts_excluding(row_idx)
            .into_iter()
            .enumerate()
            .filter_map(|(k, m)| (m == 0).then_some(k))
            .collect()
    }

    /// A new matrix holding only the listed columns, in the listed order.
    pub fn select_columns(&self, keep: &[usize]) -> Self {
        Self {
            z: self.z.select(Axis(1), keep),
        }
    }

    /// A new matrix holding the `keep` columns followed by `num_new` columns that are
    /// active in `row_idx` only.
    pub fn with_singletons(&self, keep: &[usize], row_idx: usize, num_new: usize) -> Self {
        let num_kept = keep.len();
        let mut z = Array2::zeros((self.num_rows(), num_kept + num_new));
        for (new_k, &old_k) in keep.iter().enumerate() {
            z.column_mut(new_k).assign(&self.z.column(old_k));
        }
        for k in num_kept..num_kept + num_new {
            z[(row_idx, k)] = 1;
        }
        Self { z }
    }

    /// Checks that `row_idx` names an existing row.
    pub fn check_row(&self, row_idx: usize) -> Result<(), SamplerError> {
        if row_idx >= self.num_rows() {
            return Err(SamplerError::RowOutOfBounds {
                row_idx,
                num_rows: self.num_rows(),
            });
        }
        Ok(())
    }

    /// Checks that every listed column exists.
    pub fn check_columns(&self, cols: &[usize]) -> Result<(), SamplerError> {
        match cols.iter().find(|&&k| k >= self.num_features()) {
            Some(&col_idx) => Err(SamplerError::ColumnOutOfBounds {
                col_idx,
                num_features: self.num_features(),
            }),
            None => Ok(()),
        }
    }
}
