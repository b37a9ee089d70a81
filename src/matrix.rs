//! Dense row-major matrix used for every per-(intensity, frequency) quantity.
//!
//! Rows are intensity entries in caller order, columns are frequencies in
//! sweep order.

use std::ops::{Index, IndexMut};

/// Dense matrix of f64 stored row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub nrows: usize,
    pub ncols: usize,
    /// Values, `values[row * ncols + col]`.
    pub values: Vec<f64>,
}

impl Matrix {
    /// Zero-filled matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            values: vec![0.0; nrows * ncols],
        }
    }

    /// Build a matrix by repeating `row` `nrows` times.
    pub fn from_repeated_row(nrows: usize, row: &[f64]) -> Self {
        let mut values = Vec::with_capacity(nrows * row.len());
        for _ in 0..nrows {
            values.extend_from_slice(row);
        }
        Self {
            nrows,
            ncols: row.len(),
            values,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.ncols..(i + 1) * self.ncols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.values[i * self.ncols..(i + 1) * self.ncols]
    }

    /// Apply `f` to every element, producing a matrix of the same shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            nrows: self.nrows,
            ncols: self.ncols,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Element-wise combination of two equally shaped matrices.
    ///
    /// Panics if the shapes differ.
    pub fn zip_map(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Self {
        assert_eq!(
            self.shape(),
            other.shape(),
            "matrix shape mismatch in element-wise operation"
        );
        Self {
            nrows: self.nrows,
            ncols: self.ncols,
            values: self
                .values
                .iter()
                .zip(&other.values)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// Iterate rows as slices.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics, an empty row set yields nothing
        let width = self.ncols.max(1);
        self.values.chunks_exact(width).take(self.nrows)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        debug_assert!(row < self.nrows && col < self.ncols);
        &self.values[row * self.ncols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        debug_assert!(row < self.nrows && col < self.ncols);
        &mut self.values[row * self.ncols + col]
    }
}
