//! Dense block storage for batched right-hand sides.
//!
//! A `Block` is a row-major `rows x cols` matrix whose rows start `stride`
//! elements apart. Each column is one independent system. Views borrow a
//! rectangular window of a block without copying and keep the parent
//! stride, so a sub-view of columns `2..4` reads the same memory as the
//! parent.

use crate::scalar::Scalar;
use rayon::prelude::*;
use std::ops::Range;

/// Number of elements a `rows x cols` window with the given stride spans.
fn span(rows: usize, cols: usize, stride: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * stride + cols
    }
}

fn check_window(rows: usize, cols: usize, r: &Range<usize>, c: &Range<usize>) {
    assert!(
        r.start <= r.end && r.end <= rows,
        "row range {r:?} out of bounds for {rows} rows"
    );
    assert!(
        c.start <= c.end && c.end <= cols,
        "column range {c:?} out of bounds for {cols} columns"
    );
}

/// Owned dense block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T> {
    rows: usize,
    cols: usize,
    stride: usize,
    data: Vec<T>,
}

impl<T: Scalar> Block<T> {
    /// Zero-filled block with a packed stride (`stride == cols`).
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::zeros_with_stride(rows, cols, cols)
    }

    /// Zero-filled block whose rows are padded to `stride` elements.
    pub fn zeros_with_stride(rows: usize, cols: usize, stride: usize) -> Self {
        assert!(stride >= cols, "stride {stride} smaller than {cols} columns");
        Self {
            rows,
            cols,
            stride,
            data: vec![T::zero(); rows * stride],
        }
    }

    /// Build from packed row-major data.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "expected {rows}x{cols} elements, got {}",
            data.len()
        );
        Self {
            rows,
            cols,
            stride: cols,
            data,
        }
    }

    /// Build from one vector per column. All columns must have equal length.
    pub fn from_columns(columns: &[Vec<T>]) -> Self {
        let cols = columns.len();
        let rows = columns.first().map_or(0, Vec::len);
        let mut block = Self::zeros(rows, cols);
        for (j, column) in columns.iter().enumerate() {
            assert_eq!(column.len(), rows, "column {j} has mismatched length");
            for (i, &v) in column.iter().enumerate() {
                block.data[i * cols + j] = v;
            }
        }
        block
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.stride + j]
    }

    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut T {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[i * self.stride + j]
    }

    /// Copy column `j` out into a vector.
    pub fn column(&self, j: usize) -> Vec<T> {
        (0..self.rows).map(|i| self.at(i, j)).collect()
    }

    pub fn fill(&mut self, value: T) {
        self.view_mut().fill(value);
    }

    pub fn view(&self) -> BlockView<'_, T> {
        BlockView {
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
            data: &self.data[..span(self.rows, self.cols, self.stride)],
        }
    }

    pub fn view_mut(&mut self) -> BlockViewMut<'_, T> {
        let len = span(self.rows, self.cols, self.stride);
        BlockViewMut {
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
            data: &mut self.data[..len],
        }
    }

    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> BlockView<'_, T> {
        self.view().submatrix(rows, cols)
    }

    pub fn submatrix_mut(&mut self, rows: Range<usize>, cols: Range<usize>) -> BlockViewMut<'_, T> {
        self.view_mut().into_submatrix(rows, cols)
    }
}

/// Read-only window into a block.
#[derive(Debug, Clone, Copy)]
pub struct BlockView<'a, T> {
    rows: usize,
    cols: usize,
    stride: usize,
    data: &'a [T],
}

impl<'a, T: Scalar> BlockView<'a, T> {
    /// Wrap a raw slice. `data` must cover `(rows - 1) * stride + cols` elements.
    pub fn new(rows: usize, cols: usize, stride: usize, data: &'a [T]) -> Self {
        assert!(stride >= cols, "stride {stride} smaller than {cols} columns");
        assert!(
            data.len() >= span(rows, cols, stride),
            "slice of {} elements too short for {rows}x{cols} with stride {stride}",
            data.len()
        );
        Self {
            rows,
            cols,
            stride,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.stride + j]
    }

    pub fn row(&self, i: usize) -> &'a [T] {
        let data: &'a [T] = self.data;
        let start = i * self.stride;
        &data[start..start + self.cols]
    }

    pub fn row_iter(&self) -> impl Iterator<Item = &'a [T]> + 'a {
        let data: &'a [T] = self.data;
        let cols = self.cols;
        data.chunks(self.stride.max(1))
            .take(self.rows)
            .map(move |row| &row[..cols])
    }

    pub fn par_rows(&self) -> impl IndexedParallelIterator<Item = &'a [T]> + 'a {
        let data: &'a [T] = self.data;
        let cols = self.cols;
        data.par_chunks(self.stride.max(1))
            .take(self.rows)
            .map(move |row| &row[..cols])
    }

    pub fn submatrix(&self, rows: Range<usize>, cols: Range<usize>) -> BlockView<'a, T> {
        check_window(self.rows, self.cols, &rows, &cols);
        let (nr, nc) = (rows.end - rows.start, cols.end - cols.start);
        let len = span(nr, nc, self.stride);
        let start = if len == 0 {
            0
        } else {
            rows.start * self.stride + cols.start
        };
        let data: &'a [T] = self.data;
        BlockView {
            rows: nr,
            cols: nc,
            stride: self.stride,
            data: &data[start..start + len],
        }
    }

    /// Copy out into an owned, packed block.
    pub fn to_block(&self) -> Block<T> {
        let mut data = Vec::with_capacity(self.rows * self.cols);
        for row in self.row_iter() {
            data.extend_from_slice(row);
        }
        Block::from_row_major(self.rows, self.cols, data)
    }
}

/// Mutable window into a block.
#[derive(Debug)]
pub struct BlockViewMut<'a, T> {
    rows: usize,
    cols: usize,
    stride: usize,
    data: &'a mut [T],
}

impl<'a, T: Scalar> BlockViewMut<'a, T> {
    /// Wrap a raw mutable slice. `data` must cover `(rows - 1) * stride + cols` elements.
    pub fn new(rows: usize, cols: usize, stride: usize, data: &'a mut [T]) -> Self {
        assert!(stride >= cols, "stride {stride} smaller than {cols} columns");
        assert!(
            data.len() >= span(rows, cols, stride),
            "slice of {} elements too short for {rows}x{cols} with stride {stride}",
            data.len()
        );
        Self {
            rows,
            cols,
            stride,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.stride + j]
    }

    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut T {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[i * self.stride + j]
    }

    /// Reborrow as a read-only view.
    pub fn as_view(&self) -> BlockView<'_, T> {
        BlockView {
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
            data: &*self.data,
        }
    }

    /// Reborrow mutably for a shorter lifetime.
    pub fn reborrow(&mut self) -> BlockViewMut<'_, T> {
        BlockViewMut {
            rows: self.rows,
            cols: self.cols,
            stride: self.stride,
            data: &mut *self.data,
        }
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [T]> + '_ {
        let cols = self.cols;
        self.data
            .chunks_mut(self.stride.max(1))
            .take(self.rows)
            .map(move |row| &mut row[..cols])
    }

    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut [T]> + '_ {
        let cols = self.cols;
        self.data
            .par_chunks_mut(self.stride.max(1))
            .take(self.rows)
            .map(move |row| &mut row[..cols])
    }

    pub fn fill(&mut self, value: T) {
        for row in self.rows_mut() {
            row.fill(value);
        }
    }

    /// Overwrite with the contents of `src`, which must have the same shape.
    pub fn copy_from(&mut self, src: BlockView<'_, T>) {
        assert_eq!(self.shape(), src.shape(), "copy_from shape mismatch");
        for (dst, src) in self.rows_mut().zip(src.row_iter()) {
            dst.copy_from_slice(src);
        }
    }

    /// Narrow to a sub-window, keeping the parent stride.
    pub fn into_submatrix(self, rows: Range<usize>, cols: Range<usize>) -> BlockViewMut<'a, T> {
        check_window(self.rows, self.cols, &rows, &cols);
        let (nr, nc) = (rows.end - rows.start, cols.end - cols.start);
        let len = span(nr, nc, self.stride);
        let start = if len == 0 {
            0
        } else {
            rows.start * self.stride + cols.start
        };
        let stride = self.stride;
        let data: &'a mut [T] = self.data;
        BlockViewMut {
            rows: nr,
            cols: nc,
            stride,
            data: &mut data[start..start + len],
        }
    }

    pub fn submatrix_mut(&mut self, rows: Range<usize>, cols: Range<usize>) -> BlockViewMut<'_, T> {
        self.reborrow().into_submatrix(rows, cols)
    }

    /// Split into rows `0..at` and `at..rows`. The halves never overlap, so
    /// they can be handed to separate kernel calls at the same time.
    pub fn split_rows_mut(self, at: usize) -> (BlockViewMut<'a, T>, BlockViewMut<'a, T>) {
        assert!(at <= self.rows, "split row {at} out of bounds for {} rows", self.rows);
        let mid = (at * self.stride).min(self.data.len());
        let (top, bottom) = self.data.split_at_mut(mid);
        (
            BlockViewMut {
                rows: at,
                cols: self.cols,
                stride: self.stride,
                data: top,
            },
            BlockViewMut {
                rows: self.rows - at,
                cols: self.cols,
                stride: self.stride,
                data: bottom,
            },
        )
    }
}

/// One scalar per column (`rho`, `prev_rho`, `beta`).
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRow<T> {
    values: Vec<T>,
}

impl<T: Scalar> ScalarRow<T> {
    pub fn zeros(cols: usize) -> Self {
        Self::filled(cols, T::zero())
    }

    pub fn filled(cols: usize, value: T) -> Self {
        Self {
            values: vec![value; cols],
        }
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        Self { values }
    }

    pub fn cols(&self) -> usize {
        self.values.len()
    }

    pub fn at(&self, j: usize) -> T {
        self.values[j]
    }

    pub fn at_mut(&mut self, j: usize) -> &mut T {
        &mut self.values[j]
    }

    pub fn fill(&mut self, value: T) {
        self.values.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }
}
