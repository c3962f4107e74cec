use super::*;
use crate::{assert, debug_assert};

/// Immutable view over a matrix, similar to an immutable reference to a 2D strided slice.
///
/// Unlike [`MatMut`], the strides are arbitrary, which makes [`MatRef::transpose`] free.
pub struct MatRef<'a, T> {
    data: &'a [T],
    nrows: usize,
    ncols: usize,
    row_stride: usize,
    col_stride: usize,
}

impl<T> Copy for MatRef<'_, T> {}
impl<T> Clone for MatRef<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'short, T> Reborrow<'short> for MatRef<'_, T> {
    type Target = MatRef<'short, T>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        *self
    }
}

impl<'short, T> ReborrowMut<'short> for MatRef<'_, T> {
    type Target = MatRef<'short, T>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        *self
    }
}

impl<'a, T> IntoConst for MatRef<'a, T> {
    type Target = MatRef<'a, T>;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}

impl<'a, T> MatRef<'a, T> {
    /// Creates a view over `data` with the given strides.
    ///
    /// # Panics
    /// Panics if the largest index addressed by the view is out of bounds of `data`.
    #[inline]
    #[track_caller]
    pub fn from_slice_with_strides(
        data: &'a [T],
        nrows: usize,
        ncols: usize,
        row_stride: usize,
        col_stride: usize,
    ) -> Self {
        assert!(extent(nrows, ncols, row_stride, col_stride) <= data.len());
        Self {
            data: if nrows == 0 || ncols == 0 {
                &data[..0]
            } else {
                data
            },
            nrows,
            ncols,
            row_stride,
            col_stride,
        }
    }

    /// Creates a column-major view over `data`, with consecutive columns `ld` elements apart.
    #[inline]
    #[track_caller]
    pub fn from_column_major_slice_with_ld(
        data: &'a [T],
        nrows: usize,
        ncols: usize,
        ld: usize,
    ) -> Self {
        assert!(ld >= nrows);
        Self::from_slice_with_strides(data, nrows, ncols, 1, ld)
    }

    /// Creates a column-major view over `data`, with tightly packed columns.
    #[inline]
    #[track_caller]
    pub fn from_column_major_slice(data: &'a [T], nrows: usize, ncols: usize) -> Self {
        Self::from_slice_with_strides(data, nrows, ncols, 1, nrows)
    }

    /// Returns the number of rows of the matrix.
    #[inline(always)]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline(always)]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Returns the number of rows and columns of the matrix.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Returns the row stride of the matrix, specified in number of elements, not in bytes.
    #[inline(always)]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Returns the column stride of the matrix, specified in number of elements, not in bytes.
    #[inline(always)]
    pub fn col_stride(&self) -> usize {
        self.col_stride
    }

    /// Returns a pointer to the element at position `(0, 0)`.
    #[inline(always)]
    pub fn as_ptr(self) -> *const T {
        self.data.as_ptr()
    }

    /// Returns the view of the transpose of the matrix.
    #[inline]
    pub fn transpose(self) -> Self {
        Self {
            data: self.data,
            nrows: self.ncols,
            ncols: self.nrows,
            row_stride: self.col_stride,
            col_stride: self.row_stride,
        }
    }

    /// Reads the value of the element at the given indices, with bound checks.
    ///
    /// # Panics
    /// The function panics if any of the following conditions are violated:
    /// * `row < self.nrows()`.
    /// * `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub fn read(&self, row: usize, col: usize) -> T
    where
        T: Copy,
    {
        assert!(all(row < self.nrows, col < self.ncols));
        self.data[row * self.row_stride + col * self.col_stride]
    }

    /// Returns column `col` as a slice.
    ///
    /// # Panics
    /// Panics if `col >= self.ncols()` or if the rows of the view are not contiguous.
    #[inline]
    #[track_caller]
    pub fn col_as_slice(self, col: usize) -> &'a [T] {
        assert!(all(col < self.ncols, self.row_stride == 1));
        if self.nrows == 0 {
            return &self.data[..0];
        }
        let start = col * self.col_stride;
        &self.data[start..start + self.nrows]
    }

    /// Returns a view over the submatrix starting at `(row_start, col_start)`, with `nrows` rows
    /// and `ncols` columns.
    ///
    /// # Panics
    /// The function panics if any of the following conditions are violated:
    /// * `row_start <= self.nrows()`.
    /// * `col_start <= self.ncols()`.
    /// * `nrows <= self.nrows() - row_start`.
    /// * `ncols <= self.ncols() - col_start`.
    #[inline]
    #[track_caller]
    pub fn submatrix(self, row_start: usize, col_start: usize, nrows: usize, ncols: usize) -> Self {
        assert!(all(row_start <= self.nrows, col_start <= self.ncols));
        assert!(all(nrows <= self.nrows - row_start, ncols <= self.ncols - col_start));
        let data = if nrows == 0 || ncols == 0 {
            &self.data[..0]
        } else {
            &self.data[row_start * self.row_stride + col_start * self.col_stride..]
        };
        Self {
            data,
            nrows,
            ncols,
            row_stride: self.row_stride,
            col_stride: self.col_stride,
        }
    }

    /// Returns a view over the rows `row_start..row_start + nrows`.
    #[inline]
    #[track_caller]
    pub fn subrows(self, row_start: usize, nrows: usize) -> Self {
        let ncols = self.ncols;
        self.submatrix(row_start, 0, nrows, ncols)
    }

    /// Returns a view over the columns `col_start..col_start + ncols`.
    #[inline]
    #[track_caller]
    pub fn subcols(self, col_start: usize, ncols: usize) -> Self {
        let nrows = self.nrows;
        self.submatrix(0, col_start, nrows, ncols)
    }

    /// Returns an owning [`Mat`] of the data.
    #[inline]
    pub fn to_owned(&self) -> Mat<T>
    where
        T: Copy + Default,
    {
        let this = *self;
        Mat::from_fn(self.nrows, self.ncols, |i, j| this.read(i, j))
    }
}

impl<T: Copy + core::fmt::Debug> core::fmt::Debug for MatRef<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        struct DebugRow<'a, T>(MatRef<'a, T>, usize);
        impl<T: Copy + core::fmt::Debug> core::fmt::Debug for DebugRow<'_, T> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_list()
                    .entries((0..self.0.ncols()).map(|j| self.0.read(self.1, j)))
                    .finish()
            }
        }
        f.debug_list()
            .entries((0..self.nrows).map(|i| DebugRow(*self, i)))
            .finish()
    }
}

/// Number of elements a strided view needs to address.
#[inline]
pub(crate) fn extent(nrows: usize, ncols: usize, row_stride: usize, col_stride: usize) -> usize {
    if nrows == 0 || ncols == 0 {
        0
    } else {
        let last = (nrows - 1) * row_stride + (ncols - 1) * col_stride;
        debug_assert!(last < usize::MAX);
        last + 1
    }
}
