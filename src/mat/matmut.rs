use super::*;
use crate::assert;

/// Mutable view over a column-major matrix, similar to a mutable reference to a 2D strided
/// slice.
///
/// Rows are contiguous and consecutive columns are [`MatMut::ld`] elements apart, following the
/// usual leading-dimension convention of dense linear algebra. Distributed local blocks, panels
/// and the `L1` buffer are all addressed through this type.
pub struct MatMut<'a, T> {
    data: &'a mut [T],
    nrows: usize,
    ncols: usize,
    ld: usize,
}

impl<'short, T> Reborrow<'short> for MatMut<'_, T> {
    type Target = MatRef<'short, T>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        MatRef::from_column_major_slice_with_ld(&*self.data, self.nrows, self.ncols, self.ld)
    }
}

impl<'short, T> ReborrowMut<'short> for MatMut<'_, T> {
    type Target = MatMut<'short, T>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        MatMut {
            data: &mut *self.data,
            nrows: self.nrows,
            ncols: self.ncols,
            ld: self.ld,
        }
    }
}

impl<'a, T> IntoConst for MatMut<'a, T> {
    type Target = MatRef<'a, T>;

    #[inline]
    fn into_const(self) -> Self::Target {
        MatRef::from_column_major_slice_with_ld(self.data, self.nrows, self.ncols, self.ld)
    }
}

impl<'a, T> MatMut<'a, T> {
    /// Creates a column-major view over `data`, with consecutive columns `ld` elements apart.
    ///
    /// # Panics
    /// Panics if `ld < nrows` or if `data` is too short to hold the matrix.
    #[inline]
    #[track_caller]
    pub fn from_column_major_slice_with_ld_mut(
        data: &'a mut [T],
        nrows: usize,
        ncols: usize,
        ld: usize,
    ) -> Self {
        assert!(ld >= nrows);
        assert!(super::matref::extent(nrows, ncols, 1, ld) <= data.len());
        Self {
            data,
            nrows,
            ncols,
            ld,
        }
    }

    /// Creates a column-major view over `data`, with tightly packed columns.
    #[inline]
    #[track_caller]
    pub fn from_column_major_slice_mut(data: &'a mut [T], nrows: usize, ncols: usize) -> Self {
        Self::from_column_major_slice_with_ld_mut(data, nrows, ncols, nrows)
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

    /// Returns the leading dimension, i.e. the distance between two consecutive columns.
    #[inline(always)]
    pub fn ld(&self) -> usize {
        self.ld
    }

    /// Returns a mutable pointer to the element at position `(0, 0)`.
    #[inline(always)]
    pub fn as_ptr_mut(&mut self) -> *mut T {
        self.data.as_mut_ptr()
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
        self.data[row + col * self.ld]
    }

    /// Writes the value to the element at the given indices, with bound checks.
    ///
    /// # Panics
    /// The function panics if any of the following conditions are violated:
    /// * `row < self.nrows()`.
    /// * `col < self.ncols()`.
    #[inline(always)]
    #[track_caller]
    pub fn write(&mut self, row: usize, col: usize, value: T) {
        assert!(all(row < self.nrows, col < self.ncols));
        self.data[row + col * self.ld] = value;
    }

    /// Returns column `col` as a slice.
    #[inline]
    #[track_caller]
    pub fn col_as_slice(&self, col: usize) -> &[T] {
        assert!(col < self.ncols);
        if self.nrows == 0 {
            return &self.data[..0];
        }
        let start = col * self.ld;
        &self.data[start..start + self.nrows]
    }

    /// Returns column `col` as a mutable slice.
    #[inline]
    #[track_caller]
    pub fn col_as_slice_mut(&mut self, col: usize) -> &mut [T] {
        assert!(col < self.ncols);
        if self.nrows == 0 {
            return &mut self.data[..0];
        }
        let start = col * self.ld;
        &mut self.data[start..start + self.nrows]
    }

    /// Same as [`MatMut::col_as_slice_mut`], but consumes the view to return a slice with the
    /// full lifetime.
    #[inline]
    #[track_caller]
    pub fn into_col_as_slice_mut(self, col: usize) -> &'a mut [T] {
        assert!(col < self.ncols);
        if self.nrows == 0 {
            return &mut self.data[..0];
        }
        let start = col * self.ld;
        &mut self.data[start..start + self.nrows]
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
    pub fn submatrix_mut(
        self,
        row_start: usize,
        col_start: usize,
        nrows: usize,
        ncols: usize,
    ) -> Self {
        assert!(all(row_start <= self.nrows, col_start <= self.ncols));
        assert!(all(nrows <= self.nrows - row_start, ncols <= self.ncols - col_start));
        let ld = self.ld;
        let data = if nrows == 0 || ncols == 0 {
            &mut self.data[..0]
        } else {
            &mut self.data[row_start + col_start * ld..]
        };
        Self {
            data,
            nrows,
            ncols,
            ld,
        }
    }

    /// Returns a view over the rows `row_start..row_start + nrows`.
    #[inline]
    #[track_caller]
    pub fn subrows_mut(self, row_start: usize, nrows: usize) -> Self {
        let ncols = self.ncols;
        self.submatrix_mut(row_start, 0, nrows, ncols)
    }

    /// Returns a view over the columns `col_start..col_start + ncols`.
    #[inline]
    #[track_caller]
    pub fn subcols_mut(self, col_start: usize, ncols: usize) -> Self {
        let nrows = self.nrows;
        self.submatrix_mut(0, col_start, nrows, ncols)
    }

    /// Splits the matrix vertically at the given column into two parts and returns the left and
    /// right halves.
    ///
    /// # Panics
    /// Panics if `col > self.ncols()`.
    #[inline]
    #[track_caller]
    pub fn split_at_col_mut(self, col: usize) -> (Self, Self) {
        assert!(col <= self.ncols);
        let Self {
            data,
            nrows,
            ncols,
            ld,
        } = self;
        let mid = Ord::min(col * ld, data.len());
        let (left, right) = data.split_at_mut(mid);
        (
            Self {
                data: left,
                nrows,
                ncols: col,
                ld,
            },
            Self {
                data: right,
                nrows,
                ncols: ncols - col,
                ld,
            },
        )
    }

    /// Copies the values from `other` into `self`.
    ///
    /// # Panics
    /// Panics if the two matrices do not have the same shape.
    #[track_caller]
    pub fn copy_from(&mut self, other: MatRef<'_, T>)
    where
        T: Copy,
    {
        assert!(all(self.nrows == other.nrows(), self.ncols == other.ncols()));
        for j in 0..self.ncols {
            for i in 0..self.nrows {
                self.write(i, j, other.read(i, j));
            }
        }
    }

    /// Fills the matrix with `value`.
    pub fn fill(&mut self, value: T)
    where
        T: Copy,
    {
        for j in 0..self.ncols {
            self.col_as_slice_mut(j).fill(value);
        }
    }

    /// Returns a view over the transpose of the matrix.
    #[inline]
    pub fn transpose(self) -> MatRef<'a, T> {
        self.into_const().transpose()
    }
}

impl<T: Copy + core::fmt::Debug> core::fmt::Debug for MatMut<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.rb().fmt(f)
    }
}
