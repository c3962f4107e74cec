//! Helpers shared by the kernels and the distributed routines.

/// Dispatch helpers for [`crate::Parallelism`].
pub mod thread;

/// Converts a slice of plain-old-data scalars to the bytes sent over a communicator.
#[inline]
pub fn as_bytes<T: bytemuck::Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

/// Mutable counterpart of [`as_bytes`], used as a receive buffer.
#[inline]
pub fn as_bytes_mut<T: bytemuck::Pod>(data: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(data)
}

/// Returns `ceil(a / b)`.
#[inline]
pub fn div_ceil(a: usize, b: usize) -> usize {
    let d = a / b;
    if a % b != 0 {
        d + 1
    } else {
        d
    }
}
