//! Matrix storage and views.
//!
//! Everything is column-major with a leading dimension, the layout both the kernels and the
//! distributed block-cyclic storage rely on. Views are bounds-checked and reborrowable through
//! [`reborrow`], so a routine can hand out a shorter lived view with `rb()`/`rb_mut()` and keep
//! using its own afterwards.
//!
//! ```
//! use hplai::mat::Mat;
//! use hplai::reborrow::*;
//!
//! let mut a = Mat::from_fn(4, 3, |i, j| (i + 10 * j) as f64);
//! let (left, mut right) = a.as_mut().split_at_col_mut(1);
//! right.write(0, 0, left.read(3, 0));
//! assert_eq!(a.read(0, 1), 3.0);
//! assert_eq!(a.as_ref().transpose().read(2, 1), 21.0);
//! ```

use reborrow::*;

mod matmut;
mod matown;
mod matref;

pub use matmut::MatMut;
pub use matown::Mat;
pub use matref::MatRef;
