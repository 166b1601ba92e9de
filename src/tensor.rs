//! Tensor implementation
//!
//! A row-major N-dimensional array holding model weights, activations and
//! logits. Only the handful of operations a single-layer GRU needs are
//! provided.

use std::fmt;

use num_traits::Num;
use serde::{Deserialize, Serialize};

use crate::error::{CantopopError, Result};

/// Number of elements in `shape`, or `None` if the product overflows
#[must_use]
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// N-dimensional tensor in row-major order
///
/// # Examples
///
/// ```
/// use cantopop::Tensor;
///
/// let t = Tensor::from_vec(vec![2, 3], vec![
///     1.0, 2.0, 3.0,
///     4.0, 5.0, 6.0,
/// ]).unwrap();
///
/// assert_eq!(t.shape(), &[2, 3]);
/// assert_eq!(t.row(1).unwrap(), &[4.0, 5.0, 6.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor<T: Num> {
    /// Flattened data in row-major order
    data: Vec<T>,
    /// Shape of the tensor
    shape: Vec<usize>,
}

impl<T: Num + Clone> Tensor<T> {
    /// Create a new tensor from a shape and flattened data
    ///
    /// # Errors
    ///
    /// Returns `Err` if the shape is empty, contains a zero, or does not
    /// match the data length.
    pub fn from_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if shape.is_empty() {
            return Err(CantopopError::InvalidShape {
                reason: "Shape cannot be empty".to_string(),
            });
        }

        if shape.contains(&0) {
            return Err(CantopopError::InvalidShape {
                reason: "Shape dimensions cannot be zero".to_string(),
            });
        }

        let expected = element_count(&shape).ok_or_else(|| CantopopError::InvalidShape {
            reason: format!("Shape {shape:?} has more elements than fit in usize"),
        })?;
        if data.len() != expected {
            return Err(CantopopError::DataShapeMismatch {
                data_size: data.len(),
                shape,
                expected,
            });
        }

        Ok(Self { data, shape })
    }

    /// Create a tensor filled with zeros
    ///
    /// # Errors
    ///
    /// Same shape rules as [`Tensor::from_vec`].
    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let len = element_count(&shape).ok_or_else(|| CantopopError::InvalidShape {
            reason: format!("Shape {shape:?} has more elements than fit in usize"),
        })?;
        Self::from_vec(shape, vec![T::zero(); len])
    }

    /// Shape of the tensor
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Underlying data
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Consume the tensor and return its data
    #[must_use]
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Length of the last dimension
    #[must_use]
    pub fn row_len(&self) -> usize {
        self.shape[self.shape.len() - 1]
    }

    /// Number of rows when viewed as `[size / row_len, row_len]`
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.data.len() / self.row_len()
    }

    /// Borrow one row of the tensor viewed as a matrix
    ///
    /// # Errors
    ///
    /// Returns error if `index` is past the last row.
    pub fn row(&self, index: usize) -> Result<&[T]> {
        let width = self.row_len();
        let rows = self.num_rows();
        if index >= rows {
            return Err(CantopopError::InvalidShape {
                reason: format!("Row {index} out of bounds for {rows} rows"),
            });
        }
        Ok(&self.data[index * width..(index + 1) * width])
    }
}

impl Tensor<f32> {
    /// Multiply a row vector by this `[k, n]` matrix, adding into `out`
    ///
    /// `out[j] += sum_i x[i] * self[i, j]`. Keras stores dense and recurrent
    /// kernels as `[in, out]`, so this is the natural product for them.
    ///
    /// # Errors
    ///
    /// Returns error if the tensor is not 2-D or the lengths disagree.
    pub fn vecmat_into(&self, x: &[f32], out: &mut [f32]) -> Result<()> {
        if self.ndim() != 2 {
            return Err(CantopopError::InvalidShape {
                reason: format!("vecmat needs a 2-D matrix, got shape {:?}", self.shape),
            });
        }
        let (k, n) = (self.shape[0], self.shape[1]);
        if x.len() != k || out.len() != n {
            return Err(CantopopError::InvalidShape {
                reason: format!(
                    "vecmat: input {} x matrix [{k}, {n}] -> output {}",
                    x.len(),
                    out.len()
                ),
            });
        }

        for (i, &xi) in x.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            let row = &self.data[i * n..(i + 1) * n];
            for (o, &w) in out.iter_mut().zip(row) {
                *o += xi * w;
            }
        }
        Ok(())
    }
}

impl<T: Num + Clone + fmt::Display> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?}, data=[", self.shape)?;
        for (i, val) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{val}")?;
        }
        write!(f, "])")
    }
}
