//! Host-side batch of matrix-vector problems.

use crate::error::BatchError;
use crate::scalar::Scalar;

/// Allocate `len` copies of `value`, reporting allocation failure instead of
/// aborting.
pub fn try_alloc<T: Clone>(len: usize, value: T) -> Result<Vec<T>, BatchError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| BatchError::HostAlloc { elements: len })?;
    buf.resize(len, value);
    Ok(buf)
}

/// `num` independent problems `C_i = A_i * B_i`.
///
/// Matrices are packed back to back, each `size x size` in column-major
/// order. Vectors are packed back to back, `size` elements each.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBatch<T> {
    size: usize,
    num: usize,
    matrices: Vec<T>,
    vectors: Vec<T>,
}

impl<T: Scalar> HostBatch<T> {
    /// Every matrix element is `a` and every vector element is `b`.
    pub fn uniform(size: usize, num: usize, a: T, b: T) -> Result<Self, BatchError> {
        let (matrix_len, vector_len) = Self::lengths(size, num)?;
        Ok(Self {
            size,
            num,
            matrices: try_alloc(matrix_len, a)?,
            vectors: try_alloc(vector_len, b)?,
        })
    }

    /// Build elements from closures of `(instance, row, col)` and
    /// `(instance, row)`.
    pub fn from_fn(
        size: usize,
        num: usize,
        mut matrix: impl FnMut(usize, usize, usize) -> T,
        mut vector: impl FnMut(usize, usize) -> T,
    ) -> Result<Self, BatchError> {
        let mut batch = Self::uniform(size, num, T::zero(), T::zero())?;
        for i in 0..num {
            for col in 0..size {
                for row in 0..size {
                    batch.matrices[i * size * size + col * size + row] = matrix(i, row, col);
                }
            }
            for row in 0..size {
                batch.vectors[i * size + row] = vector(i, row);
            }
        }
        Ok(batch)
    }

    /// Wrap already packed buffers.
    pub fn from_parts(
        size: usize,
        num: usize,
        matrices: Vec<T>,
        vectors: Vec<T>,
    ) -> Result<Self, BatchError> {
        let (matrix_len, vector_len) = Self::lengths(size, num)?;
        if matrices.len() != matrix_len {
            return Err(BatchError::InvalidDimension(format!(
                "Expected {} matrix elements, got {}",
                matrix_len,
                matrices.len()
            )));
        }
        if vectors.len() != vector_len {
            return Err(BatchError::InvalidDimension(format!(
                "Expected {} vector elements, got {}",
                vector_len,
                vectors.len()
            )));
        }
        Ok(Self {
            size,
            num,
            matrices,
            vectors,
        })
    }

    fn lengths(size: usize, num: usize) -> Result<(usize, usize), BatchError> {
        if size == 0 || num == 0 {
            return Err(BatchError::InvalidDimension(format!(
                "size and num must be at least 1 (size={}, num={})",
                size, num
            )));
        }
        let vector_len = size.checked_mul(num);
        let matrix_len = vector_len.and_then(|v| v.checked_mul(size));
        match (matrix_len, vector_len) {
            (Some(m), Some(v)) => Ok((m, v)),
            _ => Err(BatchError::InvalidDimension(format!(
                "batch of {} matrices of size {} overflows",
                num, size
            ))),
        }
    }
}

impl<T> HostBatch<T> {
    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of problems.
    pub fn num(&self) -> usize {
        self.num
    }

    /// All matrices, packed.
    pub fn matrices(&self) -> &[T] {
        &self.matrices
    }

    /// All vectors, packed.
    pub fn vectors(&self) -> &[T] {
        &self.vectors
    }

    /// Matrix of problem `index` (column-major).
    pub fn matrix(&self, index: usize) -> Option<&[T]> {
        let len = self.size * self.size;
        (index < self.num).then(|| &self.matrices[index * len..(index + 1) * len])
    }

    /// Vector of problem `index`.
    pub fn vector(&self, index: usize) -> Option<&[T]> {
        (index < self.num).then(|| &self.vectors[index * self.size..(index + 1) * self.size])
    }
}
