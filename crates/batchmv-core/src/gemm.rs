//! Arguments of a batched GEMM call.
//!
//! Mirrors the shape of the BLAS `?gemmBatched` entry point: every instance
//! computes `C = alpha * op(A) * op(B) + beta * C` with column-major operands,
//! and the operands are reached through device-resident pointer arrays.

use crate::error::LayoutError;
use crate::pointer_table::{DeviceAddress, PointerTable};
use crate::scalar::Precision;

/// Operand transposition flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transpose {
    /// Use the operand as stored.
    #[default]
    No,
    /// Use the transpose of the operand.
    Yes,
}

/// A complete batched GEMM request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedGemm {
    pub precision: Precision,
    pub transa: Transpose,
    pub transb: Transpose,
    /// Rows of `op(A)` and `C`.
    pub m: usize,
    /// Columns of `op(B)` and `C`.
    pub n: usize,
    /// Columns of `op(A)`, rows of `op(B)`.
    pub k: usize,
    pub alpha: f64,
    pub beta: f64,
    /// Device address of the array of `A` pointers.
    pub a_array: DeviceAddress,
    pub lda: usize,
    /// Device address of the array of `B` pointers.
    pub b_array: DeviceAddress,
    pub ldb: usize,
    /// Device address of the array of `C` pointers.
    pub c_array: DeviceAddress,
    pub ldc: usize,
    pub batch_count: usize,
}

/// Device-resident pointer arrays together with the host tables they mirror.
#[derive(Debug, Clone, Copy)]
pub struct OperandTables<'a> {
    pub host: &'a PointerTable,
    pub device: DeviceAddress,
}

impl BatchedGemm {
    /// Pure matrix-vector products: `C_i = A_i * B_i` for `size x size`
    /// matrices and length-`size` vectors.
    pub fn matvec(
        precision: Precision,
        size: usize,
        a: OperandTables<'_>,
        b: OperandTables<'_>,
        c: OperandTables<'_>,
    ) -> Self {
        Self {
            precision,
            transa: Transpose::No,
            transb: Transpose::No,
            m: size,
            n: 1,
            k: size,
            alpha: 1.0,
            beta: 0.0,
            a_array: a.device,
            lda: a.host.leading_dimension(),
            b_array: b.device,
            ldb: b.host.leading_dimension(),
            c_array: c.device,
            ldc: c.host.leading_dimension(),
            batch_count: a.host.len(),
        }
    }

    /// Stored `(rows, cols)` of each `A` instance.
    pub fn a_shape(&self) -> (usize, usize) {
        match self.transa {
            Transpose::No => (self.m, self.k),
            Transpose::Yes => (self.k, self.m),
        }
    }

    /// Stored `(rows, cols)` of each `B` instance.
    pub fn b_shape(&self) -> (usize, usize) {
        match self.transb {
            Transpose::No => (self.k, self.n),
            Transpose::Yes => (self.n, self.k),
        }
    }

    /// Whether the call has nothing to compute.
    pub fn is_empty(&self) -> bool {
        self.m == 0 || self.n == 0 || self.batch_count == 0
    }

    /// Check leading dimensions the way BLAS does.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let (a_rows, _) = self.a_shape();
        let (b_rows, _) = self.b_shape();
        for (operand, ld, rows) in [
            ('A', self.lda, a_rows),
            ('B', self.ldb, b_rows),
            ('C', self.ldc, self.m),
        ] {
            let min = rows.max(1);
            if ld < min {
                return Err(LayoutError::LeadingDimension { operand, ld, min });
            }
        }
        Ok(())
    }
}

/// Number of elements a column-major `rows x cols` operand touches.
pub fn operand_extent(rows: usize, cols: usize, ld: usize) -> Option<usize> {
    if rows == 0 || cols == 0 {
        return Some(0);
    }
    ld.checked_mul(cols - 1)?.checked_add(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PitchedLayout;

    fn tables(size: usize, num: usize) -> (PointerTable, PointerTable, PointerTable) {
        let a = PitchedLayout::new(size, size * num, 64).unwrap();
        let v = PitchedLayout::new(size, num, 64).unwrap();
        (
            PointerTable::build(0x1000, &a, 4, size, num).unwrap(),
            PointerTable::build(0x9000, &v, 4, 1, num).unwrap(),
            PointerTable::build(0xa000, &v, 4, 1, num).unwrap(),
        )
    }

    #[test]
    fn test_matvec_parameters() {
        let (a, b, c) = tables(3, 4);
        let gemm = BatchedGemm::matvec(
            Precision::Single,
            3,
            OperandTables {
                host: &a,
                device: 0x100,
            },
            OperandTables {
                host: &b,
                device: 0x200,
            },
            OperandTables {
                host: &c,
                device: 0x300,
            },
        );

        assert_eq!((gemm.m, gemm.n, gemm.k), (3, 1, 3));
        assert_eq!(gemm.transa, Transpose::No);
        assert_eq!(gemm.transb, Transpose::No);
        assert_eq!(gemm.alpha, 1.0);
        assert_eq!(gemm.beta, 0.0);
        assert_eq!((gemm.lda, gemm.ldb, gemm.ldc), (64, 64, 64));
        assert_eq!(gemm.batch_count, 4);
        assert_eq!(gemm.a_array, 0x100);
        assert!(gemm.validate().is_ok());
    }

    #[test]
    fn test_validate_leading_dimensions() {
        let (a, b, c) = tables(2, 1);
        let mut gemm = BatchedGemm::matvec(
            Precision::Double,
            2,
            OperandTables {
                host: &a,
                device: 0,
            },
            OperandTables {
                host: &b,
                device: 0,
            },
            OperandTables {
                host: &c,
                device: 0,
            },
        );
        gemm.ldc = 1;
        assert_eq!(
            gemm.validate(),
            Err(LayoutError::LeadingDimension {
                operand: 'C',
                ld: 1,
                min: 2
            })
        );

        gemm.ldc = 2;
        gemm.transa = Transpose::Yes;
        gemm.m = 5;
        gemm.ldc = 5;
        gemm.lda = 1;
        assert!(matches!(
            gemm.validate(),
            Err(LayoutError::LeadingDimension { operand: 'A', .. })
        ));
    }

    #[test]
    fn test_operand_extent() {
        assert_eq!(operand_extent(3, 1, 64), Some(3));
        assert_eq!(operand_extent(3, 3, 64), Some(131));
        assert_eq!(operand_extent(0, 3, 64), Some(0));
        assert_eq!(operand_extent(2, usize::MAX, 2), None);
    }
}
