//! Host reference products using nalgebra.

use batchmv_core::{HostBatch, Scalar};
use nalgebra::{DMatrix, DVector};

/// Compute every `A_i * B_i` on the host, problem-major.
pub fn reference_products<T: Scalar>(batch: &HostBatch<T>) -> Vec<T> {
    let n = batch.size();
    let mut out = Vec::with_capacity(n * batch.num());

    for i in 0..batch.num() {
        let (Some(a), Some(b)) = (batch.matrix(i), batch.vector(i)) else {
            break;
        };
        // Column-major on both sides.
        let matrix = DMatrix::from_column_slice(n, n, a);
        let vector = DVector::from_column_slice(b);
        out.extend((matrix * vector).iter().copied());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_uniform() {
        let batch = HostBatch::uniform(4, 3, 1.5f64, 2.0).unwrap();
        let products = reference_products(&batch);
        assert_eq!(products, vec![12.0; 12]);
    }

    #[test]
    fn test_reference_column_major() {
        // A = [[1, 2], [3, 4]] stored column-major, b = [1, 0]
        let batch =
            HostBatch::from_parts(2, 1, vec![1.0f32, 3.0, 2.0, 4.0], vec![1.0, 0.0]).unwrap();
        assert_eq!(reference_products(&batch), vec![1.0, 3.0]);
    }
}
