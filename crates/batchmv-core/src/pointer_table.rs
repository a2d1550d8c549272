//! Per-instance device address tables for batched GEMM.
//!
//! Batched BLAS entry points take an array of operand addresses, one per
//! problem instance. Each entry is derived from the buffer's base address and
//! its pitched layout, and is checked against the allocation before the table
//! is ever handed to a device.

use crate::error::LayoutError;
use crate::layout::PitchedLayout;

/// A device address, in bytes.
pub type DeviceAddress = u64;

/// Validated table of per-instance operand addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerTable {
    layout: PitchedLayout,
    rows_per_instance: usize,
    entries: Vec<DeviceAddress>,
}

impl PointerTable {
    /// Build a table of `count` entries over a pitched buffer at `base`.
    ///
    /// Instance `i` starts at row `rows_per_instance * i`, so entry `i` is
    /// `base + pitch * rows_per_instance * i` elements. Every instance block
    /// must lie within the layout's rows.
    pub fn build(
        base: DeviceAddress,
        layout: &PitchedLayout,
        element_size: usize,
        rows_per_instance: usize,
        count: usize,
    ) -> Result<Self, LayoutError> {
        if rows_per_instance == 0 {
            return Err(LayoutError::ZeroDimension {
                what: "rows per instance",
            });
        }
        if count == 0 {
            return Err(LayoutError::ZeroDimension {
                what: "batch count",
            });
        }

        let stride_bytes = layout
            .pitch()
            .checked_mul(rows_per_instance)
            .and_then(|elems| elems.checked_mul(element_size))
            .ok_or(LayoutError::Overflow("instance stride"))?;

        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            let first_row = rows_per_instance
                .checked_mul(index)
                .ok_or(LayoutError::Overflow("instance row"))?;
            if !layout.block_fits(first_row, rows_per_instance) {
                return Err(LayoutError::OutOfBounds {
                    index,
                    first_row,
                    end_row: first_row.saturating_add(rows_per_instance),
                    height: layout.height(),
                });
            }
            let offset = (stride_bytes as u64)
                .checked_mul(index as u64)
                .and_then(|off| base.checked_add(off))
                .ok_or(LayoutError::Overflow("pointer table entry"))?;
            entries.push(offset);
        }

        Ok(Self {
            layout: *layout,
            rows_per_instance,
            entries,
        })
    }

    /// Number of entries (the batch count).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty. Built tables never are.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Address of instance `index`.
    pub fn get(&self, index: usize) -> Option<DeviceAddress> {
        self.entries.get(index).copied()
    }

    /// All entries in batch order.
    pub fn entries(&self) -> &[DeviceAddress] {
        &self.entries
    }

    /// Leading dimension of each instance: the buffer's pitch in elements.
    pub fn leading_dimension(&self) -> usize {
        self.layout.pitch()
    }

    /// Rows each instance occupies in the pitched buffer.
    pub fn rows_per_instance(&self) -> usize {
        self.rows_per_instance
    }

    /// Layout the table was built over.
    pub fn layout(&self) -> &PitchedLayout {
        &self.layout
    }

    /// Raw bytes of the table, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }

    /// Size of the uploaded table in bytes.
    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.entries.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_table_strides_by_size_rows() {
        // 3 matrices of 2x2 f32, pitch 128 bytes = 32 elements
        let layout = PitchedLayout::from_byte_pitch(2, 6, 128, 4).unwrap();
        let table = PointerTable::build(0x1000, &layout, 4, 2, 3).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.entries(), &[0x1000, 0x1000 + 256, 0x1000 + 512]);
        assert_eq!(table.leading_dimension(), 32);
        assert_eq!(table.byte_len(), 24);
    }

    #[test]
    fn test_vector_table_strides_by_one_row() {
        let layout = PitchedLayout::from_byte_pitch(4, 5, 512, 8).unwrap();
        let table = PointerTable::build(0x2000, &layout, 8, 1, 5).unwrap();

        for i in 0..5 {
            assert_eq!(table.get(i), Some(0x2000 + 512 * i as u64));
        }
        assert_eq!(table.get(5), None);
    }

    #[test]
    fn test_rejects_instances_past_extent() {
        let layout = PitchedLayout::new(2, 4, 2).unwrap();
        let err = PointerTable::build(0, &layout, 4, 2, 3).unwrap_err();
        assert_eq!(
            err,
            LayoutError::OutOfBounds {
                index: 2,
                first_row: 4,
                end_row: 6,
                height: 4,
            }
        );
    }

    #[test]
    fn test_rejects_empty_batch() {
        let layout = PitchedLayout::new(1, 1, 1).unwrap();
        assert!(PointerTable::build(0, &layout, 4, 1, 0).is_err());
        assert!(PointerTable::build(0, &layout, 4, 0, 1).is_err());
    }

    #[test]
    fn test_as_bytes_round_trips_entries() {
        let layout = PitchedLayout::new(1, 2, 1).unwrap();
        let table = PointerTable::build(0xdead_0000, &layout, 4, 1, 2).unwrap();
        let back: Vec<u64> = bytemuck::pod_collect_to_vec(table.as_bytes());
        assert_eq!(back, table.entries());
    }
}
