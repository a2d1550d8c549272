//! Typed descriptors for pitched 2-D allocations.
//!
//! A pitched allocation stores `height` rows of `width` elements each, with
//! consecutive rows `pitch` elements apart. Devices pick the pitch so that
//! every row starts on an aligned address, which means `pitch >= width` and
//! the tail of each row is padding.

use crate::error::LayoutError;

/// Shape of a pitched allocation, measured in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchedLayout {
    width: usize,
    height: usize,
    pitch: usize,
}

impl PitchedLayout {
    /// Create a layout from an element pitch.
    pub fn new(width: usize, height: usize, pitch: usize) -> Result<Self, LayoutError> {
        if width == 0 {
            return Err(LayoutError::ZeroDimension { what: "row width" });
        }
        if height == 0 {
            return Err(LayoutError::ZeroDimension { what: "row count" });
        }
        if pitch < width {
            return Err(LayoutError::PitchTooSmall { pitch, width });
        }
        pitch
            .checked_mul(height)
            .ok_or(LayoutError::Overflow("allocation extent"))?;

        Ok(Self {
            width,
            height,
            pitch,
        })
    }

    /// Create a layout from the byte pitch reported by a device.
    pub fn from_byte_pitch(
        width: usize,
        height: usize,
        pitch_bytes: usize,
        element_size: usize,
    ) -> Result<Self, LayoutError> {
        if element_size == 0 {
            return Err(LayoutError::ZeroDimension {
                what: "element size",
            });
        }
        if pitch_bytes % element_size != 0 {
            return Err(LayoutError::MisalignedPitch {
                pitch_bytes,
                element_size,
            });
        }
        Self::new(width, height, pitch_bytes / element_size)
    }

    /// Layout of densely packed rows (no padding).
    pub fn packed(width: usize, height: usize) -> Result<Self, LayoutError> {
        Self::new(width, height, width)
    }

    /// Logical row width in elements.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Distance between row starts in elements.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Total number of elements the allocation spans, padding included.
    pub fn extent(&self) -> usize {
        self.pitch * self.height
    }

    /// Whether rows carry padding.
    pub fn is_padded(&self) -> bool {
        self.pitch > self.width
    }

    /// Element offset of the first element of `row`.
    pub fn row_offset(&self, row: usize) -> Option<usize> {
        (row < self.height).then(|| row * self.pitch)
    }

    /// Check that rows `first_row..first_row + rows` exist.
    pub fn block_fits(&self, first_row: usize, rows: usize) -> bool {
        rows > 0
            && first_row
                .checked_add(rows)
                .is_some_and(|end| end <= self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_layout() {
        let layout = PitchedLayout::from_byte_pitch(3, 4, 512, 4).unwrap();
        assert_eq!(layout.width(), 3);
        assert_eq!(layout.pitch(), 128);
        assert_eq!(layout.extent(), 512);
        assert!(layout.is_padded());
        assert_eq!(layout.row_offset(2), Some(256));
        assert_eq!(layout.row_offset(4), None);
    }

    #[test]
    fn test_packed_layout() {
        let layout = PitchedLayout::packed(5, 2).unwrap();
        assert_eq!(layout.pitch(), 5);
        assert!(!layout.is_padded());
        assert_eq!(layout.extent(), 10);
    }

    #[test]
    fn test_rejects_bad_layouts() {
        assert_eq!(
            PitchedLayout::new(4, 2, 3),
            Err(LayoutError::PitchTooSmall { pitch: 3, width: 4 })
        );
        assert_eq!(
            PitchedLayout::new(0, 2, 3),
            Err(LayoutError::ZeroDimension { what: "row width" })
        );
        assert!(matches!(
            PitchedLayout::from_byte_pitch(1, 1, 10, 4),
            Err(LayoutError::MisalignedPitch { .. })
        ));
        assert!(matches!(
            PitchedLayout::new(1, usize::MAX, 2),
            Err(LayoutError::Overflow(_))
        ));
    }

    #[test]
    fn test_block_fits() {
        let layout = PitchedLayout::new(2, 6, 4).unwrap();
        assert!(layout.block_fits(0, 6));
        assert!(layout.block_fits(4, 2));
        assert!(!layout.block_fits(5, 2));
        assert!(!layout.block_fits(0, 0));
        assert!(!layout.block_fits(usize::MAX, 1));
    }
}
