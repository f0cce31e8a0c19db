//! Vertically flipped view over a captured frame.
//!
//! GL reads pixels bottom row first. [`FrameView`] exposes the same buffer
//! top row first without copying, by walking rows with a negative stride.

use crate::error::BindingError;

/// Bytes per pixel of a captured frame (RGB, 8 bits per channel).
pub const CHANNELS: usize = 3;

/// Read-only RGB8 frame whose row 0 is the last row of the underlying buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> FrameView<'a> {
    /// Wraps a bottom-up RGB8 buffer of exactly `width * height * 3` bytes.
    pub fn from_bottom_up(data: &'a [u8], width: usize, height: usize) -> Result<Self, BindingError> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(CHANNELS));
        if width == 0 || height == 0 || expected != Some(data.len()) {
            return Err(BindingError::InvalidDimensions {
                width: u32::try_from(width).unwrap_or(u32::MAX),
                height: u32::try_from(height).unwrap_or(u32::MAX),
            });
        }
        Ok(Self { data, width, height })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Shape as `(height, width, channels)`.
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, CHANNELS]
    }

    /// Byte strides of the `(row, column, channel)` axes. The row stride is
    /// negative.
    pub fn strides(&self) -> [isize; 3] {
        [-((self.width * CHANNELS) as isize), CHANNELS as isize, 1]
    }

    /// Byte offset of the first element (row 0, column 0) in the buffer.
    pub fn offset(&self) -> usize {
        (self.height - 1) * self.row_len()
    }

    fn row_len(&self) -> usize {
        self.width * CHANNELS
    }

    /// The underlying buffer, bottom row first.
    pub fn as_bottom_up(&self) -> &'a [u8] {
        self.data
    }

    /// Row `y`, counted from the top. Panics if `y >= height`.
    pub fn row(&self, y: usize) -> &'a [u8] {
        assert!(y < self.height, "row {y} out of range (height {})", self.height);
        let start = (self.height - 1 - y) * self.row_len();
        &self.data[start..start + self.row_len()]
    }

    /// Pixel at column `x` of row `y` (from the top).
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let row = self.row(y);
        let i = x * CHANNELS;
        [row[i], row[i + 1], row[i + 2]]
    }

    /// Rows from top to bottom.
    pub fn rows(&self) -> impl DoubleEndedIterator<Item = &'a [u8]> + ExactSizeIterator + 'a {
        self.data.chunks_exact(self.width * CHANNELS).rev()
    }

    /// Copies the frame into a top-down buffer.
    pub fn to_top_down(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len());
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 2x2 frame, bottom row red/green, top row blue/white.
    fn sample() -> Vec<u8> {
        vec![
            255, 0, 0, 0, 255, 0, //
            0, 0, 255, 255, 255, 255,
        ]
    }

    #[test]
    fn row_zero_is_last_captured_row() {
        let data = sample();
        let frame = FrameView::from_bottom_up(&data, 2, 2).unwrap();
        assert_eq!(frame.pixel(0, 0), [0, 0, 255]);
        assert_eq!(frame.pixel(1, 1), [0, 255, 0]);
    }

    #[test]
    fn strides_walk_rows_backwards() {
        let data = sample();
        let frame = FrameView::from_bottom_up(&data, 2, 2).unwrap();
        assert_eq!(frame.strides(), [-6, 3, 1]);
        assert_eq!(frame.offset(), 6);
        assert_eq!(frame.shape(), [2, 2, 3]);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let data = vec![0_u8; 11];
        assert!(matches!(
            FrameView::from_bottom_up(&data, 2, 2),
            Err(BindingError::InvalidDimensions { width: 2, height: 2 })
        ));
        assert!(FrameView::from_bottom_up(&[], 0, 4).is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn row_past_height_panics() {
        let data = sample();
        let frame = FrameView::from_bottom_up(&data, 2, 2).unwrap();
        let _ = frame.row(2);
    }

    proptest! {
        #[test]
        fn strided_access_matches_row_flip(width in 1_usize..16, height in 1_usize..16, seed: u8) {
            let data: Vec<u8> = (0..width * height * CHANNELS)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let frame = FrameView::from_bottom_up(&data, width, height).unwrap();
            let [row_stride, col_stride, _] = frame.strides();

            for y in 0..height {
                for x in 0..width {
                    let at = frame.offset() as isize + y as isize * row_stride + x as isize * col_stride;
                    let at = at as usize;
                    prop_assert_eq!(frame.pixel(x, y), [data[at], data[at + 1], data[at + 2]]);
                }
            }
        }

        #[test]
        fn top_down_copy_reverses_rows(width in 1_usize..16, height in 1_usize..16) {
            let data: Vec<u8> = (0..width * height * CHANNELS).map(|i| i as u8).collect();
            let frame = FrameView::from_bottom_up(&data, width, height).unwrap();
            let top_down = frame.to_top_down();
            prop_assert_eq!(top_down.len(), data.len());

            let flipped_back = FrameView::from_bottom_up(&top_down, width, height).unwrap().to_top_down();
            prop_assert_eq!(flipped_back, data);
        }
    }
}
