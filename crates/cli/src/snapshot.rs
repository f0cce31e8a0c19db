//! PNG output of read-back frames.

use std::path::Path;

use libcarna_core::FrameView;

use crate::error::CliError;

/// Writes a frame as an RGB PNG, top row first.
pub fn write_png(frame: &FrameView<'_>, path: &Path) -> Result<(), CliError> {
    let w = u32::try_from(frame.width()).map_err(|_| CliError::Input("frame too wide".into()))?;
    let h = u32::try_from(frame.height()).map_err(|_| CliError::Input("frame too tall".into()))?;
    let img = image::RgbImage::from_raw(w, h, frame.to_top_down())
        .ok_or_else(|| CliError::Io("RGB buffer size mismatch".into()))?;
    img.save(path).map_err(|e| CliError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_png_keeps_top_row_on_top() {
        // Bottom-up data: bottom row black, top row white.
        let mut data = vec![0u8; 4 * 2 * 3];
        data[4 * 3..].fill(255);
        let frame = FrameView::from_bottom_up(&data, 4, 2).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");

        write_png(&frame, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(3, 1).0, [0, 0, 0]);
    }

    #[test]
    fn write_png_to_missing_directory_is_io_error() {
        let data = vec![0u8; 3];
        let frame = FrameView::from_bottom_up(&data, 1, 1).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.png");

        let err = write_png(&frame, &path).unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }
}
