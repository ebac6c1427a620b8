use std::io::Cursor;
use image::{DynamicImage, ImageOutputFormat};
use crate::common::Result;

const JPEG_QUALITY: u8 = 80;

/// Downscales a frame to fit `size`x`size` and encodes it as JPEG.
pub fn encode_thumbnail(frame: &DynamicImage, size: u32) -> Result<Vec<u8>> {
    // JPEG has no alpha; grayscale IR frames widen to RGB as well
    let thumb = DynamicImage::ImageRgb8(frame.thumbnail(size, size).to_rgb8());

    let mut bytes = Vec::new();
    thumb.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    Ok(bytes)
}
