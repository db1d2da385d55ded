use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::{Result, TransformationError};
use crate::pixels::{pack, unpack};

/// A decoded image as packed `0xAARRGGBB` pixels in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    has_alpha: bool,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, has_alpha: bool, pixels: Vec<u32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(TransformationError::BufferError(format!(
                "Pixel count {} does not match {}x{} ({} expected)",
                pixels.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self {
            width,
            height,
            has_alpha,
            pixels,
        })
    }

    /// Decodes container bytes, returning the buffer and the detected format.
    pub fn decode(bytes: &[u8]) -> Result<(Self, ImageFormat)> {
        if bytes.is_empty() {
            return Err(TransformationError::Decode("Empty image payload".to_string()));
        }

        let format = image::guess_format(bytes)
            .map_err(|e| TransformationError::Decode(format!("Unrecognized image format: {}", e)))?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| TransformationError::Decode(e.to_string()))?;

        let has_alpha = image.color().has_alpha();
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                pack(a, r, g, b)
            })
            .collect();

        log::debug!(
            "Decoded {:?} image ({}x{}, alpha: {})",
            format,
            width,
            height,
            has_alpha
        );

        Ok((Self::new(width, height, has_alpha, pixels)?, format))
    }

    /// Encodes the buffer into `format`, falling back to PNG for formats
    /// without an encoder.
    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let format = output_format(format);

        let raw: Vec<u8> = self
            .pixels
            .iter()
            .flat_map(|&p| {
                let (a, r, g, b) = unpack(p);
                [r, g, b, a]
            })
            .collect();
        let rgba = RgbaImage::from_raw(self.width, self.height, raw).ok_or_else(|| {
            TransformationError::BufferError("Pixel data does not fit image bounds".to_string())
        })?;

        let image = if self.has_alpha && format != ImageFormat::Jpeg {
            DynamicImage::ImageRgba8(rgba)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
        };

        let mut output = Cursor::new(Vec::new());
        image
            .write_to(&mut output, format)
            .map_err(|e| TransformationError::Encode(e.to_string()))?;
        Ok(output.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Replaces the whole pixel array; the length must stay width × height.
    pub fn set_pixels(&mut self, pixels: Vec<u32>) -> Result<()> {
        if pixels.len() != self.pixels.len() {
            return Err(TransformationError::BufferError(format!(
                "Cannot write {} pixels into a {}x{} buffer",
                pixels.len(),
                self.width,
                self.height
            )));
        }
        self.pixels = pixels;
        Ok(())
    }
}

fn output_format(format: ImageFormat) -> ImageFormat {
    match format {
        ImageFormat::Png
        | ImageFormat::Jpeg
        | ImageFormat::Gif
        | ImageFormat::Bmp
        | ImageFormat::Tiff => format,
        _ => ImageFormat::Png,
    }
}
