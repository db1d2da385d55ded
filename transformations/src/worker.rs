use crate::codec::PixelBuffer;
use crate::error::{Result, TransformationError};
use crate::model::TransformedImage;
use crate::transform::Transform;

/// Applies a named transform to encoded image bytes.
///
/// Holds no state between calls, so one instance can be shared across
/// threads and used for independent requests concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformWorker;

impl TransformWorker {
    pub fn new() -> Self {
        Self
    }

    /// Decodes `image_bytes`, runs `transform_name` over every pixel and
    /// re-encodes in the input's container format.
    pub fn apply(
        &self,
        transform_name: &str,
        file_name: &str,
        image_bytes: &[u8],
    ) -> Result<TransformedImage> {
        let transform: Transform = transform_name.parse()?;
        if image_bytes.is_empty() {
            return Err(TransformationError::InvalidInput(format!("{} is empty", file_name)));
        }
        let (mut buffer, format) = PixelBuffer::decode(image_bytes)?;

        let has_alpha = buffer.has_alpha();
        let mut pixels = buffer.pixels().to_vec();
        transform.apply(&mut pixels, has_alpha);
        buffer.set_pixels(pixels)?;

        let encoded = buffer.encode(format)?;

        log::info!(
            "Applied {} to {} ({}x{}, {} bytes out)",
            transform,
            file_name,
            buffer.width(),
            buffer.height(),
            encoded.len()
        );

        Ok(TransformedImage::new(file_name, transform_name, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn test_png() -> Vec<u8> {
        let pixels = vec![0xFF_C8_64_32, 0x80_10_20_30, 0xFF_00_00_00, 0x40_FF_80_00];
        PixelBuffer::new(2, 2, true, pixels)
            .unwrap()
            .encode(ImageFormat::Png)
            .unwrap()
    }

    #[test]
    fn test_unsupported_transform() {
        let result = TransformWorker::new().apply("bogus", "a.png", &test_png());
        match result {
            Err(TransformationError::UnsupportedTransform(name)) => assert_eq!(name, "bogus"),
            other => panic!("Expected UnsupportedTransform, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_checked_before_decode() {
        let result = TransformWorker::new().apply("bogus", "a.png", b"junk");
        assert!(matches!(result, Err(TransformationError::UnsupportedTransform(_))));
    }

    #[test]
    fn test_empty_image_is_invalid_input() {
        let result = TransformWorker::new().apply("sepia", "empty.png", &[]);
        match result {
            Err(e @ TransformationError::InvalidInput(_)) => {
                assert_eq!(e.kind(), "invalid_request")
            }
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error() {
        let result = TransformWorker::new().apply("sepia", "a.png", b"junk");
        assert!(matches!(result, Err(TransformationError::Decode(_))));
    }

    #[test]
    fn test_result_carries_names() {
        let result = TransformWorker::new()
            .apply("Grayscale", "cat.png", &test_png())
            .unwrap();
        assert_eq!(result.image_name, "cat.png");
        assert_eq!(result.transform_name, "Grayscale");
    }

    #[test]
    fn test_grayscale_output_matches_engine() {
        let input = test_png();
        let result = TransformWorker::new().apply("grayscale", "a.png", &input).unwrap();

        let (original, _) = PixelBuffer::decode(&input).unwrap();
        let mut expected = original.pixels().to_vec();
        crate::pixels::grayscale(&mut expected, true);

        let (decoded, format) = PixelBuffer::decode(&result.image_bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(decoded.width(), 2);
        assert_eq!(decoded.height(), 2);
        assert_eq!(decoded.pixels(), expected.as_slice());
    }
}
