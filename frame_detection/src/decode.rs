use crate::model_service::PixelGrid;
use std::io::Cursor;

/// Decodes an uploaded frame into a 3-channel grid. Every failure mode
/// (empty buffer, truncated data, unknown container) collapses to `None`.
pub fn decode_frame(bytes: &[u8]) -> Option<PixelGrid> {
    let image_reader = match image::ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!("Could not guess frame format: {}", e);
            return None;
        }
    };

    match image_reader.decode() {
        Ok(image) if image.width() > 0 && image.height() > 0 => Some(image.to_rgb8()),
        Ok(_) => {
            tracing::debug!("Decoded frame has no pixels");
            None
        }
        Err(e) => {
            tracing::debug!("Error decoding frame: {}", e);
            None
        }
    }
}
