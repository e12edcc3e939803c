//! Upload validation.

use image::ImageFormat;
use std::path::Path;
use thiserror::Error;

/// File extensions accepted for gallery and probe images.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputError {
    #[error("empty upload")]
    Empty,
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid file type, allowed: png, jpg, jpeg, bmp")]
    UnsupportedType,
    #[error("not a recognizable image")]
    Malformed,
}

/// Lowercased extension of `filename` if it is an accepted image type.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Sniff the image container and check it is one we accept.
pub fn validate_image(bytes: &[u8], max_size: usize) -> Result<ImageFormat, InputError> {
    if bytes.is_empty() {
        return Err(InputError::Empty);
    }
    if bytes.len() > max_size {
        return Err(InputError::TooLarge {
            size: bytes.len(),
            limit: max_size,
        });
    }
    match image::guess_format(bytes) {
        Ok(fmt @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp)) => Ok(fmt),
        Ok(_) => Err(InputError::UnsupportedType),
        Err(_) => Err(InputError::Malformed),
    }
}
