use crate::error::DetectError;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// What `detect` accepts: encoded bytes or an already-decoded image
#[derive(Debug, Clone)]
pub enum ImageInput {
    Bytes(Vec<u8>),
    Decoded(DynamicImage),
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Bytes(bytes)
    }
}

impl From<&[u8]> for ImageInput {
    fn from(bytes: &[u8]) -> Self {
        ImageInput::Bytes(bytes.to_vec())
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        ImageInput::Decoded(image)
    }
}

/// Decode the input and bring it up to the minimum working height
pub fn load(input: ImageInput, min_height: u32) -> Result<DynamicImage, DetectError> {
    let img = match input {
        ImageInput::Bytes(bytes) => image::load_from_memory(&bytes)?,
        ImageInput::Decoded(img) => img,
    };

    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(DetectError::EmptyImage { width, height });
    }

    Ok(upscale_to_height(img, min_height))
}

/// Uniformly upscale images shorter than `min_height`; taller images pass through
pub fn upscale_to_height(img: DynamicImage, min_height: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if height >= min_height {
        return img;
    }

    let scale = min_height as f32 / height as f32;
    let scaled_w = ((width as f32 * scale).round() as u32).max(1);
    debug!(width, height, scaled_w, min_height, "upscaling input");

    img.resize_exact(scaled_w, min_height, FilterType::CatmullRom)
}
