//! Frame layout conversion, detection downscaling and photo decoding.

use image::imageops::FilterType;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("frame buffer too short: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame has zero size")]
    Empty,
    #[error("photo decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Byte order of the three colour channels in a packed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    /// Blue-green-red, the layout most capture libraries hand out.
    Bgr,
}

/// A packed 8-bit, 3-channel video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

impl Frame {
    pub fn rgb(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height, order: ChannelOrder::Rgb }
    }

    pub fn bgr(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height, order: ChannelOrder::Bgr }
    }

    /// Copy into an RGB image, swapping channels when the frame is BGR.
    ///
    /// The detector and recognizer consume RGB.
    pub fn to_rgb_image(&self) -> Result<RgbImage, ImagingError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImagingError::Empty);
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() < expected {
            return Err(ImagingError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }

        let mut buf = self.data[..expected].to_vec();
        if self.order == ChannelOrder::Bgr {
            for px in buf.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        RgbImage::from_raw(self.width, self.height, buf).ok_or(ImagingError::InvalidLength {
            expected,
            actual: self.data.len(),
        })
    }
}

/// Output size for a linear downscale: each side rounded, never below one pixel.
pub fn scaled_size(width: u32, height: u32, factor: f32) -> (u32, u32) {
    let side = |v: u32| ((v as f32 * factor).round() as u32).max(1);
    (side(width), side(height))
}

/// Resize by a linear factor with bilinear filtering.
pub fn downscale(image: &RgbImage, factor: f32) -> RgbImage {
    if (factor - 1.0).abs() < f32::EPSILON {
        return image.clone();
    }
    let (w, h) = scaled_size(image.width(), image.height(), factor);
    image::imageops::resize(image, w, h, FilterType::Triangle)
}

/// Decode an encoded photograph (JPEG, PNG, ...) into RGB.
pub fn decode_photo(bytes: &[u8]) -> Result<RgbImage, ImagingError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_frame_swaps_channels() {
        let frame = Frame::bgr(vec![10, 20, 30, 40, 50, 60], 2, 1);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [30, 20, 10]);
        assert_eq!(img.get_pixel(1, 0).0, [60, 50, 40]);
    }

    #[test]
    fn test_rgb_frame_passes_through() {
        let frame = Frame::rgb(vec![10, 20, 30], 1, 1);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_short_frame_rejected() {
        let frame = Frame::rgb(vec![0; 5], 2, 1);
        assert!(matches!(
            frame.to_rgb_image(),
            Err(ImagingError::InvalidLength { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        let frame = Frame::rgb(Vec::new(), 0, 0);
        assert!(matches!(frame.to_rgb_image(), Err(ImagingError::Empty)));
    }

    #[test]
    fn test_scaled_size_quarter() {
        assert_eq!(scaled_size(640, 480, 0.25), (160, 120));
        assert_eq!(scaled_size(642, 481, 0.25), (161, 120));
        assert_eq!(scaled_size(2, 2, 0.25), (1, 1));
    }

    #[test]
    fn test_downscale_uniform_stays_uniform() {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([90, 120, 200]));
        let small = downscale(&img, 0.25);
        assert_eq!(small.dimensions(), (16, 12));
        assert!(small.pixels().all(|p| p.0 == [90, 120, 200]));
    }

    #[test]
    fn test_decode_photo_png() {
        let img = RgbImage::from_pixel(4, 3, image::Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_photo(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(3, 2).0, [1, 2, 3]);
    }

    #[test]
    fn test_decode_photo_garbage() {
        assert!(matches!(decode_photo(b"not an image"), Err(ImagingError::Decode(_))));
    }
}
