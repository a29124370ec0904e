use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use ndarray::Array4;

use super::error::PipelineError;
use crate::config::{ConfigError, ImageConfig};

/// Classifier input: NHWC, batch of one, values scaled into [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }
}

/// Decodes upload bytes into the fixed-shape tensor the classifier expects.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    width: u32,
    height: u32,
    scale: f32,
    filter: FilterType,
    accepted: Vec<ImageFormat>,
}

impl ImageNormalizer {
    pub fn from_config(config: &ImageConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            width: config.width,
            height: config.height,
            scale: config.scale,
            filter: config.filter()?,
            accepted: config.formats()?,
        })
    }

    pub fn normalize(&self, bytes: &[u8]) -> Result<ImageTensor, PipelineError> {
        let format = image::guess_format(bytes)
            .map_err(|_| PipelineError::Decode("data is not a recognized image".to_string()))?;
        self.check_format(format)?;
        let img = image::load_from_memory_with_format(bytes, format).map_err(map_image_error)?;
        self.to_tensor(&img)
    }

    /// Same as [`normalize`](Self::normalize) for an upload staged on disk.
    pub fn normalize_file(&self, path: &Path) -> Result<ImageTensor, PipelineError> {
        // Format comes from the content only; the extension is client-chosen.
        let reader = ImageReader::new(BufReader::new(File::open(path)?)).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| PipelineError::Decode("data is not a recognized image".to_string()))?;
        self.check_format(format)?;
        let img = reader.decode().map_err(map_image_error)?;
        self.to_tensor(&img)
    }

    fn check_format(&self, format: ImageFormat) -> Result<(), PipelineError> {
        if !self.accepted.contains(&format) || !format.reading_enabled() {
            return Err(PipelineError::UnsupportedFormat(format!("{:?}", format)));
        }
        Ok(())
    }

    fn to_tensor(&self, img: &DynamicImage) -> Result<ImageTensor, PipelineError> {
        let rgb = img
            .resize_exact(self.width, self.height, self.filter)
            .to_rgb8();
        let values: Vec<f32> = rgb
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) * self.scale)
            .collect();
        let shape = (1, self.height as usize, self.width as usize, 3);
        let data = Array4::from_shape_vec(shape, values)
            .map_err(|e| PipelineError::Decode(e.to_string()))?;
        Ok(ImageTensor { data })
    }
}

fn map_image_error(err: ImageError) -> PipelineError {
    match err {
        ImageError::Unsupported(e) => PipelineError::UnsupportedFormat(e.to_string()),
        other => PipelineError::Decode(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(color));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    fn normalizer() -> ImageNormalizer {
        ImageNormalizer::from_config(&ImageConfig::default()).unwrap()
    }

    #[test]
    fn resizes_to_fixed_nhwc_shape() {
        let tensor = normalizer().normalize(&solid_png(640, 480, [10, 20, 30])).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
    }

    #[test]
    fn scales_channels_into_unit_range() {
        let tensor = normalizer().normalize(&solid_png(32, 32, [255, 0, 51])).unwrap();
        let data = tensor.as_array();
        assert!((data[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(data[[0, 100, 100, 1]], 0.0);
        assert!((data[[0, 223, 223, 2]] - 0.2).abs() < 1e-6);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let img: GrayImage = ImageBuffer::from_pixel(50, 50, Luma([128]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);
        let tensor = normalizer().normalize(&bytes).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        let px = tensor.as_array();
        assert_eq!(px[[0, 5, 5, 0]], px[[0, 5, 5, 1]]);
        assert_eq!(px[[0, 5, 5, 1]], px[[0, 5, 5, 2]]);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let img: RgbaImage = ImageBuffer::from_pixel(300, 200, Rgba([0, 255, 0, 10]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);
        let tensor = normalizer().normalize(&bytes).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!((tensor.as_array()[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn accepts_jpeg() {
        let img: RgbImage = ImageBuffer::from_pixel(64, 64, Rgb([200, 100, 50]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        assert!(normalizer().normalize(&bytes).is_ok());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = normalizer().normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = solid_png(64, 64, [1, 2, 3]);
        let err = normalizer().normalize(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn recognized_but_unaccepted_format_is_unsupported() {
        let img: RgbImage = ImageBuffer::from_pixel(16, 16, Rgb([9, 9, 9]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Tiff);
        let err = normalizer().normalize(&bytes).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn staged_file_decodes_like_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.png");
        let bytes = solid_png(40, 30, [12, 34, 56]);
        std::fs::write(&path, &bytes).unwrap();
        let from_file = normalizer().normalize_file(&path).unwrap();
        let from_bytes = normalizer().normalize(&bytes).unwrap();
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn staged_garbage_ignores_misleading_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["notes.tiff", "notes.png", "notes.txt"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"plain text body").unwrap();
            let err = normalizer().normalize_file(&path).unwrap_err();
            assert!(matches!(err, PipelineError::Decode(_)), "{}: {:?}", name, err);
        }
    }
}
