//! Image preprocessing: raw encoded bytes → fixed-shape NHWC `f32` tensor.
//!
//! Decoding guesses the format from content. Every image is converted to RGB,
//! resized (not cropped) to the classifier's input size with a deterministic
//! filter, normalized per the classifier family, and given a batch dimension
//! of 1. The same pixel content always produces a bit-identical tensor.

use std::io::Cursor;
use std::str::FromStr;

use image::error::UnsupportedErrorKind;
use image::imageops::{self, FilterType};
use image::{ImageError, ImageReader, RgbImage};

use crate::error::PreprocessError;

/// Inputs above this size are rejected before decoding.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Per-channel pixel transform expected by a classifier family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Pixel values left in `[0, 255]`. Keras EfficientNet rescales inside the graph.
    Raw,
    /// `v / 255`, into `[0, 1]`.
    UnitScale,
    /// `v / 127.5 - 1`, into `[-1, 1]` (MobileNet, Inception).
    Symmetric,
    /// `(v / 255 - mean) / std` per channel (torchvision).
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    pub const IMAGENET: Self = Self::MeanStd {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    #[inline]
    fn apply(&self, channel: usize, v: u8) -> f32 {
        let v = f32::from(v);
        match self {
            Self::Raw => v,
            Self::UnitScale => v / 255.0,
            Self::Symmetric => v / 127.5 - 1.0,
            Self::MeanStd { mean, std } => (v / 255.0 - mean[channel]) / std[channel],
        }
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "efficientnet" => Ok(Self::Raw),
            "unit" => Ok(Self::UnitScale),
            "symmetric" | "mobilenet" => Ok(Self::Symmetric),
            "imagenet" => Ok(Self::IMAGENET),
            other => Err(format!(
                "unknown normalization {other:?} (expected raw, unit, symmetric, or imagenet)"
            )),
        }
    }
}

/// Target geometry and normalization for one classifier.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    pub normalization: Normalization,
    pub filter: FilterType,
    pub max_bytes: usize,
}

impl Default for PreprocessConfig {
    /// EfficientNetB1 geometry: 240×240, raw pixel values, bicubic resampling.
    fn default() -> Self {
        Self {
            width: 240,
            height: 240,
            normalization: Normalization::Raw,
            filter: FilterType::CatmullRom,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// A preprocessed batch of one image, shape `[1, height, width, 3]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// Build from raw NHWC data. Panics if `data` does not hold `height * width * 3` values.
    pub fn from_nhwc(data: Vec<f32>, height: usize, width: usize) -> Self {
        assert_eq!(data.len(), height * width * 3, "tensor data does not match shape");
        Self {
            data,
            height,
            width,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, 3]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// Turns uploaded image bytes into classifier input.
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Decode, resize, normalize, and batch one image.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
        let rgb = self.decode(bytes)?;
        Ok(self.to_tensor(&rgb))
    }

    /// Decode bytes into an RGB pixel grid.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
        if bytes.is_empty() {
            return Err(PreprocessError::Decode("empty input".into()));
        }
        if bytes.len() > self.config.max_bytes {
            return Err(PreprocessError::Decode(format!(
                "input is {} bytes, limit is {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?
            .decode()
            .map_err(decode_error)?;

        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::Decode("image has zero size".into()));
        }

        // Alpha is dropped; greyscale is expanded.
        Ok(image.into_rgb8())
    }

    /// Resize to the target geometry and lay out as a normalized NHWC tensor.
    pub fn to_tensor(&self, rgb: &RgbImage) -> ImageTensor {
        let (w, h) = (self.config.width, self.config.height);
        let resized;
        let pixels = if rgb.dimensions() == (w, h) {
            rgb
        } else {
            resized = imageops::resize(rgb, w, h, self.config.filter);
            &resized
        };

        let norm = self.config.normalization;
        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        for pixel in pixels.pixels() {
            for (c, &v) in pixel.0.iter().enumerate() {
                data.push(norm.apply(c, v));
            }
        }

        ImageTensor::from_nhwc(data, h as usize, w as usize)
    }
}

/// Colour layouts with no RGB mapping surface from the decoder as
/// `UnsupportedErrorKind::Color`; everything it does return converts to RGB.
fn decode_error(err: ImageError) -> PreprocessError {
    match err {
        ImageError::Unsupported(ref e) if matches!(e.kind(), UnsupportedErrorKind::Color(_)) => {
            PreprocessError::UnsupportedFormat(err.to_string())
        }
        other => PreprocessError::Decode(other.to_string()),
    }
}
