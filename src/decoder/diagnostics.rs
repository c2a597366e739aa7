use image::GrayImage;
use serde::Serialize;

use super::PreparedImage;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sharpness {
    pub average_intensity: f64,
    pub contrast_variance: f64,
    pub sharpness_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub original_size: usize,
    pub processed_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_alpha: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_grayscale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<Sharpness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageAnalysis {
    pub fn sizes(original_size: usize, processed_size: usize) -> Self {
        Self {
            original_size,
            processed_size: Some(processed_size),
            ..Self::default()
        }
    }
}

/// Fills in the observability fields. Never influences decoding.
pub fn analyze(image: &PreparedImage, analysis: &mut ImageAnalysis) {
    let (width, height) = image.dimensions();
    analysis.dimensions = Some(Dimensions { width, height });
    analysis.format = image
        .source_format
        .and_then(|f| f.extensions_str().first().copied())
        .map(str::to_string);
    analysis.has_alpha = Some(image.has_alpha);
    analysis.is_grayscale = Some(image.is_grayscale);

    match estimate_sharpness(&image.luma) {
        Some(sharpness) => analysis.sharpness = Some(sharpness),
        None => analysis.error = Some("Could not estimate sharpness of an empty image".to_string()),
    }
}

/// Greyscale mean and variance, with `variance / 1000` as a rough sharpness score.
pub fn estimate_sharpness(luma: &GrayImage) -> Option<Sharpness> {
    let count = luma.width() as usize * luma.height() as usize;
    if count == 0 {
        return None;
    }
    let count = count as f64;

    let mean = luma.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / count;
    let variance = luma
        .pixels()
        .map(|p| {
            let delta = f64::from(p.0[0]) - mean;
            delta * delta
        })
        .sum::<f64>()
        / count;

    Some(Sharpness {
        average_intensity: mean,
        contrast_variance: variance,
        sharpness_score: variance / 1000.0,
    })
}
