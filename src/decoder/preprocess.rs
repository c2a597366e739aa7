use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageError, ImageFormat, RgbImage};

const ALLOWED_SUBTYPES: [&str; 6] = ["jpeg", "png", "jpg", "gif", "bmp", "webp"];

/// Gain applied after contrast stretching.
const LINEAR_GAIN: f32 = 1.1;

/// `image/<subtype>` for one of the allowed subtypes, parameters ignored.
pub fn is_supported_mime(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence
        .strip_prefix("image/")
        .is_some_and(|subtype| ALLOWED_SUBTYPES.contains(&subtype))
}

/// Normalized image shared by every decode strategy.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub luma: GrayImage,
    /// Normalized image re-encoded as PNG.
    pub png: Vec<u8>,
    pub source_format: Option<ImageFormat>,
    pub has_alpha: bool,
    pub is_grayscale: bool,
}

impl PreparedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.luma.dimensions()
    }
}

pub fn prepare(bytes: &[u8]) -> Result<PreparedImage, ImageError> {
    let source_format = image::guess_format(bytes).ok();
    let decoded = image::load_from_memory(bytes)?;
    let color = decoded.color();

    let mut rgb = flatten_onto_white(&decoded);
    stretch_contrast(&mut rgb);
    apply_gain(&mut rgb, LINEAR_GAIN);

    let normalized = DynamicImage::ImageRgb8(rgb);
    let mut png = Vec::new();
    normalized.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(PreparedImage {
        luma: normalized.to_luma8(),
        png,
        source_format,
        has_alpha: color.has_alpha(),
        is_grayscale: !color.has_color(),
    })
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Stretches luminance so the darkest pixel maps to 0 and the brightest to 255.
fn stretch_contrast(image: &mut RgbImage) {
    let luma = DynamicImage::ImageRgb8(image.clone()).to_luma8();
    let (min, max) = luma
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min {
        return;
    }

    let (min, range) = (f32::from(min), f32::from(max - min));
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let stretched = (f32::from(*channel) - min) * 255.0 / range;
            *channel = stretched.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn apply_gain(image: &mut RgbImage, gain: f32) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (f32::from(*channel) * gain).round().clamp(0.0, 255.0) as u8;
        }
    }
}
