//! Draws a caption onto an image in the classic meme style: white text
//! with a black outline, centered just above the bottom edge.
//!
//! Rendering never fails the caller. If no usable font exists or the
//! overlay cannot be drawn, the output is an unmodified copy of the
//! source, so the endpoint always has a file to reference.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use thiserror::Error;
use tracing::{debug, warn};

const MEME_JPEG_QUALITY: u8 = 95;
const PLAIN_JPEG_QUALITY: u8 = 90;

/// Probed in order when MEME_FONT is not set.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not decode source image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not write output image: {0}")]
    Io(#[from] std::io::Error),
}

/// How a meme file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderedMeme {
    /// Caption drawn over the image, encoded at full quality.
    Captioned,
    /// Overlay was not possible; the file is a plain re-encode of the
    /// source at slightly reduced quality.
    Plain,
}

pub struct Compositor {
    font: Option<FontVec>,
}

impl Compositor {
    /// Loads the overlay font once: the configured path first, then the
    /// well-known system locations.
    pub fn new(configured: Option<&Path>) -> Self {
        let font = load_font(configured);
        if font.is_none() {
            warn!("no usable overlay font found, memes will be plain copies");
        }
        Self { font }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Renders `caption` onto the image at `source` and writes a JPEG to
    /// `dest`. Only an unreadable source or an unwritable destination is
    /// an error; everything else degrades to a plain copy.
    pub fn compose(
        &self,
        source: &Path,
        caption: &str,
        dest: &Path,
    ) -> Result<RenderedMeme, RenderError> {
        let image = open_rgb(source)?;
        match &self.font {
            Some(font) => {
                let rendered = draw_caption(&image, caption, font);
                write_jpeg(&rendered, dest, MEME_JPEG_QUALITY)?;
                Ok(RenderedMeme::Captioned)
            }
            None => {
                write_jpeg(&image, dest, PLAIN_JPEG_QUALITY)?;
                Ok(RenderedMeme::Plain)
            }
        }
    }
}

/// Originals are stored under a `.jpg` name no matter what the browser
/// uploaded, so the decoder must sniff the real format from the bytes.
fn open_rgb(path: &Path) -> Result<RgbImage, RenderError> {
    let image = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(image.to_rgb8())
}

fn write_jpeg(image: &RgbImage, dest: &Path, quality: u8) -> Result<(), RenderError> {
    let file = fs::File::create(dest)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality).encode_image(image)?;
    Ok(())
}

fn draw_caption(image: &RgbImage, caption: &str, font: &FontVec) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();

    let font_size = overlay_font_size(width, height);
    let scale = PxScale::from(font_size as f32);
    let (text_width, text_height) = text_size(scale, font, caption);

    let x = (i64::from(width) - i64::from(text_width)) / 2;
    let y = 10.max(i64::from(height) - i64::from(text_height) - 24);
    let outline = i64::from(outline_width(font_size));

    let black = Rgb([0u8, 0, 0]);
    let white = Rgb([255u8, 255, 255]);
    for dx in -outline..=outline {
        for dy in -outline..=outline {
            if dx == 0 && dy == 0 {
                continue;
            }
            draw_text_mut(
                &mut canvas,
                black,
                (x + dx) as i32,
                (y + dy) as i32,
                scale,
                font,
                caption,
            );
        }
    }
    draw_text_mut(&mut canvas, white, x as i32, y as i32, scale, font, caption);
    canvas
}

fn overlay_font_size(width: u32, height: u32) -> u32 {
    24.max(width.min(height) / 12)
}

fn outline_width(font_size: u32) -> u32 {
    2.max(font_size / 18)
}

fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(FONT_CANDIDATES.iter().map(PathBuf::from));

    for candidate in candidates {
        let Ok(bytes) = fs::read(&candidate) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!(path = %candidate.display(), "loaded overlay font");
                return Some(font);
            }
            Err(err) => {
                warn!(path = %candidate.display(), error = %err, "skipping unparseable font file");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_fixture(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let image = RgbImage::from_pixel(width, height, Rgb([40u8, 120, 200]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn decode(path: &Path) -> RgbImage {
        open_rgb(path).unwrap()
    }

    #[test]
    fn font_size_tracks_the_short_edge() {
        assert_eq!(overlay_font_size(100, 100), 24);
        assert_eq!(overlay_font_size(1200, 900), 75);
        assert_eq!(overlay_font_size(900, 1200), 75);
    }

    #[test]
    fn outline_width_scales_with_the_font() {
        assert_eq!(outline_width(24), 2);
        assert_eq!(outline_width(36), 2);
        assert_eq!(outline_width(75), 4);
        assert_eq!(outline_width(90), 5);
    }

    #[test]
    fn fontless_compose_still_writes_a_decodable_jpeg() {
        let dir = tempdir().unwrap();
        // A png stored under a .jpg name, as the upload path does.
        let source = png_fixture(dir.path(), "original_test.jpg", 64, 48);
        let dest = dir.path().join("meme_test.jpg");
        let compositor = Compositor { font: None };

        let rendered = compositor.compose(&source, "still works", &dest).unwrap();

        assert_eq!(rendered, RenderedMeme::Plain);
        let output = decode(&dest);
        assert_eq!(output.dimensions(), (64, 48));
    }

    #[test]
    fn captioned_compose_writes_a_decodable_jpeg() {
        let compositor = Compositor::new(None);
        if !compositor.has_font() {
            // Machine without any candidate font; the fontless test above
            // covers the degrade path.
            return;
        }

        let dir = tempdir().unwrap();
        let source = png_fixture(dir.path(), "original_test.jpg", 320, 240);
        let dest = dir.path().join("meme_test.jpg");

        let rendered = compositor.compose(&source, "TOP TEXT", &dest).unwrap();

        assert_eq!(rendered, RenderedMeme::Captioned);
        let output = decode(&dest);
        assert_eq!(output.dimensions(), (320, 240));
        let plain = decode(&source);
        assert_ne!(output.as_raw(), plain.as_raw());
    }

    #[test]
    fn unreadable_source_is_an_error() {
        let dir = tempdir().unwrap();
        let garbage = dir.path().join("not_an_image.jpg");
        fs::write(&garbage, b"definitely not pixels").unwrap();
        let compositor = Compositor { font: None };

        let err = compositor
            .compose(&garbage, "nope", &dir.path().join("out.jpg"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Decode(_)));

        let missing = dir.path().join("missing.jpg");
        let err = compositor
            .compose(&missing, "nope", &dir.path().join("out2.jpg"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }

    #[test]
    fn unparseable_configured_font_falls_through_to_candidates() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("font.ttf");
        fs::write(&bogus, b"not a font").unwrap();

        let with_bogus = Compositor::new(Some(&bogus));
        let without = Compositor::new(None);
        assert_eq!(with_bogus.has_font(), without.has_font());
    }
}
