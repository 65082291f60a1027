use std::{
    fs, io,
    path::{Path, PathBuf},
};

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use rust_decimal::Decimal;
use thiserror::Error;

const FONT_SIZE: f32 = 140.0;
const ORIGIN: (i32, i32) = (35, 20);
const SHADOW_OFFSET: i32 = 4;
const OUTLINE_OFFSETS: [i32; 4] = [-2, -1, 1, 2];

const BODY: Rgba<u8> = Rgba([255, 0, 0, 255]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 255]);
const OUTLINE: Rgba<u8> = Rgba([255, 215, 0, 255]);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("asset not found: {}", .0.display())]
    AssetMissing(PathBuf),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("invalid font {}", .0.display())]
    Font(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Price card: the price drawn over a background image.
#[derive(Debug, Clone)]
pub struct PriceCard {
    pub background: PathBuf,
    pub font: PathBuf,
    /// Where the rendered JPEG is written.
    pub output: PathBuf,
}

impl PriceCard {
    pub fn new(
        background: impl Into<PathBuf>,
        font: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            background: background.into(),
            font: font.into(),
            output: output.into(),
        }
    }

    /// Fails with the first asset that does not exist.
    pub fn check_assets(&self) -> Result<(), RenderError> {
        for path in [&self.background, &self.font] {
            if !path.exists() {
                return Err(RenderError::AssetMissing(path.clone()));
            }
        }
        Ok(())
    }

    /// Renders the card for `price`, saves it to [`PriceCard::output`] and
    /// returns the saved bytes. Blocking.
    pub fn render(&self, price: Decimal) -> Result<Vec<u8>, RenderError> {
        self.check_assets()?;

        let font = load_font(&self.font)?;
        let mut canvas = image::open(&self.background)?.to_rgba8();

        let lines = ["BTC".to_owned(), format!("${price:.2}")];
        let (x, y) = ORIGIN;
        let (sx, sy) = (x + SHADOW_OFFSET, y + SHADOW_OFFSET);
        draw_lines(&mut canvas, SHADOW, sx, sy, &font, &lines);
        for dx in OUTLINE_OFFSETS {
            for dy in OUTLINE_OFFSETS {
                draw_lines(&mut canvas, OUTLINE, x + dx, y + dy, &font, &lines);
            }
        }
        draw_lines(&mut canvas, BODY, x, y, &font, &lines);

        image::DynamicImage::ImageRgba8(canvas)
            .to_rgb8()
            .save(&self.output)?;

        let bytes = fs::read(&self.output)?;
        if bytes.is_empty() {
            return Err(RenderError::AssetMissing(self.output.clone()));
        }
        Ok(bytes)
    }

    pub fn file_name(&self) -> String {
        self.output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "price.jpg".to_owned())
    }
}

fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    FontVec::try_from_vec(fs::read(path)?).map_err(|_| RenderError::Font(path.to_owned()))
}

fn draw_lines(
    canvas: &mut RgbaImage,
    colour: Rgba<u8>,
    x: i32,
    y: i32,
    font: &FontVec,
    lines: &[String],
) {
    let scale = PxScale::from(FONT_SIZE);
    let scaled = font.as_scaled(scale);
    let line_height = (scaled.height() + scaled.line_gap()).ceil() as i32;

    for (i, line) in lines.iter().enumerate() {
        draw_text_mut(canvas, colour, x, y + line_height * i as i32, scale, font, line);
    }
}
