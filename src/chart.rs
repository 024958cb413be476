//! Minimal PNG bar charts for the HTML report.
//!
//! Charts carry no text; the report prints labels and values next to them.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const WIDTH: u32 = 420;
const HEIGHT: u32 = 220;
const MARGIN: u32 = 16;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([80, 80, 80]);

pub const RATING_PALETTE: &[[u8; 3]] = &[
    [214, 69, 65],
    [232, 126, 4],
    [241, 196, 15],
    [130, 190, 80],
    [39, 174, 96],
];

pub const SENTIMENT_PALETTE: &[[u8; 3]] = &[[39, 174, 96], [149, 165, 166], [214, 69, 65]];

/// Draws one bar per value, scaled to the largest value, and encodes the
/// image as PNG. Bar colours cycle through `palette`.
pub fn bar_chart_png(values: &[f64], palette: &[[u8; 3]]) -> Result<Vec<u8>> {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    let plot_w = WIDTH - 2 * MARGIN;
    let plot_h = HEIGHT - 2 * MARGIN;
    let baseline = HEIGHT - MARGIN;

    let values: Vec<f64> = values
        .iter()
        .take(plot_w as usize)
        .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
        .collect();
    let max = values.iter().copied().fold(0.0_f64, f64::max);

    if !values.is_empty() && max > 0.0 {
        let slot = plot_w / values.len() as u32;
        let bar_w = (slot * 3 / 4).max(1);

        for (i, v) in values.iter().enumerate() {
            let h = ((v / max) * plot_h as f64).round() as u32;
            let color = palette
                .get(i % palette.len().max(1))
                .map(|c| Rgb(*c))
                .unwrap_or(AXIS);
            let x0 = MARGIN + i as u32 * slot + (slot - bar_w) / 2;

            for x in x0..x0 + bar_w {
                for y in baseline - h.min(plot_h)..baseline {
                    img.put_pixel(x, y, color);
                }
            }
        }
    }

    for x in MARGIN..WIDTH - MARGIN {
        img.put_pixel(x, baseline, AXIS);
    }

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .context("Failed to encode chart as PNG")?;
    Ok(buf.into_inner())
}

/// `data:` URI for embedding a PNG in an `<img src>`.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
