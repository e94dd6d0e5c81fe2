use crate::colormap::{hex_to_rgba, ColorScheme, BLACK, LIGHT_GREY, MISSING, RED, SKY_BLUE, WHITE};
use crate::types::{FeatureCollection, HighlightLabel};
use ab_glyph::FontRef;
use anyhow::{Context, Result};
use geo::{BoundingRect, Coord, LineString, Polygon, Rect};
use image::{GrayImage, ImageBuffer, ImageFormat, Luma, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut, draw_text_mut, text_size,
};
use imageproc::point::Point;
use std::io::Cursor;
use tracing::{debug, warn};

const MARGIN: f64 = 30.0;
const LEGEND_GUTTER: u32 = 90;
const LEGEND_WIDTH: u32 = 20;
const TITLE_SCALE: f32 = 16.0;
const LABEL_SCALE: f32 = 12.0;

static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn font() -> Option<FontRef<'static>> {
    match FontRef::try_from_slice(FONT_BYTES) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Bundled font failed to parse: {}", e);
            None
        }
    }
}

/// Colour bar shown beside choropleth maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Legend {
    pub scheme: ColorScheme,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
pub struct Style {
    pub background: Rgba<u8>,
    pub edge: Rgba<u8>,
    /// One fill per feature, aligned with the collection.
    pub fills: Vec<Rgba<u8>>,
    pub legend: Option<Legend>,
}

impl Style {
    pub fn cosmetic(count: usize) -> Self {
        Self {
            background: hex_to_rgba(LIGHT_GREY),
            edge: hex_to_rgba(BLACK),
            fills: vec![hex_to_rgba(SKY_BLUE); count],
            legend: None,
        }
    }

    pub fn highlight(labels: &[HighlightLabel]) -> Self {
        let fills = labels
            .iter()
            .map(|label| match label {
                HighlightLabel::Highlighted => hex_to_rgba(RED),
                HighlightLabel::Neutral => hex_to_rgba(SKY_BLUE),
            })
            .collect();
        Self {
            background: hex_to_rgba(WHITE),
            edge: hex_to_rgba(BLACK),
            fills,
            legend: None,
        }
    }

    /// Values are normalized over their finite range; anything else is drawn
    /// as missing.
    pub fn choropleth(values: &[f64], scheme: ColorScheme) -> Self {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

        let fills = values
            .iter()
            .map(|&v| {
                if !v.is_finite() {
                    hex_to_rgba(MISSING)
                } else if max > min {
                    scheme.sample((v - min) / (max - min))
                } else {
                    scheme.sample(0.5)
                }
            })
            .collect();

        let legend = (min <= max).then_some(Legend { scheme, min, max });
        Self {
            background: hex_to_rgba(WHITE),
            edge: hex_to_rgba(BLACK),
            fills,
            legend,
        }
    }
}

/// Maps CRS coordinates onto the plot area with equal aspect.
struct Frame {
    min_x: f64,
    max_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Frame {
    fn fit(bounds: Rect<f64>, plot_w: f64, plot_h: f64) -> Self {
        let dx = bounds.width().max(f64::EPSILON);
        let dy = bounds.height().max(f64::EPSILON);
        let scale = (plot_w / dx).min(plot_h / dy);
        Self {
            min_x: bounds.min().x,
            max_y: bounds.max().y,
            scale,
            offset_x: MARGIN + (plot_w - dx * scale) / 2.0,
            offset_y: MARGIN + (plot_h - dy * scale) / 2.0,
        }
    }

    fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        (
            (self.offset_x + (x - self.min_x) * self.scale) as f32,
            (self.offset_y + (self.max_y - y) * self.scale) as f32,
        )
    }
}

fn collection_bounds(fc: &FeatureCollection) -> Option<Rect<f64>> {
    fc.features
        .iter()
        .filter_map(|f| f.geometry.bounding_rect())
        .filter(|r| r.min().x.is_finite() && r.max().y.is_finite())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

fn plot_frame(fc: &FeatureCollection, style: &Style, width: u32, height: u32) -> Option<Frame> {
    let gutter = if style.legend.is_some() { LEGEND_GUTTER } else { 0 };
    let plot_w = (width.saturating_sub(gutter) as f64 - 2.0 * MARGIN).max(1.0);
    let plot_h = (height as f64 - 2.0 * MARGIN).max(1.0);
    collection_bounds(fc).map(|bounds| Frame::fit(bounds, plot_w, plot_h))
}

pub fn render_map(fc: &FeatureCollection, style: &Style, width: u32, height: u32) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, style.background);

    let frame = match plot_frame(fc, style, width, height) {
        Some(frame) => frame,
        None => return img,
    };

    let mut drawn = 0usize;
    for (feature, fill) in fc.features.iter().zip(style.fills.iter()) {
        for polygon in &feature.geometry {
            if fill_polygon(&mut img, &frame, polygon, *fill) {
                drawn += 1;
            }
            stroke_ring(&mut img, &frame, polygon.exterior(), style.edge);
            for hole in polygon.interiors() {
                stroke_ring(&mut img, &frame, hole, style.edge);
            }
        }
    }
    debug!("Filled {} polygons into {}x{} raster", drawn, width, height);

    if let Some(legend) = &style.legend {
        draw_legend(&mut img, legend, style.edge);
    }

    img
}

/// Pixel ring with repeated points dropped and the closing point removed.
fn ring_points(frame: &Frame, ring: &LineString<f64>) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        if !c.x.is_finite() || !c.y.is_finite() {
            continue;
        }
        let (px, py) = frame.to_pixel(c.x, c.y);
        let p = Point::new(px.round() as i32, py.round() as i32);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    // draw_polygon_mut rejects closed rings.
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Rasterizes the polygon into a mask (exterior set, holes cleared) and
/// copies `color` through it. Pixels inside holes are left untouched.
fn fill_polygon(
    img: &mut RgbaImage,
    frame: &Frame,
    polygon: &Polygon<f64>,
    color: Rgba<u8>,
) -> bool {
    let exterior = ring_points(frame, polygon.exterior());
    if exterior.len() < 3 {
        return false;
    }

    let (width, height) = img.dimensions();
    let x0 = exterior.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let y0 = exterior.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let x1 = exterior.iter().map(|p| p.x).max().unwrap_or(0).min(width as i32 - 1);
    let y1 = exterior.iter().map(|p| p.y).max().unwrap_or(0).min(height as i32 - 1);
    if x0 > x1 || y0 > y1 {
        return false;
    }

    let shift = |points: &[Point<i32>]| -> Vec<Point<i32>> {
        points.iter().map(|p| Point::new(p.x - x0, p.y - y0)).collect()
    };
    let mut mask = GrayImage::new((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_polygon_mut(&mut mask, &shift(&exterior), Luma([255u8]));
    for hole in polygon.interiors() {
        let points = ring_points(frame, hole);
        if points.len() >= 3 {
            draw_polygon_mut(&mut mask, &shift(&points), Luma([0u8]));
        }
    }

    for (mx, my, value) in mask.enumerate_pixels() {
        if value[0] == 255 {
            img.put_pixel(mx + x0 as u32, my + y0 as u32, color);
        }
    }
    true
}

fn stroke_ring(img: &mut RgbaImage, frame: &Frame, ring: &LineString<f64>, color: Rgba<u8>) {
    for line in ring.lines() {
        if !(line.start.x.is_finite()
            && line.start.y.is_finite()
            && line.end.x.is_finite()
            && line.end.y.is_finite())
        {
            continue;
        }
        let start = frame.to_pixel(line.start.x, line.start.y);
        let end = frame.to_pixel(line.end.x, line.end.y);
        draw_line_segment_mut(img, start, end, color);
    }
}

fn legend_left(width: u32) -> u32 {
    width - LEGEND_GUTTER + 8
}

/// Short tick label: plain decimals for moderate magnitudes, scientific
/// notation otherwise.
fn format_tick(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && !(1e-2..1e4).contains(&magnitude) {
        format!("{:.2e}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn draw_legend(img: &mut RgbaImage, legend: &Legend, outline: Rgba<u8>) {
    let (width, height) = img.dimensions();
    if width < LEGEND_GUTTER || height as f64 <= 2.0 * MARGIN {
        return;
    }
    let left = legend_left(width);
    let top = MARGIN as u32;
    let bar_h = height - 2 * top;

    // Dark end at the top, matching the value axis.
    for row in 0..bar_h {
        let t = 1.0 - row as f64 / (bar_h.max(2) - 1) as f64;
        let color = legend.scheme.sample(t);
        for col in left..left + LEGEND_WIDTH {
            img.put_pixel(col, top + row, color);
        }
    }
    draw_hollow_rect_mut(
        img,
        imageproc::rect::Rect::at(left as i32, top as i32).of_size(LEGEND_WIDTH, bar_h),
        outline,
    );

    if let Some(font) = font() {
        let x = (left + LEGEND_WIDTH + 4) as i32;
        let max = format_tick(legend.max);
        let min = format_tick(legend.min);
        let (_, min_h) = text_size(LABEL_SCALE, &font, &min);
        draw_text_mut(img, outline, x, top as i32, LABEL_SCALE, &font, &max);
        draw_text_mut(
            img,
            outline,
            x,
            (top + bar_h) as i32 - min_h as i32,
            LABEL_SCALE,
            &font,
            &min,
        );
    }
}

/// Centres `title` in the top margin.
pub fn draw_title(img: &mut RgbaImage, title: &str, color: Rgba<u8>) {
    let Some(font) = font() else {
        return;
    };
    let (text_w, text_h) = text_size(TITLE_SCALE, &font, title);
    let x = (img.width() as i32 - text_w as i32).max(0) / 2;
    let y = ((MARGIN as i32 - text_h as i32) / 2).max(0);
    draw_text_mut(img, color, x, y, TITLE_SCALE, &font, title);
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(buf.into_inner())
}
