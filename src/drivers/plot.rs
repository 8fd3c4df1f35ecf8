use image::RgbImage;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::measurement::Trend;
/// Look of the scrolling `dT/dt` graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotStyle {
    pub background: [u8; 3],
    /// 0 is fully transparent, 1 opaque.
    pub background_alpha: f64,
    pub line: [u8; 3],
    pub line_width: u32,
    pub marker: [u8; 3],
    pub marker_size: u32,
    pub margin: u32,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            background: [63, 63, 63],
            background_alpha: 0.6,
            line: [255, 255, 0],
            line_width: 2,
            marker: [255, 0, 0],
            marker_size: 4,
            margin: 6,
        }
    }
}
/// Pixel rectangle inside the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlotArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
fn rgb(c: [u8; 3]) -> RGBColor {
    RGBColor(c[0], c[1], c[2])
}
/// Draws the trend into `area` of `image`; the caller keeps `area` inside the image.
pub fn draw_trend(
    image: &mut RgbImage,
    area: PlotArea,
    trend: &Trend<'_>,
    style: &PlotStyle,
) -> Result<()> {
    let (width, height) = image.dimensions();
    let buffer: &mut [u8] = image;
    let root = BitMapBackend::with_buffer(buffer, (width, height)).into_drawing_area();
    let panel = root
        .clone()
        .shrink((area.x as i32, area.y as i32), (area.width as i32, area.height as i32));
    panel.fill(&rgb(style.background).mix(style.background_alpha.clamp(0.0, 1.0)))?;
    let (x0, x1) = trend.x_range;
    let (y0, y1) = trend.y_range();
    let mut chart = ChartBuilder::on(&panel)
        .margin(style.margin as i32)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    if y0 < 0.0 && y1 > 0.0 {
        chart.draw_series(LineSeries::new(
            [(x0, 0.0), (x1, 0.0)],
            ShapeStyle::from(&rgb(style.line).mix(0.35)).stroke_width(1),
        ))?;
    }
    let finite = trend.points.iter().copied().filter(|(_, v)| v.is_finite());
    chart.draw_series(LineSeries::new(
        finite,
        ShapeStyle::from(&rgb(style.line)).stroke_width(style.line_width),
    ))?;
    if trend.current.1.is_finite() {
        chart.draw_series(std::iter::once(Circle::new(
            trend.current,
            style.marker_size as i32,
            rgb(style.marker).filled(),
        )))?;
    }
    root.present()?;
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::RateTrack;
    use image::Rgb;
    #[test]
    fn graph_only_touches_its_area() {
        let times: Vec<f64> = (0..50).map(|i| i as f64 * 0.5).collect();
        let values: Vec<f64> = times.iter().map(|t| (t * 0.3).sin() * 10.0).collect();
        let track = RateTrack::compute(&times, &values, 3, 3);
        let trend = track.trend(40, 10.0).unwrap();
        let mut image = RgbImage::from_pixel(120, 80, Rgb([0, 0, 0]));
        let area = PlotArea {
            x: 60,
            y: 10,
            width: 50,
            height: 40,
        };
        draw_trend(&mut image, area, &trend, &PlotStyle::default()).unwrap();
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(119, 79), Rgb([0, 0, 0]));
        let touched = (10..50)
            .flat_map(|y| (60..110).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) != Rgb([0, 0, 0]))
            .count();
        assert!(touched > 0);
    }
}
