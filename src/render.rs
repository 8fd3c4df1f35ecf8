// src/render.rs
//! Overlay layers drawn onto every frame.
//!
//! Placement is computed by [`OverlayRenderer::compose`] from the layout
//! alone: every box is `font px + 2 * padding` tall and only its width
//! depends on the painted text. Top-left stack: time, EMF, temperature,
//! rate. Bottom-left stack, growing upward: additional text, operator,
//! sample. Logo bottom-right, graph top-right.
use image::{Rgb, RgbImage, RgbaImage};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};
use crate::drivers::buffer::{blend_rgba, fill_rect, Frame, Resolution};
use crate::drivers::plot::{draw_trend, PlotArea, PlotStyle};
use crate::error::{OverlayError, Result};
use crate::measurement::{SeriesMetadata, Trend};
/// Static text placement and look, fixed for the whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayLayout {
    pub margin_x: u32,
    pub margin_y: u32,
    pub line_spacing: u32,
    pub padding: u32,
    pub font_family: String,
    pub large_font_px: u32,
    pub small_font_px: u32,
    pub text_color: [u8; 3],
    pub background_color: [u8; 3],
    /// Decimals of the elapsed time, 1 to 3.
    pub time_precision: usize,
    pub emf_precision: usize,
    pub temperature_precision: usize,
    pub rate_precision: usize,
    /// Narrowest text box content; part of the minimum frame area.
    pub min_text_width: u32,
}
impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            margin_x: 15,
            margin_y: 15,
            line_spacing: 10,
            padding: 5,
            font_family: "serif".into(),
            large_font_px: 60,
            small_font_px: 40,
            text_color: [255, 255, 0],
            background_color: [63, 63, 63],
            time_precision: 1,
            emf_precision: 2,
            temperature_precision: 0,
            rate_precision: 2,
            min_text_width: 200,
        }
    }
}
impl OverlayLayout {
    fn box_height(&self, size: TextSize) -> u32 {
        self.font_px(size) + 2 * self.padding
    }
    fn font_px(&self, size: TextSize) -> u32 {
        match size {
            TextSize::Large => self.large_font_px,
            TextSize::Small => self.small_font_px,
        }
    }
}
/// Measures and paints single lines of text.
pub trait TextPainter {
    /// Pixel width and height of `text` at `size_px`.
    fn measure(&self, text: &str, size_px: u32) -> Result<(u32, u32)>;
    /// Paints `text` with its top-left corner at `(x, y)`.
    fn paint(
        &self,
        image: &mut RgbImage,
        text: &str,
        x: i32,
        y: i32,
        size_px: u32,
        color: [u8; 3],
    ) -> Result<()>;
}
impl<P: TextPainter + ?Sized> TextPainter for Box<P> {
    fn measure(&self, text: &str, size_px: u32) -> Result<(u32, u32)> {
        (**self).measure(text, size_px)
    }
    fn paint(
        &self,
        image: &mut RgbImage,
        text: &str,
        x: i32,
        y: i32,
        size_px: u32,
        color: [u8; 3],
    ) -> Result<()> {
        (**self).paint(image, text, x, y, size_px, color)
    }
}
/// TrueType text through plotters' font backend.
pub struct PlottersPainter {
    family: String,
}
impl PlottersPainter {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
        }
    }
    fn font(&self, size_px: u32) -> FontDesc<'_> {
        (self.family.as_str(), size_px as f64).into_font()
    }
}
impl TextPainter for PlottersPainter {
    fn measure(&self, text: &str, size_px: u32) -> Result<(u32, u32)> {
        self.font(size_px)
            .box_size(text)
            .map_err(|e| OverlayError::Render(format!("font {:?}: {e:?}", self.family)))
    }
    fn paint(
        &self,
        image: &mut RgbImage,
        text: &str,
        x: i32,
        y: i32,
        size_px: u32,
        color: [u8; 3],
    ) -> Result<()> {
        let (width, height) = image.dimensions();
        let buffer: &mut [u8] = image;
        let root = BitMapBackend::with_buffer(buffer, (width, height)).into_drawing_area();
        let style = self
            .font(size_px)
            .color(&RGBColor(color[0], color[1], color[2]))
            .pos(Pos::new(HPos::Left, VPos::Top));
        root.draw_text(text, &style, (x, y))?;
        root.present()?;
        Ok(())
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextSize {
    Large,
    Small,
}
/// Text layers, listed in drawing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Operator,
    Sample,
    Time,
    Emf,
    Temperature,
    Rate,
    Additional,
}
/// Values shown on one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Original video time of the frame (trim offset included), in seconds.
    pub elapsed: f64,
    pub emf: f64,
    /// Calibrated temperature; present when calibration is on.
    pub temperature: Option<f64>,
    pub rate: Option<f64>,
}
/// Everything per-run that the text layers show besides the reading.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayContent {
    pub operator: String,
    pub sample_id: String,
    pub show_temperature: bool,
    pub show_rate: bool,
    pub additional_text: Option<String>,
}
impl OverlayContent {
    pub fn from_metadata(metadata: &SeriesMetadata) -> Self {
        Self {
            operator: metadata.operator.clone(),
            sample_id: metadata.sample_id.clone(),
            show_temperature: metadata.calibration_enabled,
            show_rate: false,
            additional_text: None,
        }
    }
}
/// Size and look of the `dT/dt` graph in the top-right corner.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphLayer {
    pub width: u32,
    pub height: u32,
    pub style: PlotStyle,
}
/// A text layer's final position.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub layer: Layer,
    pub text: String,
    pub size_px: u32,
    /// Background box, `[x0, x1) x [y0, y1)`.
    pub bounds: (u32, u32, u32, u32),
    pub text_origin: (u32, u32),
}
pub struct OverlayRenderer {
    layout: OverlayLayout,
    content: OverlayContent,
    logo: Option<RgbaImage>,
    graph: Option<(PlotArea, PlotStyle)>,
    output: Resolution,
    painter: Box<dyn TextPainter>,
}
impl OverlayRenderer {
    /// Checks the static layers against the output resolution once.
    pub fn new(
        layout: OverlayLayout,
        content: OverlayContent,
        logo: Option<RgbaImage>,
        graph: Option<GraphLayer>,
        output: Resolution,
    ) -> Result<Self> {
        let painter = Box::new(PlottersPainter::new(layout.font_family.clone()));
        let mut renderer = Self {
            layout,
            content,
            logo: None,
            graph: None,
            output,
            painter,
        };
        let required = renderer.minimum_area();
        if !output.contains(required) {
            return Err(OverlayError::OverlayBounds {
                required,
                available: output,
            });
        }
        if let Some(logo) = logo {
            let size = Resolution::new(logo.width(), logo.height());
            if !output.contains(size) {
                return Err(OverlayError::OverlayBounds {
                    required: size,
                    available: output,
                });
            }
            renderer.logo = Some(logo);
        }
        if let Some(graph) = graph {
            let margin_x = renderer.layout.margin_x;
            let margin_y = renderer.layout.margin_y;
            let required = Resolution::new(graph.width + margin_x, graph.height + margin_y);
            if graph.width == 0 || graph.height == 0 || !output.contains(required) {
                return Err(OverlayError::OverlayBounds {
                    required,
                    available: output,
                });
            }
            let area = PlotArea {
                x: output.width - graph.width - margin_x,
                y: margin_y,
                width: graph.width,
                height: graph.height,
            };
            renderer.graph = Some((area, graph.style));
        }
        Ok(renderer)
    }
    pub fn with_painter(mut self, painter: impl TextPainter + 'static) -> Self {
        self.painter = Box::new(painter);
        self
    }
    pub fn output(&self) -> Resolution {
        self.output
    }
    pub fn shows_graph(&self) -> bool {
        self.graph.is_some()
    }
    fn top_stack(&self) -> Vec<(Layer, TextSize)> {
        let mut stack = vec![(Layer::Time, TextSize::Large), (Layer::Emf, TextSize::Large)];
        if self.content.show_temperature {
            stack.push((Layer::Temperature, TextSize::Large));
            if self.content.show_rate {
                stack.push((Layer::Rate, TextSize::Large));
            }
        }
        stack
    }
    /// Bottom-up order.
    fn bottom_stack(&self) -> Vec<(Layer, TextSize)> {
        let mut stack = Vec::with_capacity(3);
        if self.content.additional_text.is_some() {
            stack.push((Layer::Additional, TextSize::Small));
        }
        stack.push((Layer::Operator, TextSize::Small));
        stack.push((Layer::Sample, TextSize::Large));
        stack
    }
    fn stack_height(&self, stack: &[(Layer, TextSize)]) -> u32 {
        let boxes: u32 = stack.iter().map(|(_, s)| self.layout.box_height(*s)).sum();
        boxes + self.layout.line_spacing * (stack.len() as u32).saturating_sub(1)
    }
    /// Smallest frame every text layer fits in.
    pub fn minimum_area(&self) -> Resolution {
        let l = &self.layout;
        let width = 2 * l.margin_x + l.min_text_width + 2 * l.padding;
        let height = 2 * l.margin_y
            + self.stack_height(&self.top_stack())
            + l.line_spacing
            + self.stack_height(&self.bottom_stack());
        Resolution::new(width, height)
    }
    fn text_for(&self, layer: Layer, reading: &Reading) -> String {
        let l = &self.layout;
        match layer {
            Layer::Operator => format!("Operator: {}", self.content.operator),
            Layer::Sample => format!("Sample: {}", self.content.sample_id),
            Layer::Time => format!("t(s): {:.*}", l.time_precision, reading.elapsed),
            Layer::Emf => format!("E(mV): {:.*}", l.emf_precision, reading.emf),
            Layer::Temperature => match reading.temperature {
                Some(t) => format!("T(°C): {:.*}", l.temperature_precision, t),
                None => "T(°C): --".to_string(),
            },
            Layer::Rate => match reading.rate {
                Some(r) => format!("dT/dt(°C/s): {:.*}", l.rate_precision, r),
                None => "dT/dt(°C/s): --".to_string(),
            },
            Layer::Additional => self.content.additional_text.clone().unwrap_or_default(),
        }
    }
    fn place(
        &self,
        layer: Layer,
        size: TextSize,
        top: i64,
        reading: &Reading,
        frame: Resolution,
    ) -> Result<Placement> {
        let l = &self.layout;
        let text = self.text_for(layer, reading);
        let size_px = l.font_px(size);
        let (text_width, _) = self.painter.measure(&text, size_px)?;
        let box_width = text_width.max(l.min_text_width) + 2 * l.padding;
        let box_height = l.box_height(size);
        let right = l.margin_x as i64 + box_width as i64;
        let bottom = top + box_height as i64;
        if top < 0 || right > frame.width as i64 || bottom > frame.height as i64 {
            let required = Resolution::new(
                right.max(frame.width as i64) as u32,
                (bottom - top.min(0)).max(frame.height as i64) as u32,
            );
            return Err(OverlayError::OverlayBounds {
                required,
                available: frame,
            });
        }
        let top = top as u32;
        Ok(Placement {
            layer,
            text,
            size_px,
            bounds: (l.margin_x, top, right as u32, bottom as u32),
            text_origin: (l.margin_x + l.padding, top + l.padding),
        })
    }
    /// Final text placements for one frame, in drawing order.
    pub fn compose(&self, frame: Resolution, reading: &Reading) -> Result<Vec<Placement>> {
        let spacing = self.layout.line_spacing as i64;
        let mut placements = Vec::new();
        let mut top = self.layout.margin_y as i64;
        for (layer, size) in self.top_stack() {
            let placed = self.place(layer, size, top, reading, frame)?;
            top = placed.bounds.3 as i64 + spacing;
            placements.push(placed);
        }
        let top_end = top - spacing;
        let mut bottom = frame.height as i64 - self.layout.margin_y as i64;
        for (layer, size) in self.bottom_stack() {
            let box_top = bottom - self.layout.box_height(size) as i64;
            if box_top < top_end + spacing {
                return Err(OverlayError::OverlayBounds {
                    required: self.minimum_area(),
                    available: frame,
                });
            }
            let placed = self.place(layer, size, box_top, reading, frame)?;
            bottom = box_top - spacing;
            placements.push(placed);
        }
        placements.sort_by_key(|p| p.layer);
        Ok(placements)
    }
    /// Draws all layers onto `frame`: logo, graph, then text.
    pub fn render(&self, frame: &mut Frame, reading: &Reading, trend: Option<&Trend<'_>>) -> Result<()> {
        let resolution = frame.resolution();
        if resolution != self.output {
            return Err(OverlayError::OverlayBounds {
                required: self.output,
                available: resolution,
            });
        }
        let placements = self.compose(resolution, reading)?;
        if let Some(logo) = &self.logo {
            let x = resolution.width - logo.width();
            let y = resolution.height - logo.height();
            blend_rgba(&mut frame.image, logo, x, y);
        }
        if let (Some((area, style)), Some(trend)) = (&self.graph, trend) {
            draw_trend(&mut frame.image, *area, trend, style)?;
        }
        let l = &self.layout;
        let background = Rgb(l.background_color);
        for placed in &placements {
            let (x0, y0, x1, y1) = placed.bounds;
            fill_rect(&mut frame.image, x0, y0, x1, y1, background);
            self.painter.paint(
                &mut frame.image,
                &placed.text,
                placed.text_origin.0 as i32,
                placed.text_origin.1 as i32,
                placed.size_px,
                l.text_color,
            )?;
        }
        Ok(())
    }
}
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::measurement::RateTrack;
    /// Fixed-pitch painter that needs no fonts: each glyph is `px / 2` wide.
    pub(crate) struct BoxPainter;
    impl TextPainter for BoxPainter {
        fn measure(&self, text: &str, size_px: u32) -> Result<(u32, u32)> {
            Ok((text.chars().count() as u32 * size_px / 2, size_px))
        }
        fn paint(
            &self,
            image: &mut RgbImage,
            text: &str,
            x: i32,
            y: i32,
            size_px: u32,
            color: [u8; 3],
        ) -> Result<()> {
            let (w, h) = self.measure(text, size_px)?;
            let x1 = (x as u32 + w).min(image.width());
            let y1 = (y as u32 + h).min(image.height());
            fill_rect(image, x as u32, y as u32, x1, y1, Rgb(color));
            Ok(())
        }
    }
    pub(crate) fn small_layout() -> OverlayLayout {
        OverlayLayout {
            margin_x: 4,
            margin_y: 4,
            line_spacing: 2,
            padding: 1,
            large_font_px: 10,
            small_font_px: 6,
            min_text_width: 20,
            ..OverlayLayout::default()
        }
    }
    fn content(calibrated: bool) -> OverlayContent {
        OverlayContent {
            operator: "Ivanov".into(),
            sample_id: "S7".into(),
            show_temperature: calibrated,
            show_rate: false,
            additional_text: None,
        }
    }
    fn renderer(content: OverlayContent, output: Resolution) -> OverlayRenderer {
        OverlayRenderer::new(small_layout(), content, None, None, output)
            .unwrap()
            .with_painter(BoxPainter)
    }
    fn reading() -> Reading {
        Reading {
            elapsed: 4.52,
            emf: 1.5,
            temperature: Some(250.4),
            rate: Some(-0.125),
        }
    }
    #[test]
    fn stacks_are_placed_from_the_layout() {
        let r = renderer(content(true), Resolution::new(320, 240));
        let placed = r.compose(Resolution::new(320, 240), &reading()).unwrap();
        let layers: Vec<Layer> = placed.iter().map(|p| p.layer).collect();
        assert_eq!(
            layers,
            vec![
                Layer::Operator,
                Layer::Sample,
                Layer::Time,
                Layer::Emf,
                Layer::Temperature
            ]
        );
        let time = &placed[2];
        assert_eq!(time.text, "t(s): 4.5");
        assert_eq!(time.bounds.1, 4);
        assert_eq!(time.bounds.3, 16);
        assert_eq!(time.text_origin, (5, 5));
        assert_eq!(placed[3].bounds.1, 18);
        assert_eq!(placed[3].text, "E(mV): 1.50");
        assert_eq!(placed[4].text, "T(°C): 250");
        let sample = &placed[1];
        assert_eq!(sample.bounds.3, 240 - 4 - 8 - 2);
        let operator = &placed[0];
        assert_eq!(operator.bounds.3, 236);
        assert_eq!(operator.bounds.1, 228);
    }
    #[test]
    fn placement_is_identical_every_frame() {
        let r = renderer(content(true), Resolution::new(320, 240));
        let a = r.compose(Resolution::new(320, 240), &reading()).unwrap();
        let b = r.compose(Resolution::new(320, 240), &reading()).unwrap();
        assert_eq!(a, b);
    }
    #[test]
    fn temperature_needs_calibration() {
        let r = renderer(content(false), Resolution::new(320, 240));
        let placed = r.compose(Resolution::new(320, 240), &reading()).unwrap();
        assert!(placed.iter().all(|p| p.layer != Layer::Temperature));
        assert_eq!(placed.len(), 4);
    }
    #[test]
    fn optional_lines_join_their_stacks() {
        let mut c = content(true);
        c.show_rate = true;
        c.additional_text = Some("run 3".into());
        let r = renderer(c, Resolution::new(320, 240));
        let placed = r.compose(Resolution::new(320, 240), &reading()).unwrap();
        let rate = placed.iter().find(|p| p.layer == Layer::Rate).unwrap();
        assert_eq!(rate.text, "dT/dt(°C/s): -0.12");
        let extra = placed.iter().find(|p| p.layer == Layer::Additional).unwrap();
        assert_eq!(extra.bounds.3, 236);
        let operator = placed.iter().find(|p| p.layer == Layer::Operator).unwrap();
        assert_eq!(operator.bounds.3, extra.bounds.1 - 2);
        assert_eq!(placed.last().unwrap().layer, Layer::Additional);
    }
    #[test]
    fn numbers_always_use_a_decimal_point() {
        let mut layout = small_layout();
        layout.time_precision = 3;
        let r = OverlayRenderer::new(layout, content(false), None, None, Resolution::new(320, 240))
            .unwrap()
            .with_painter(BoxPainter);
        let placed = r.compose(Resolution::new(320, 240), &reading()).unwrap();
        let time = placed.iter().find(|p| p.layer == Layer::Time).unwrap();
        assert_eq!(time.text, "t(s): 4.520");
    }
    #[test]
    fn frame_below_minimum_area_is_rejected() {
        let err = OverlayRenderer::new(
            small_layout(),
            content(true),
            None,
            None,
            Resolution::new(29, 240),
        )
        .err()
        .unwrap();
        assert!(matches!(err, OverlayError::OverlayBounds { .. }));
        let err = OverlayRenderer::new(
            small_layout(),
            content(true),
            None,
            None,
            Resolution::new(320, 60),
        )
        .err()
        .unwrap();
        assert!(matches!(err, OverlayError::OverlayBounds { .. }));
    }
    #[test]
    fn text_wider_than_frame_fails_instead_of_clipping() {
        let mut c = content(false);
        c.operator = "x".repeat(200);
        let r = renderer(c, Resolution::new(120, 240));
        let mut frame = Frame::new(0, 0.0, RgbImage::new(120, 240));
        let err = r.render(&mut frame, &reading(), None).unwrap_err();
        assert!(matches!(err, OverlayError::OverlayBounds { .. }));
    }
    #[test]
    fn render_paints_boxes_and_text() {
        let r = renderer(content(true), Resolution::new(320, 240));
        let mut frame = Frame::new(0, 0.0, RgbImage::new(320, 240));
        r.render(&mut frame, &reading(), None).unwrap();
        assert_eq!(*frame.image.get_pixel(4, 4), Rgb([63, 63, 63]));
        assert_eq!(*frame.image.get_pixel(5, 5), Rgb([255, 255, 0]));
        assert_eq!(*frame.image.get_pixel(300, 120), Rgb([0, 0, 0]));
    }
    #[test]
    fn logo_is_anchored_bottom_right() {
        let mut logo = RgbaImage::new(10, 5);
        for p in logo.pixels_mut() {
            *p = image::Rgba([0, 0, 255, 255]);
        }
        let r = OverlayRenderer::new(
            small_layout(),
            content(false),
            Some(logo.clone()),
            None,
            Resolution::new(320, 240),
        )
        .unwrap()
        .with_painter(BoxPainter);
        let mut frame = Frame::new(0, 0.0, RgbImage::new(320, 240));
        r.render(&mut frame, &reading(), None).unwrap();
        assert_eq!(*frame.image.get_pixel(319, 239), Rgb([0, 0, 255]));
        assert_eq!(*frame.image.get_pixel(310, 235), Rgb([0, 0, 255]));
        assert_eq!(*frame.image.get_pixel(309, 239), Rgb([0, 0, 0]));
        let big = RgbaImage::new(400, 10);
        let err = OverlayRenderer::new(
            small_layout(),
            content(false),
            Some(big),
            None,
            Resolution::new(320, 240),
        )
        .err()
        .unwrap();
        assert!(matches!(err, OverlayError::OverlayBounds { .. }));
    }
    #[test]
    fn graph_goes_top_right() {
        let graph = GraphLayer {
            width: 100,
            height: 60,
            style: PlotStyle::default(),
        };
        let r = OverlayRenderer::new(
            small_layout(),
            content(true),
            None,
            Some(graph),
            Resolution::new(320, 240),
        )
        .unwrap()
        .with_painter(BoxPainter);
        assert!(r.shows_graph());
        let times: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let track = RateTrack::compute(&times, &times, 1, 1);
        let trend = track.trend(20, 10.0).unwrap();
        let mut frame = Frame::new(0, 0.0, RgbImage::new(320, 240));
        r.render(&mut frame, &reading(), Some(&trend)).unwrap();
        let touched = (4..64)
            .flat_map(|y| (216..316).map(move |x| (x, y)))
            .filter(|&(x, y)| *frame.image.get_pixel(x, y) != Rgb([0, 0, 0]))
            .count();
        assert!(touched > 0);
        assert_eq!(*frame.image.get_pixel(318, 100), Rgb([0, 0, 0]));
    }
    #[test]
    fn frame_of_other_size_is_rejected() {
        let r = renderer(content(false), Resolution::new(320, 240));
        let mut frame = Frame::new(0, 0.0, RgbImage::new(321, 240));
        let err = r.render(&mut frame, &reading(), None).unwrap_err();
        assert!(matches!(err, OverlayError::OverlayBounds { .. }));
    }
}
