use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use image::{Rgb, RgbImage};
use crate::drivers::buffer::{Frame, Resolution};
use crate::error::{OverlayError, Result};
/// Anything that yields decoded frames in presentation order.
///
/// `next_frame` returning `Err(DecodeFrame)` consumes the bad frame; the
/// caller may keep pulling. `Ok(None)` is the end of the stream.
pub trait FrameSource {
    fn resolution(&self) -> Resolution;
    fn frame_rate(&self) -> f64;
    fn total_frames(&self) -> Option<u64>;
    /// `false` when the container carries no usable packet timestamps.
    fn has_timestamps(&self) -> bool;
    /// Skips everything before `offset_seconds`; only valid before the first frame.
    fn seek(&mut self, offset_seconds: f64) -> Result<()>;
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }
    fn total_frames(&self) -> Option<u64> {
        (**self).total_frames()
    }
    fn has_timestamps(&self) -> bool {
        (**self).has_timestamps()
    }
    fn seek(&mut self, offset_seconds: f64) -> Result<()> {
        (**self).seek(offset_seconds)
    }
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}
/// Seek offset and pts monotonicity shared by the source implementations.
#[derive(Debug, Default)]
pub struct Timeline {
    offset: f64,
    last: Option<f64>,
    started: bool,
}
/// What to do with the frame the decoder just produced.
#[derive(Debug, PartialEq)]
pub enum Admit {
    /// Rebased presentation time.
    Keep(f64),
    /// Before the seek offset.
    Discard,
}
impl Timeline {
    pub fn seek(&mut self, offset_seconds: f64) -> Result<()> {
        if self.started {
            return Err(OverlayError::Config(
                "seek is only allowed before the first frame".into(),
            ));
        }
        if !offset_seconds.is_finite() || offset_seconds < 0.0 {
            return Err(OverlayError::Config(format!(
                "trim offset must be a finite, non-negative number of seconds, got {offset_seconds}"
            )));
        }
        self.offset = offset_seconds;
        Ok(())
    }
    pub fn offset(&self) -> f64 {
        self.offset
    }
    pub fn admit(&mut self, index: u64, video_time: Option<f64>) -> Result<Admit> {
        self.started = true;
        let Some(t) = video_time.filter(|t| t.is_finite()) else {
            return Err(OverlayError::DecodeFrame {
                index,
                reason: "frame has no presentation timestamp".into(),
            });
        };
        if let Some(last) = self.last {
            if t <= last {
                return Err(OverlayError::DecodeFrame {
                    index,
                    reason: format!("timestamp {t:.6}s does not advance past {last:.6}s"),
                });
            }
        }
        self.last = Some(t);
        if t < self.offset {
            return Ok(Admit::Discard);
        }
        Ok(Admit::Keep(t - self.offset))
    }
}
/// In-memory source useful for tests and deterministic playback.
///
/// Every frame is a solid image; `None` in the pts list stands for a frame
/// the decoder could not timestamp.
pub struct ManualSource {
    queue: VecDeque<Option<f64>>,
    resolution: Resolution,
    frame_rate: f64,
    total: u64,
    next_index: u64,
    has_timestamps: bool,
    timeline: Timeline,
    closed: Arc<AtomicBool>,
}
impl ManualSource {
    pub fn new(
        resolution: Resolution,
        frame_rate: f64,
        pts: impl IntoIterator<Item = Option<f64>>,
    ) -> Self {
        let queue: VecDeque<Option<f64>> = pts.into_iter().collect();
        Self {
            total: queue.len() as u64,
            queue,
            resolution,
            frame_rate,
            next_index: 0,
            has_timestamps: true,
            timeline: Timeline::default(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
    /// `count` frames spaced evenly at `frame_rate`.
    pub fn constant_rate(resolution: Resolution, frame_rate: f64, count: u64) -> Self {
        Self::new(
            resolution,
            frame_rate,
            (0..count).map(|i| Some(i as f64 / frame_rate)),
        )
    }
    pub fn without_timestamps(mut self) -> Self {
        self.has_timestamps = false;
        self
    }
    /// Flag flipped when the source is dropped.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
    fn shade(index: u64) -> Rgb<u8> {
        let v = (index % 200) as u8 + 20;
        Rgb([v, v / 2, 255 - v])
    }
}
impl FrameSource for ManualSource {
    fn resolution(&self) -> Resolution {
        self.resolution
    }
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }
    fn total_frames(&self) -> Option<u64> {
        Some(self.total)
    }
    fn has_timestamps(&self) -> bool {
        self.has_timestamps
    }
    fn seek(&mut self, offset_seconds: f64) -> Result<()> {
        self.timeline.seek(offset_seconds)
    }
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(pts) = self.queue.pop_front() {
            let index = self.next_index;
            self.next_index += 1;
            match self.timeline.admit(index, pts)? {
                Admit::Discard => continue,
                Admit::Keep(t) => {
                    let image = RgbImage::from_pixel(
                        self.resolution.width,
                        self.resolution.height,
                        Self::shade(index),
                    );
                    return Ok(Some(Frame::new(index, t, image)));
                }
            }
        }
        Ok(None)
    }
}
impl Drop for ManualSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
