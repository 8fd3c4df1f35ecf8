use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use crate::drivers::buffer::{Frame, Resolution};
use crate::error::{AbortReason, OverlayError, Result};
/// Consumer of rendered frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Flushes and closes the output; called once after the last frame.
    fn finish(&mut self) -> Result<()>;
}
impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }
    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
/// What a [`MemorySink`] saw, shared with the test that created it.
#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: Vec<RecordedFrame>,
    pub finished: bool,
}
#[derive(Clone, Debug)]
pub struct RecordedFrame {
    pub index: u64,
    pub pts_seconds: f64,
    pub resolution: Resolution,
}
/// Sink that keeps frame headers in memory; pixels are dropped.
pub struct MemorySink {
    expected: Resolution,
    recorded: Arc<Mutex<Recorded>>,
    closed: Arc<AtomicBool>,
}
impl MemorySink {
    pub fn new(expected: Resolution) -> Self {
        Self {
            expected,
            recorded: Arc::new(Mutex::new(Recorded::default())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
    pub fn recorded(&self) -> Arc<Mutex<Recorded>> {
        Arc::clone(&self.recorded)
    }
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}
impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.resolution() != self.expected {
            return Err(OverlayError::PipelineAborted(AbortReason::OutputSink(format!(
                "frame {} is {}, sink expects {}",
                frame.index,
                frame.resolution(),
                self.expected
            ))));
        }
        let mut recorded = self
            .recorded
            .lock()
            .map_err(|_| OverlayError::PipelineAborted(AbortReason::OutputSink("poisoned".into())))?;
        recorded.frames.push(RecordedFrame {
            index: frame.index,
            pts_seconds: frame.pts_seconds,
            resolution: frame.resolution(),
        });
        Ok(())
    }
    fn finish(&mut self) -> Result<()> {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.finished = true;
        }
        Ok(())
    }
}
impl Drop for MemorySink {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
