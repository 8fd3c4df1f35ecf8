use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use log::debug;
use crate::drivers::buffer::Resolution;
use crate::drivers::ffmpeg::{self, FfmpegSink, FfmpegSource, FfmpegTools};
use crate::drivers::sink::{FrameSink, MemorySink, Recorded};
use crate::drivers::source::{FrameSource, ManualSource};
use crate::error::{AbortReason, OverlayError, Result, VideoOpenReason};
/// Everything the pipeline needs from the media layer.
pub trait MediaBackend: Send {
    fn open_source(&self, path: &Path, stream_index: Option<usize>)
        -> Result<Box<dyn FrameSource>>;
    /// Rewrites the chosen video stream of `input` into `output` so that every
    /// packet carries a timestamp. `output` holds that stream alone.
    fn normalize(&self, input: &Path, stream_index: Option<usize>, output: &Path) -> Result<()>;
    fn open_sink(
        &self,
        path: &Path,
        resolution: Resolution,
        frame_rate: f64,
    ) -> Result<Box<dyn FrameSink>>;
    /// Converts the rendered scratch file into the requested output.
    fn finalize(&self, rendered: &Path, target: &Path) -> Result<()>;
}
/// The production backend: `ffprobe` for metadata, `ffmpeg` for everything else.
#[derive(Clone, Debug, Default)]
pub struct FfmpegBackend {
    tools: FfmpegTools,
}
impl FfmpegBackend {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}
impl MediaBackend for FfmpegBackend {
    fn open_source(
        &self,
        path: &Path,
        stream_index: Option<usize>,
    ) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegSource::open(&self.tools, path, stream_index)?))
    }
    fn normalize(&self, input: &Path, stream_index: Option<usize>, output: &Path) -> Result<()> {
        ffmpeg::convert_stream(&self.tools, input, stream_index, output)
            .map_err(|e| OverlayError::PipelineAborted(AbortReason::Normalize(e)))
    }
    fn open_sink(
        &self,
        path: &Path,
        resolution: Resolution,
        frame_rate: f64,
    ) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegSink::create(
            &self.tools,
            path,
            resolution,
            frame_rate,
        )?))
    }
    fn finalize(&self, rendered: &Path, target: &Path) -> Result<()> {
        ffmpeg::convert(&self.tools, rendered, target)
            .map_err(|e| OverlayError::PipelineAborted(AbortReason::Finalize(e)))
    }
}
/// What a [`ManualBackend`] was asked to do.
#[derive(Debug, Default)]
pub struct BackendLog {
    /// Every opened source with its drop flag.
    pub opened: Vec<(PathBuf, Arc<AtomicBool>)>,
    /// Normalized outputs with the stream they were cut from.
    pub normalized: Vec<(PathBuf, Option<usize>)>,
    pub sinks: Vec<(PathBuf, Arc<Mutex<Recorded>>)>,
    pub finalized: Vec<(PathBuf, PathBuf)>,
}
/// Deterministic backend built on [`ManualSource`] and [`MemorySink`].
///
/// The sink and finalizer still touch the filesystem (empty placeholder
/// files) so scratch handling behaves as with real video.
#[derive(Clone)]
pub struct ManualBackend {
    resolution: Resolution,
    frame_rate: f64,
    pts: Vec<Option<f64>>,
    timestamps: bool,
    log: Arc<Mutex<BackendLog>>,
}
impl ManualBackend {
    pub fn new(resolution: Resolution, frame_rate: f64, pts: Vec<Option<f64>>) -> Self {
        Self {
            resolution,
            frame_rate,
            pts,
            timestamps: true,
            log: Arc::new(Mutex::new(BackendLog::default())),
        }
    }
    pub fn constant_rate(resolution: Resolution, frame_rate: f64, count: u64) -> Self {
        let pts = (0..count).map(|i| Some(i as f64 / frame_rate)).collect();
        Self::new(resolution, frame_rate, pts)
    }
    /// Sources report no packet timestamps until the file has been normalized.
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }
    pub fn log(&self) -> Arc<Mutex<BackendLog>> {
        Arc::clone(&self.log)
    }
    fn with_log<T>(&self, f: impl FnOnce(&mut BackendLog) -> T) -> Result<T> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| OverlayError::Render("backend log poisoned".into()))?;
        Ok(f(&mut log))
    }
}
impl MediaBackend for ManualBackend {
    fn open_source(
        &self,
        path: &Path,
        _stream_index: Option<usize>,
    ) -> Result<Box<dyn FrameSource>> {
        if !path.is_file() {
            return Err(OverlayError::video_open(path, VideoOpenReason::InvalidPath));
        }
        let normalized = self.with_log(|log| log.normalized.iter().any(|(p, _)| p == path))?;
        let mut source = ManualSource::new(self.resolution, self.frame_rate, self.pts.clone());
        if !self.timestamps && !normalized {
            source = source.without_timestamps();
        }
        let closed = source.closed_flag();
        self.with_log(|log| log.opened.push((path.to_path_buf(), closed)))?;
        Ok(Box::new(source))
    }
    fn normalize(&self, input: &Path, stream_index: Option<usize>, output: &Path) -> Result<()> {
        fs::copy(input, output)
            .map_err(|e| OverlayError::PipelineAborted(AbortReason::Normalize(e.to_string())))?;
        self.with_log(|log| log.normalized.push((output.to_path_buf(), stream_index)))
    }
    fn open_sink(
        &self,
        path: &Path,
        resolution: Resolution,
        _frame_rate: f64,
    ) -> Result<Box<dyn FrameSink>> {
        fs::File::create(path)?;
        let sink = MemorySink::new(resolution);
        let recorded = sink.recorded();
        self.with_log(|log| log.sinks.push((path.to_path_buf(), recorded)))?;
        Ok(Box::new(sink))
    }
    fn finalize(&self, rendered: &Path, target: &Path) -> Result<()> {
        fs::copy(rendered, target)
            .map_err(|e| OverlayError::PipelineAborted(AbortReason::Finalize(e.to_string())))?;
        debug!("Finalized {:?} -> {:?}", rendered, target);
        self.with_log(|log| {
            log.finalized
                .push((rendered.to_path_buf(), target.to_path_buf()))
        })
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    #[test]
    fn manual_backend_tracks_sources_and_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.avi");
        fs::write(&clip, b"x").unwrap();
        let backend =
            ManualBackend::constant_rate(Resolution::new(4, 4), 10.0, 5).without_timestamps();
        let source = backend.open_source(&clip, None).unwrap();
        assert!(!source.has_timestamps());
        let fixed = dir.path().join("fixed.mp4");
        backend.normalize(&clip, Some(1), &fixed).unwrap();
        let reopened = backend.open_source(&fixed, None).unwrap();
        assert!(reopened.has_timestamps());
        drop(source);
        let log = backend.log();
        let log = log.lock().unwrap();
        assert_eq!(log.opened.len(), 2);
        assert!(log.opened[0].1.load(Ordering::SeqCst));
        assert!(!log.opened[1].1.load(Ordering::SeqCst));
        assert_eq!(log.normalized, vec![(fixed.clone(), Some(1))]);
    }
    #[test]
    fn missing_video_is_rejected() {
        let backend = ManualBackend::constant_rate(Resolution::new(4, 4), 10.0, 5);
        let err = backend.open_source(Path::new("/no/clip.mp4"), None).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::VideoOpen);
    }
}
