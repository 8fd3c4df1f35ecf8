// src/pipeline.rs
//! The per-job state machine:
//! `Idle -> Loading -> Aligning -> Rendering -> Finalizing -> Done`,
//! with `Failed(kind)` reachable from every non-terminal state.
use std::path::Path;
use log::{debug, error, info, warn};
use tempfile::TempDir;
use crate::config::JobSpec;
use crate::drivers::backend::MediaBackend;
use crate::drivers::buffer::{CropRegion, Resolution};
use crate::drivers::sink::FrameSink;
use crate::drivers::source::FrameSource;
use crate::error::{AbortReason, OverlayError, Result};
use crate::export;
use crate::measurement::{MeasurementSeries, RateTrack};
use crate::render::{OverlayContent, OverlayRenderer, Reading, TextPainter};
use crate::sync::{Clamp, DataExhaustedPolicy, Synchronizer};
use crate::types::{CancelToken, JobEvent, NormalizationStatus, PipelineState, RunSummary};
const NORMALIZED_NAME: &str = "normalized.mkv";
const RENDERED_NAME: &str = "rendered.mkv";
/// Per-job temp directory, removed on every exit path.
struct Scratch(TempDir);
impl Scratch {
    fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("vta-overlay-").tempdir()?;
        debug!("Scratch directory {:?}", dir.path());
        Ok(Self(dir))
    }
    fn path(&self) -> &Path {
        self.0.path()
    }
}
impl Drop for Scratch {
    fn drop(&mut self) {
        debug!("Removing scratch directory {:?}", self.0.path());
    }
}
struct Loaded {
    series: MeasurementSeries,
    source: Box<dyn FrameSource>,
    normalization: NormalizationStatus,
}
struct Aligned {
    crop: Option<CropRegion>,
    output: Resolution,
    renderer: OverlayRenderer,
    rates: Option<RateTrack>,
}
#[derive(Debug, Default)]
struct RenderStats {
    written: u64,
    skipped: u64,
    data_exhausted: bool,
}
pub struct PipelineController<'a> {
    spec: &'a JobSpec,
    backend: &'a dyn MediaBackend,
    cancel: CancelToken,
    painter: Option<Box<dyn TextPainter + Send>>,
    notify: Box<dyn FnMut(JobEvent) + 'a>,
    state: PipelineState,
}
impl<'a> PipelineController<'a> {
    pub fn new(
        spec: &'a JobSpec,
        backend: &'a dyn MediaBackend,
        cancel: CancelToken,
        notify: impl FnMut(JobEvent) + 'a,
    ) -> Self {
        Self {
            spec,
            backend,
            cancel,
            painter: None,
            notify: Box::new(notify),
            state: PipelineState::Idle,
        }
    }
    /// Replaces the font-backed text painter.
    pub fn with_painter(mut self, painter: Box<dyn TextPainter + Send>) -> Self {
        self.painter = Some(painter);
        self
    }
    pub fn state(&self) -> PipelineState {
        self.state
    }
    fn enter(&mut self, state: PipelineState) {
        debug!("Pipeline {} -> {}", self.state, state);
        self.state = state;
        (self.notify)(JobEvent::State(state));
    }
    /// Runs the job to a terminal state.
    pub fn run(mut self) -> Result<RunSummary> {
        match self.execute() {
            Ok(summary) => {
                self.enter(PipelineState::Done);
                info!(
                    "Done: {} frames written, {} skipped -> {:?}",
                    summary.frames_written, summary.frames_skipped, summary.output_path
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Job failed while {}: {}", self.state, e);
                self.enter(PipelineState::Failed(e.kind()));
                Err(e)
            }
        }
    }
    fn execute(&mut self) -> Result<RunSummary> {
        self.spec.validate()?;
        self.enter(PipelineState::Loading);
        let scratch = Scratch::create()?;
        let loaded = self.load(scratch.path())?;
        self.enter(PipelineState::Aligning);
        let aligned = self.align(&loaded)?;
        self.enter(PipelineState::Rendering);
        let rendered = scratch.path().join(RENDERED_NAME);
        let Loaded {
            series,
            mut source,
            normalization,
        } = loaded;
        let stats = self.render(&series, &mut source, &aligned, &rendered)?;
        drop(source);
        self.enter(PipelineState::Finalizing);
        info!("Finalizing {:?} -> {:?}", rendered, self.spec.output_path);
        self.backend.finalize(&rendered, &self.spec.output_path)?;
        Ok(RunSummary {
            output_path: self.spec.output_path.clone(),
            frames_written: stats.written,
            frames_skipped: stats.skipped,
            samples_loaded: series.len(),
            resolution: aligned.output,
            normalization,
            data_exhausted: stats.data_exhausted,
        })
    }
    fn load(&mut self, scratch: &Path) -> Result<Loaded> {
        let spec = self.spec;
        let mut series = MeasurementSeries::load(&spec.measurement_path)?;
        series.apply_overrides(
            spec.operator.as_deref(),
            spec.sample_id.as_deref(),
            spec.calibration.enabled,
            spec.calibration.coefficients,
        )?;
        let meta = series.metadata();
        info!(
            "Operator: {}, sample: {}, calibration: {}",
            meta.operator,
            meta.sample_id,
            if meta.calibration_enabled { "on" } else { "off" }
        );
        if let Some(path) = &spec.export_csv {
            export::write_csv(&series, path)?;
        }
        let source = self
            .backend
            .open_source(&spec.video_path, spec.stream_index)?;
        let (source, normalization) = if source.has_timestamps() {
            info!("Video carries packet timestamps, normalization skipped");
            (source, NormalizationStatus::Skipped)
        } else {
            drop(source);
            let fixed = scratch.join(NORMALIZED_NAME);
            info!("Video has no usable timestamps, normalizing into {:?}", fixed);
            self.backend
                .normalize(&spec.video_path, spec.stream_index, &fixed)?;
            let source = self.backend.open_source(&fixed, None)?;
            if !source.has_timestamps() {
                return Err(OverlayError::PipelineAborted(AbortReason::Normalize(
                    "normalized video still has no timestamps".into(),
                )));
            }
            (source, NormalizationStatus::Performed)
        };
        Ok(Loaded {
            series,
            source,
            normalization,
        })
    }
    fn align(&mut self, loaded: &Loaded) -> Result<Aligned> {
        let spec = self.spec;
        let input = loaded.source.resolution();
        let output = match &spec.crop {
            Some(crop) => {
                crop.validate(input)?;
                info!("Cropping {} to {}", input, crop);
                crop.resolution()
            }
            None => input,
        };
        let overlay = &spec.overlay;
        let calibrated = loaded.series.metadata().calibration_enabled;
        let mut content = OverlayContent::from_metadata(loaded.series.metadata());
        content.show_rate = overlay.show_rate && calibrated;
        content.additional_text = overlay.additional_text.clone();
        if overlay.show_rate && !calibrated {
            warn!("Temperature rate needs calibration; the dT/dt line is disabled");
        }
        let mut graph = overlay.graph.layer(output);
        if graph.is_some() && !calibrated {
            warn!("Temperature rate needs calibration; the graph is disabled");
            graph = None;
        }
        let rates = if content.show_rate || graph.is_some() {
            RateTrack::from_series(
                &loaded.series,
                overlay.rate.value_window,
                overlay.rate.rate_window,
            )
        } else {
            None
        };
        let logo = overlay.logo.load()?;
        let mut renderer =
            OverlayRenderer::new(overlay.layout.clone(), content, logo, graph, output)?;
        if let Some(painter) = self.painter.take() {
            renderer = renderer.with_painter(painter);
        }
        Ok(Aligned {
            crop: spec.crop,
            output,
            renderer,
            rates,
        })
    }
    fn render(
        &mut self,
        series: &MeasurementSeries,
        source: &mut Box<dyn FrameSource>,
        aligned: &Aligned,
        rendered: &Path,
    ) -> Result<RenderStats> {
        let spec = self.spec;
        let trim = spec.trim_offset;
        source.seek(trim)?;
        let mut sink = self
            .backend
            .open_sink(rendered, aligned.output, source.frame_rate())?;
        let total_frames = source.total_frames();
        let mut sync = Synchronizer::new(series.samples());
        let mut stats = RenderStats::default();
        loop {
            if self.cancel.is_cancelled() {
                info!("Cancelled after {} frames", stats.written);
                return Err(OverlayError::PipelineAborted(AbortReason::Cancelled));
            }
            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(OverlayError::DecodeFrame { index, reason }) => {
                    warn!("Skipping frame {index}: {reason}");
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let effective_time = frame.pts_seconds + trim;
            if stats.written == 0 {
                info!(
                    "Trim {:.3}s, first frame {} at {:.3}s",
                    trim, frame.index, effective_time
                );
            }
            let resolved = sync.resolve(effective_time);
            if resolved.clamp == Clamp::High {
                if !stats.data_exhausted {
                    warn!(
                        "Measurement data ends at {:.3}s, video continues at {:.3}s (frame {})",
                        series.last().timestamp,
                        effective_time,
                        frame.index
                    );
                    stats.data_exhausted = true;
                }
                if spec.on_data_exhausted == DataExhaustedPolicy::StopVideo {
                    info!("Stopping output at frame {}", frame.index);
                    break;
                }
            }
            let rates = aligned.rates.as_ref();
            let reading = Reading {
                elapsed: effective_time,
                emf: resolved.sample.raw_emf,
                temperature: series.calibrated(&resolved.sample),
                rate: rates.and_then(|r| r.rate_at(resolved.index)),
            };
            let trend = rates.and_then(|r| r.trend(resolved.index, spec.overlay.graph.time_window));
            if let Some(crop) = &aligned.crop {
                frame.crop(crop);
            }
            aligned.renderer.render(&mut frame, &reading, trend.as_ref())?;
            sink.write_frame(&frame)?;
            stats.written += 1;
            (self.notify)(JobEvent::Progress {
                frame_index: frame.index,
                total_frames,
                effective_time,
                sample_index: resolved.index,
                clamp: resolved.clamp,
            });
        }
        if stats.written == 0 {
            return Err(OverlayError::PipelineAborted(AbortReason::OutputSink(
                "no frame was rendered".into(),
            )));
        }
        sink.finish()?;
        Ok(stats)
    }
}
