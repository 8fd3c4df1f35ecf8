// src/engine.rs
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use log::{error, info};
use crate::config::JobSpec;
use crate::drivers::backend::{FfmpegBackend, MediaBackend};
use crate::error::ErrorKind;
use crate::pipeline::PipelineController;
use crate::render::TextPainter;
use crate::types::{CancelToken, JobEvent, JobOutcome};

/// Caller's side of a running job.
pub struct JobHandle {
    events: Receiver<JobEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<JobOutcome>>,
}

impl JobHandle {
    /// Asks the worker to stop before its next frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Blocks for the next event; `None` once the worker is gone and the queue is drained.
    pub fn recv(&self) -> Option<JobEvent> {
        self.events.recv().ok()
    }

    pub fn try_recv(&self) -> Option<JobEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Joins the worker. Events still queued are dropped.
    pub fn wait(mut self) -> JobOutcome {
        let Some(worker) = self.worker.take() else {
            return JobOutcome::Failed {
                kind: ErrorKind::PipelineAborted,
                message: "job already joined".into(),
            };
        };
        match worker.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Worker thread panicked");
                JobOutcome::Failed {
                    kind: ErrorKind::PipelineAborted,
                    message: "worker thread panicked".into(),
                }
            }
        }
    }
}

/// Starts `spec` on a worker thread with the ffmpeg backend.
pub fn run(spec: JobSpec) -> JobHandle {
    let backend = FfmpegBackend::new(spec.tools.clone());
    spawn_with(spec, backend)
}

pub fn spawn_with<B: MediaBackend + 'static>(spec: JobSpec, backend: B) -> JobHandle {
    spawn_thread(spec, backend, None)
}

/// Same as [`spawn_with`] with a custom text painter.
pub fn spawn_with_painter<B, P>(spec: JobSpec, backend: B, painter: P) -> JobHandle
where
    B: MediaBackend + 'static,
    P: TextPainter + Send + 'static,
{
    spawn_thread(spec, backend, Some(Box::new(painter)))
}

fn spawn_thread<B: MediaBackend + 'static>(
    spec: JobSpec,
    backend: B,
    painter: Option<Box<dyn TextPainter + Send>>,
) -> JobHandle {
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let worker = thread::spawn(move || {
        info!(
            "Job started: {:?} + {:?} -> {:?}",
            spec.video_path, spec.measurement_path, spec.output_path
        );
        let notify = tx.clone();
        let mut controller = PipelineController::new(&spec, &backend, worker_cancel, move |e| {
            notify.send(e).ok();
        });
        if let Some(painter) = painter {
            controller = controller.with_painter(painter);
        }
        match controller.run() {
            Ok(summary) => {
                tx.send(JobEvent::Completed(summary.clone())).ok();
                JobOutcome::Completed(summary)
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                tx.send(JobEvent::Failed {
                    kind,
                    message: message.clone(),
                })
                .ok();
                JobOutcome::Failed { kind, message }
            }
        }
    });
    JobHandle {
        events: rx,
        cancel,
        worker: Some(worker),
    }
}
