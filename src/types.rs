// src/types.rs
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::drivers::buffer::Resolution;
use crate::error::ErrorKind;
use crate::sync::Clamp;

// 任务状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Aligning,
    Rendering,
    Finalizing,
    Done,
    Failed(ErrorKind),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(kind) => write!(f, "Failed({kind})"),
            other => write!(f, "{other:?}"),
        }
    }
}

// 时间戳修复预处理是否执行
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalizationStatus {
    Skipped,
    Performed,
}

// 后台发给调用方的消息
#[derive(Clone, Debug)]
pub enum JobEvent {
    State(PipelineState),
    Progress {
        frame_index: u64,
        total_frames: Option<u64>,
        // 帧时间 (已加上 trim)
        effective_time: f64,
        sample_index: usize,
        clamp: Clamp,
    },
    Completed(RunSummary),
    Failed { kind: ErrorKind, message: String },
}

// 完成后的统计
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub frames_written: u64,
    pub frames_skipped: u64,
    pub samples_loaded: usize,
    pub resolution: Resolution,
    pub normalization: NormalizationStatus,
    /// The data ran out before the video did.
    pub data_exhausted: bool,
}

// 任务最终结果
#[derive(Clone, Debug)]
pub enum JobOutcome {
    Completed(RunSummary),
    Failed { kind: ErrorKind, message: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

/// Shared stop flag, checked once per frame by the worker.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_seen_by_every_clone() {
        let token = CancelToken::new();
        let worker = token.clone();
        assert!(!worker.is_cancelled());
        token.cancel();
        assert!(worker.is_cancelled());
    }

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed(ErrorKind::Config).is_terminal());
        assert!(!PipelineState::Rendering.is_terminal());
        assert_eq!(
            PipelineState::Failed(ErrorKind::VideoOpen).to_string(),
            "Failed(video open error)"
        );
    }
}
