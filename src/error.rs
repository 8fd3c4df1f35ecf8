use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::drivers::buffer::{CropRegion, Resolution};
/// Coarse error category reported to job callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DataFormat,
    UnsupportedFormat,
    VideoOpen,
    CropOutOfBounds,
    OverlayBounds,
    DecodeFrame,
    PipelineAborted,
    Render,
    Config,
    Io,
}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DataFormat => "data format error",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::VideoOpen => "video open error",
            ErrorKind::CropOutOfBounds => "crop out of bounds",
            ErrorKind::OverlayBounds => "overlay out of bounds",
            ErrorKind::DecodeFrame => "frame decode error",
            ErrorKind::PipelineAborted => "pipeline aborted",
            ErrorKind::Render => "render error",
            ErrorKind::Config => "configuration error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}
/// Why a video could not be opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoOpenReason {
    InvalidPath,
    NotAVideoFile(String),
    NoVideoStream,
    StreamNotFound(usize),
    NotAVideoStream { index: usize, codec_type: String },
    ToolUnavailable(String),
}
impl fmt::Display for VideoOpenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoOpenReason::InvalidPath => f.write_str("file does not exist"),
            VideoOpenReason::NotAVideoFile(detail) => {
                write!(f, "not a readable media container ({detail})")
            }
            VideoOpenReason::NoVideoStream => f.write_str("container has no video stream"),
            VideoOpenReason::StreamNotFound(index) => write!(f, "stream #{index} does not exist"),
            VideoOpenReason::NotAVideoStream { index, codec_type } => {
                write!(f, "stream #{index} is {codec_type}, not video")
            }
            VideoOpenReason::ToolUnavailable(detail) => write!(f, "cannot run probe tool: {detail}"),
        }
    }
}
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    OutputSink(String),
    Finalize(String),
    Normalize(String),
}
impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::OutputSink(detail) => write!(f, "output sink failed: {detail}"),
            AbortReason::Finalize(detail) => write!(f, "final conversion failed: {detail}"),
            AbortReason::Normalize(detail) => write!(f, "timestamp normalization failed: {detail}"),
        }
    }
}
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("measurement file {path:?} is malformed: {reason}")]
    DataFormat { path: PathBuf, reason: String },
    #[error("measurement file {path:?} contains no usable rows")]
    EmptyData { path: PathBuf },
    #[error("unsupported measurement file format: {path:?}")]
    UnsupportedFormat { path: PathBuf },
    #[error("cannot open video {path:?}: {reason}")]
    VideoOpen { path: PathBuf, reason: VideoOpenReason },
    #[error("crop region {crop} does not fit inside {resolution}")]
    CropOutOfBounds { crop: CropRegion, resolution: Resolution },
    #[error("overlay needs {required} but the frame is {available}")]
    OverlayBounds { required: Resolution, available: Resolution },
    #[error("frame {index} could not be decoded: {reason}")]
    DecodeFrame { index: u64, reason: String },
    #[error("pipeline aborted: {0}")]
    PipelineAborted(AbortReason),
    #[error("failed to render overlay: {0}")]
    Render(String),
    #[error("invalid job configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
impl OverlayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OverlayError::DataFormat { .. } | OverlayError::EmptyData { .. } => ErrorKind::DataFormat,
            OverlayError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            OverlayError::VideoOpen { .. } => ErrorKind::VideoOpen,
            OverlayError::CropOutOfBounds { .. } => ErrorKind::CropOutOfBounds,
            OverlayError::OverlayBounds { .. } => ErrorKind::OverlayBounds,
            OverlayError::DecodeFrame { .. } => ErrorKind::DecodeFrame,
            OverlayError::PipelineAborted(_) => ErrorKind::PipelineAborted,
            OverlayError::Render(_) => ErrorKind::Render,
            OverlayError::Config(_) => ErrorKind::Config,
            OverlayError::Io(_) => ErrorKind::Io,
        }
    }
    pub(crate) fn data_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        OverlayError::DataFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
    pub(crate) fn video_open(path: impl Into<PathBuf>, reason: VideoOpenReason) -> Self {
        OverlayError::VideoOpen {
            path: path.into(),
            reason,
        }
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for OverlayError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        OverlayError::Render(format!("{value:?}"))
    }
}
impl From<image::ImageError> for OverlayError {
    fn from(value: image::ImageError) -> Self {
        OverlayError::Render(value.to_string())
    }
}
impl From<csv::Error> for OverlayError {
    fn from(value: csv::Error) -> Self {
        OverlayError::Io(value.into())
    }
}
pub type Result<T> = std::result::Result<T, OverlayError>;
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn empty_data_reports_data_format_kind() {
        let err = OverlayError::EmptyData {
            path: PathBuf::from("run.tda"),
        };
        assert_eq!(err.kind(), ErrorKind::DataFormat);
        assert!(err.to_string().contains("no usable rows"));
    }
    #[test]
    fn video_open_reasons_are_distinguishable() {
        let not_video = OverlayError::video_open(
            "clip.mkv",
            VideoOpenReason::NotAVideoStream {
                index: 1,
                codec_type: "audio".into(),
            },
        );
        let missing = OverlayError::video_open("clip.mkv", VideoOpenReason::NoVideoStream);
        assert_eq!(not_video.kind(), ErrorKind::VideoOpen);
        assert!(not_video.to_string().contains("stream #1 is audio"));
        assert_ne!(not_video.to_string(), missing.to_string());
    }
}
