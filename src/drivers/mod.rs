// src/drivers/mod.rs
// 声明同级目录下的子模块文件
pub mod backend;
pub mod buffer;
pub mod ffmpeg;
pub mod plot;
pub mod sink;
pub mod source;
// 公开导出这些模块里的结构体，方便外部调用
pub use backend::{BackendLog, FfmpegBackend, ManualBackend, MediaBackend};
pub use buffer::{CropRegion, Frame, Resolution};
pub use ffmpeg::{FfmpegSink, FfmpegSource, FfmpegTools, VideoInfo};
pub use plot::{draw_trend, PlotArea, PlotStyle};
pub use sink::{FrameSink, MemorySink, Recorded};
pub use source::{FrameSource, ManualSource};
