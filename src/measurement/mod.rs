// src/measurement/mod.rs
// 测量数据：文件解析、标定多项式、升温速率
pub mod calibration;
pub mod rate;
pub mod series;
mod tda;
mod vtaz;
pub use calibration::Calibration;
pub use rate::{RateTrack, Trend};
pub use series::{MeasurementFormat, MeasurementSeries, Sample, SeriesMetadata};
