use std::fs;
use std::path::Path;
use log::{info, warn};
use crate::error::{OverlayError, Result};
use crate::measurement::calibration::Calibration;
use crate::measurement::{tda, vtaz};
/// ZIP local file header; every `.vtaz` container starts with it.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
/// One measurement row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Seconds on the data clock.
    pub timestamp: f64,
    /// Millivolts.
    pub raw_emf: f64,
    /// Uncalibrated temperature, `NaN` when the file carries none.
    pub raw_temp: f64,
}
impl Sample {
    pub fn new(timestamp: f64, raw_emf: f64) -> Self {
        Self {
            timestamp,
            raw_emf,
            raw_temp: f64::NAN,
        }
    }
    pub fn with_temp(timestamp: f64, raw_emf: f64, raw_temp: f64) -> Self {
        Self {
            timestamp,
            raw_emf,
            raw_temp,
        }
    }
    pub fn has_raw_temp(&self) -> bool {
        !self.raw_temp.is_nan()
    }
    /// The reading the calibration polynomial is evaluated on.
    pub fn calibration_input(&self) -> f64 {
        if self.has_raw_temp() {
            self.raw_temp
        } else {
            self.raw_emf
        }
    }
}
/// File variant, resolved once per load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasurementFormat {
    /// VPTAnalyzer text export.
    Tda,
    /// ZIP container, EMF calibrated directly.
    Vtaz0,
    /// ZIP container with thermocouple and cold-junction data.
    Vtaz1,
}
impl MeasurementFormat {
    /// Sniffs the container family; `.vtaz` versions are told apart after reading metadata.
    fn detect(path: &Path, bytes: &[u8]) -> Result<Container> {
        if bytes.starts_with(ZIP_MAGIC) {
            return Ok(Container::Zip);
        }
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        if first == Some(&b'<') {
            return Ok(Container::Text);
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("tda") => Ok(Container::Text),
            Some("vtaz") => Ok(Container::Zip),
            _ => Err(OverlayError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}
enum Container {
    Text,
    Zip,
}
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesMetadata {
    pub operator: String,
    pub sample_id: String,
    pub format: MeasurementFormat,
    pub calibration_enabled: bool,
    pub calibration: Option<Calibration>,
}
/// Ordered, immutable measurement samples plus their header.
#[derive(Clone, Debug)]
pub struct MeasurementSeries {
    samples: Vec<Sample>,
    metadata: SeriesMetadata,
}
impl MeasurementSeries {
    pub fn new(samples: Vec<Sample>, metadata: SeriesMetadata) -> Result<Self> {
        if samples.is_empty() {
            return Err(OverlayError::Config("measurement series is empty".into()));
        }
        if samples.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err(OverlayError::Config(
                "measurement timestamps must be non-decreasing".into(),
            ));
        }
        if metadata.calibration_enabled && metadata.calibration.is_none() {
            return Err(OverlayError::Config(
                "calibration enabled without coefficients".into(),
            ));
        }
        Ok(Self { samples, metadata })
    }
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| OverlayError::data_format(path, format!("cannot read file: {e}")))?;
        let series = match MeasurementFormat::detect(path, &bytes)? {
            Container::Text => tda::parse(path, &bytes)?,
            Container::Zip => vtaz::parse(path, &bytes)?,
        };
        info!(
            "Loaded {:?} measurement file {:?}: {} samples, {:.3}s..{:.3}s",
            series.metadata.format,
            path,
            series.len(),
            series.first().timestamp,
            series.last().timestamp
        );
        Ok(series)
    }
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
    pub fn metadata(&self) -> &SeriesMetadata {
        &self.metadata
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn first(&self) -> &Sample {
        &self.samples[0]
    }
    pub fn last(&self) -> &Sample {
        &self.samples[self.samples.len() - 1]
    }
    pub fn duration(&self) -> f64 {
        self.last().timestamp - self.first().timestamp
    }
    /// Physical value for a sample, computed on demand and only when calibration is on.
    pub fn calibrated(&self, sample: &Sample) -> Option<f64> {
        if !self.metadata.calibration_enabled {
            return None;
        }
        self.metadata
            .calibration
            .map(|cal| cal.apply(sample.calibration_input()))
    }
    /// Replaces header fields with job-level settings.
    pub fn apply_overrides(
        &mut self,
        operator: Option<&str>,
        sample_id: Option<&str>,
        calibration_enabled: Option<bool>,
        coeffs: Option<[f64; 4]>,
    ) -> Result<()> {
        if let Some(operator) = operator {
            self.metadata.operator = operator.to_string();
        }
        if let Some(sample_id) = sample_id {
            self.metadata.sample_id = sample_id.to_string();
        }
        if let Some(coeffs) = coeffs {
            self.metadata.calibration = Some(Calibration::new(coeffs));
        }
        if let Some(enabled) = calibration_enabled {
            self.metadata.calibration_enabled = enabled;
        }
        if self.metadata.calibration_enabled && self.metadata.calibration.is_none() {
            return Err(OverlayError::Config(
                "calibration enabled but neither the file nor the job provides coefficients"
                    .into(),
            ));
        }
        Ok(())
    }
}
/// Accumulates rows until the first malformed one; everything from there on is dropped.
pub(crate) struct RowCollector {
    samples: Vec<Sample>,
    truncated_at: Option<usize>,
    total_rows: usize,
}
impl RowCollector {
    pub(crate) fn new() -> Self {
        Self {
            samples: Vec::new(),
            truncated_at: None,
            total_rows: 0,
        }
    }
    pub(crate) fn push(&mut self, row: Option<Sample>) {
        self.total_rows += 1;
        if self.truncated_at.is_some() {
            return;
        }
        let accepted = row.filter(|s| {
            s.timestamp.is_finite()
                && s.raw_emf.is_finite()
                && self
                    .samples
                    .last()
                    .map_or(true, |prev| s.timestamp >= prev.timestamp)
        });
        match accepted {
            Some(sample) => self.samples.push(sample),
            None => self.truncated_at = Some(self.total_rows - 1),
        }
    }
    pub(crate) fn finish(self, path: &Path) -> Result<Vec<Sample>> {
        if let Some(row) = self.truncated_at {
            warn!(
                "{:?}: malformed row {} (of {}); keeping {} samples, dropping {} trailing rows",
                path,
                row + 1,
                self.total_rows,
                self.samples.len(),
                self.total_rows - self.samples.len()
            );
        }
        if self.samples.is_empty() {
            return Err(OverlayError::EmptyData {
                path: path.to_path_buf(),
            });
        }
        Ok(self.samples)
    }
}
/// Parses a number that may use a decimal comma.
pub(crate) fn parse_decimal(token: &str) -> Option<f64> {
    token.trim().replace(',', ".").parse::<f64>().ok()
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    fn metadata() -> SeriesMetadata {
        SeriesMetadata {
            operator: "op".into(),
            sample_id: "s1".into(),
            format: MeasurementFormat::Tda,
            calibration_enabled: false,
            calibration: None,
        }
    }
    #[test]
    fn collector_truncates_at_first_bad_row() {
        let mut rows = RowCollector::new();
        rows.push(Some(Sample::new(0.0, 1.0)));
        rows.push(Some(Sample::new(1.0, 1.0)));
        rows.push(None);
        rows.push(Some(Sample::new(2.0, 1.0)));
        let samples = rows.finish(Path::new("x.tda")).unwrap();
        assert_eq!(samples.len(), 2);
    }
    #[test]
    fn collector_treats_backwards_time_as_malformed() {
        let mut rows = RowCollector::new();
        rows.push(Some(Sample::new(5.0, 1.0)));
        rows.push(Some(Sample::new(5.0, 2.0)));
        rows.push(Some(Sample::new(4.0, 1.0)));
        let samples = rows.finish(Path::new("x.tda")).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].raw_emf, 2.0);
    }
    #[test]
    fn collector_without_rows_is_empty_data() {
        let mut rows = RowCollector::new();
        rows.push(None);
        let err = rows.finish(Path::new("x.tda")).unwrap_err();
        assert!(matches!(err, OverlayError::EmptyData { .. }));
    }
    #[test]
    fn calibration_is_applied_only_when_enabled() {
        let mut meta = metadata();
        meta.calibration = Some(Calibration::new([1.0, 2.0, 0.0, 0.0]));
        let mut series = MeasurementSeries::new(vec![Sample::new(0.0, 3.0)], meta).unwrap();
        let sample = series.samples()[0];
        assert_eq!(series.calibrated(&sample), None);
        series.apply_overrides(None, None, Some(true), None).unwrap();
        assert_eq!(series.calibrated(&sample), Some(7.0));
    }
    #[test]
    fn raw_temperature_takes_precedence_as_calibration_input() {
        let sample = Sample::with_temp(0.0, 3.0, 250.0);
        assert_eq!(sample.calibration_input(), 250.0);
        assert_eq!(Sample::new(0.0, 3.0).calibration_input(), 3.0);
    }
    #[test]
    fn enabling_calibration_without_coefficients_is_rejected() {
        let mut series = MeasurementSeries::new(vec![Sample::new(0.0, 3.0)], metadata()).unwrap();
        let err = series
            .apply_overrides(Some("Ivanov"), None, Some(true), None)
            .unwrap_err();
        assert!(matches!(err, OverlayError::Config(_)));
    }
    #[test]
    fn unknown_content_and_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.bin");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"\x00\x01garbage").unwrap();
        let err = MeasurementSeries::load(&path).unwrap_err();
        assert!(matches!(err, OverlayError::UnsupportedFormat { .. }));
    }
    #[test]
    fn missing_file_is_a_data_format_error() {
        let err = MeasurementSeries::load("/definitely/not/here.tda").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DataFormat);
    }
    #[test]
    fn decimal_comma_is_accepted() {
        assert_eq!(parse_decimal("1,25"), Some(1.25));
        assert_eq!(parse_decimal(" -0.5 "), Some(-0.5));
        assert_eq!(parse_decimal("abc"), None);
    }
}
