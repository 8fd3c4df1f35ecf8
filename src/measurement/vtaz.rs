//! `.vtaz` measurement containers.
//!
//! A ZIP archive holding `metadata.json` and `data_input.csv`. Version 0
//! may add a `calibration.json` with `c3..c0` applied to the EMF; version 1
//! carries the full thermocouple chain (`thermocouple.json`, `cjc.json`)
//! plus a linear or quadratic correction in `calibration.json`.
use std::io::{Cursor, Read};
use std::path::Path;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use zip::result::ZipError;
use zip::ZipArchive;
use crate::error::{OverlayError, Result};
use crate::measurement::calibration::{polyval_ascending, Calibration};
use crate::measurement::series::{
    parse_decimal, MeasurementFormat, MeasurementSeries, RowCollector, Sample, SeriesMetadata,
};
const METADATA: &str = "metadata.json";
const DATA: &str = "data_input.csv";
const CALIBRATION: &str = "calibration.json";
const THERMOCOUPLE: &str = "thermocouple.json";
const COLD_JUNCTION: &str = "cjc.json";
#[derive(Debug, Deserialize)]
struct Metadata {
    sample: String,
    operator: String,
    #[serde(default = "default_version")]
    vtaz_version: String,
}
fn default_version() -> String {
    "0.0".to_string()
}
impl Metadata {
    fn format(&self, path: &Path) -> Result<MeasurementFormat> {
        let major = self
            .vtaz_version
            .trim()
            .split('.')
            .next()
            .and_then(|m| m.parse::<u32>().ok())
            .ok_or_else(|| {
                OverlayError::data_format(
                    path,
                    format!("unreadable vtaz_version {:?}", self.vtaz_version),
                )
            })?;
        Ok(if major >= 1 {
            MeasurementFormat::Vtaz1
        } else {
            MeasurementFormat::Vtaz0
        })
    }
}
/// `calibration.json` of version 0 containers, highest degree first.
#[derive(Debug, Deserialize)]
struct LegacyCalibration {
    c3: f64,
    c2: f64,
    c1: f64,
    c0: f64,
}
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum CorrectionKind {
    #[default]
    Linear,
    Quadratic,
}
/// `calibration.json` of version 1 containers: a correction added to the thermocouple temperature.
#[derive(Debug, Deserialize)]
struct Correction {
    coefficients: Vec<f64>,
    #[serde(default)]
    calibration_type: CorrectionKind,
}
impl Correction {
    /// Folds `t + p(t)` into one cubic over the raw temperature.
    fn to_calibration(&self) -> Option<Calibration> {
        let mut c = self.coefficients.clone();
        if c.len() > 3 || c.iter().any(|v| !v.is_finite()) {
            return None;
        }
        c.resize(3, 0.0);
        let coeffs = match self.calibration_type {
            CorrectionKind::Linear => [c[1], 1.0 + c[0], 0.0, 0.0],
            CorrectionKind::Quadratic => [c[2], 1.0 + c[1], c[0], 0.0],
        };
        Some(Calibration::new(coeffs))
    }
}
#[derive(Debug, Deserialize)]
struct Thermocouple {
    thermocouple_coefficients: Vec<f64>,
}
#[derive(Debug, Default, Deserialize)]
struct ColdJunction {
    #[serde(default)]
    e_cold: f64,
}
struct Container<'a> {
    path: &'a Path,
    archive: ZipArchive<Cursor<&'a [u8]>>,
}
impl<'a> Container<'a> {
    fn open(path: &'a Path, bytes: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| OverlayError::data_format(path, format!("broken archive: {e}")))?;
        Ok(Self { path, archive })
    }
    fn has(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }
    fn read_text(&mut self, name: &str) -> Result<String> {
        let path = self.path;
        let mut entry = self.archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => OverlayError::data_format(path, format!("missing {name}")),
            other => OverlayError::data_format(path, format!("cannot open {name}: {other}")),
        })?;
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| OverlayError::data_format(path, format!("cannot read {name}: {e}")))?;
        Ok(text)
    }
    fn read_json<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        let text = self.read_text(name)?;
        serde_json::from_str(&text)
            .map_err(|e| OverlayError::data_format(self.path, format!("invalid {name}: {e}")))
    }
}
pub(crate) fn parse(path: &Path, bytes: &[u8]) -> Result<MeasurementSeries> {
    let mut container = Container::open(path, bytes)?;
    let metadata: Metadata = container.read_json(METADATA)?;
    let format = metadata.format(path)?;
    debug!("{:?}: vtaz_version {} -> {:?}", path, metadata.vtaz_version, format);
    let rows = read_rows(path, &container.read_text(DATA)?)?;
    let (samples, calibration) = match format {
        MeasurementFormat::Vtaz1 => version_one(&mut container, rows)?,
        _ => version_zero(&mut container, rows)?,
    };
    MeasurementSeries::new(
        samples,
        SeriesMetadata {
            operator: metadata.operator,
            sample_id: metadata.sample,
            format,
            calibration_enabled: calibration.is_some(),
            calibration,
        },
    )
}
fn version_zero(
    container: &mut Container<'_>,
    rows: Vec<Sample>,
) -> Result<(Vec<Sample>, Option<Calibration>)> {
    if !container.has(CALIBRATION) {
        return Ok((rows, None));
    }
    let legacy: LegacyCalibration = container.read_json(CALIBRATION)?;
    let calibration = Calibration::from_descending(&[legacy.c3, legacy.c2, legacy.c1, legacy.c0])
        .ok_or_else(|| {
            OverlayError::data_format(container.path, "calibration coefficients must be finite")
        })?;
    Ok((rows, Some(calibration)))
}
fn version_one(
    container: &mut Container<'_>,
    rows: Vec<Sample>,
) -> Result<(Vec<Sample>, Option<Calibration>)> {
    let correction: Correction = container.read_json(CALIBRATION)?;
    let thermocouple: Thermocouple = container.read_json(THERMOCOUPLE)?;
    let cold: ColdJunction = container.read_json(COLD_JUNCTION)?;
    let path = container.path;
    let calibration = correction.to_calibration().ok_or_else(|| {
        OverlayError::data_format(
            path,
            format!(
                "{:?} correction needs at most 3 finite coefficients, got {:?}",
                correction.calibration_type, correction.coefficients
            ),
        )
    })?;
    let tc = &thermocouple.thermocouple_coefficients;
    if tc.is_empty() || tc.iter().any(|c| !c.is_finite()) {
        return Err(OverlayError::data_format(
            path,
            "thermocouple coefficients must be a non-empty list of numbers",
        ));
    }
    let samples = rows
        .into_iter()
        .map(|s| {
            Sample::with_temp(
                s.timestamp,
                s.raw_emf,
                polyval_ascending(tc, s.raw_emf + cold.e_cold),
            )
        })
        .collect();
    Ok((samples, Some(calibration)))
}
/// Header line first, then `time,emf` rows; a trailing `;` on a row is tolerated.
fn read_rows(path: &Path, text: &str) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = RowCollector::new();
    for record in reader.records() {
        rows.push(record.ok().and_then(|r| parse_record(&r)));
    }
    rows.finish(path)
}
fn parse_record(record: &StringRecord) -> Option<Sample> {
    let field = |i: usize| record.get(i).map(|f| f.trim_end_matches(';').trim_end());
    let time = parse_decimal(field(0)?)?;
    let emf = parse_decimal(field(1)?)?;
    Some(Sample::new(time, emf))
}
