//! VPTAnalyzer `.tda` exports.
//!
//! Windows-1251 text. A header of `<TAG> value` lines is followed by
//! whitespace-separated `emf time` rows written with a decimal comma.
//! Time is stored in days.
use std::path::Path;
use encoding_rs::WINDOWS_1251;
use log::debug;
use crate::error::{OverlayError, Result};
use crate::measurement::calibration::Calibration;
use crate::measurement::series::{
    parse_decimal, MeasurementFormat, MeasurementSeries, RowCollector, Sample, SeriesMetadata,
};
const SECONDS_PER_DAY: f64 = 86_400.0;
#[derive(Default)]
struct Header {
    sample_id: Option<String>,
    operator: Option<String>,
    formula: Option<Vec<f64>>,
}
pub(crate) fn parse(path: &Path, bytes: &[u8]) -> Result<MeasurementSeries> {
    let (text, _, had_errors) = WINDOWS_1251.decode(bytes);
    if had_errors {
        debug!("{:?}: replaced undecodable bytes while reading cp1251", path);
    }
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r')).peekable();
    let mut header = Header::default();
    let mut header_lines = 0usize;
    while let Some(line) = lines.peek() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.next();
            continue;
        }
        if !trimmed.starts_with('<') {
            break;
        }
        parse_header_line(path, trimmed, &mut header)?;
        header_lines += 1;
        lines.next();
    }
    if header_lines == 0 {
        return Err(OverlayError::data_format(path, "missing header block"));
    }
    let sample_id = header
        .sample_id
        .ok_or_else(|| OverlayError::data_format(path, "header has no <NAME> entry"))?;
    let operator = header
        .operator
        .ok_or_else(|| OverlayError::data_format(path, "header has no <AUTOR> entry"))?;
    let calibration = match header.formula {
        Some(coeffs) => Some(Calibration::from_descending(&coeffs).ok_or_else(|| {
            OverlayError::data_format(
                path,
                format!("<FORMULE> must hold 1 to 4 coefficients, got {}", coeffs.len()),
            )
        })?),
        None => None,
    };
    let mut rows = RowCollector::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        rows.push(parse_row(line));
    }
    let samples = rows.finish(path)?;
    MeasurementSeries::new(
        samples,
        SeriesMetadata {
            operator,
            sample_id,
            format: MeasurementFormat::Tda,
            calibration_enabled: calibration.is_some(),
            calibration,
        },
    )
}
fn parse_header_line(path: &Path, line: &str, header: &mut Header) -> Result<()> {
    if let Some(rest) = line.strip_prefix("<NAME>") {
        header.sample_id = Some(rest.trim().to_string());
    } else if let Some(rest) = line.strip_prefix("<AUTOR>") {
        header.operator = Some(rest.trim().to_string());
    } else if let Some(rest) = line.strip_prefix("<FORMULE>") {
        let values = rest.split_once('=').map_or(rest, |(_, v)| v);
        let coeffs = values
            .split_whitespace()
            .map(parse_decimal)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| {
                OverlayError::data_format(path, format!("unreadable <FORMULE> line: {line}"))
            })?;
        header.formula = Some(coeffs);
    }
    Ok(())
}
fn parse_row(line: &str) -> Option<Sample> {
    let mut fields = line.split_whitespace();
    let emf = parse_decimal(fields.next()?)?;
    let days = parse_decimal(fields.next()?)?;
    Some(Sample::new(days * SECONDS_PER_DAY, emf))
}
