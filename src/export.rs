// src/export.rs
use std::fs::File;
use std::io::Write;
use std::path::Path;
use csv::{Terminator, WriterBuilder};
use log::info;
use crate::error::Result;
use crate::measurement::MeasurementSeries;
/// Writes the loaded series as CSV.
///
/// The temperature column is present only when calibration is enabled.
pub fn write_csv(series: &MeasurementSeries, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let calibrated = series.metadata().calibration_enabled;
    write_series(series, calibrated, file)?;
    info!("Exported {} samples to {:?}", series.len(), path);
    Ok(())
}
fn write_series(series: &MeasurementSeries, calibrated: bool, out: impl Write) -> Result<()> {
    let mut w = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    if calibrated {
        w.write_record(["Time, s", "EMF, mV", "Temperature, °C"])?;
    } else {
        w.write_record(["Time, s", "EMF, mV"])?;
    }
    for sample in series.samples() {
        let mut record = vec![sample.timestamp.to_string(), sample.raw_emf.to_string()];
        if let Some(t) = series.calibrated(sample) {
            record.push(t.to_string());
        }
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{Calibration, MeasurementFormat, Sample, SeriesMetadata};
    fn series(calibration_enabled: bool) -> MeasurementSeries {
        let metadata = SeriesMetadata {
            operator: "op".into(),
            sample_id: "s".into(),
            format: MeasurementFormat::Vtaz0,
            calibration_enabled,
            calibration: Some(Calibration::new([1.0, 2.0, 0.0, 0.0])),
        };
        MeasurementSeries::new(
            vec![Sample::new(0.0, 0.5), Sample::new(0.25, 1.5)],
            metadata,
        )
        .unwrap()
    }
    #[test]
    fn calibrated_series_gets_a_temperature_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_csv(&series(true), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "\"Time, s\",\"EMF, mV\",\"Temperature, °C\"");
        assert_eq!(lines[1], "0,0.5,2");
        assert_eq!(lines[2], "0.25,1.5,4");
        assert_eq!(lines.len(), 3);
    }
    #[test]
    fn uncalibrated_series_has_two_columns() {
        let mut out = Vec::new();
        let s = series(false);
        write_series(&s, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "\"Time, s\",\"EMF, mV\"\n0,0.5\n0.25,1.5\n");
    }
}
