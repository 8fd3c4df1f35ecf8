use crate::measurement::series::MeasurementSeries;
/// Smoothed temperature rate `dT/dt` for every sample of a calibrated series.
#[derive(Clone, Debug)]
pub struct RateTrack {
    /// `(timestamp, rate)` pairs, one per sample.
    points: Vec<(f64, f64)>,
}
/// Slice of the rate track ending at the current sample, ready to be drawn.
#[derive(Clone, Copy, Debug)]
pub struct Trend<'a> {
    pub points: &'a [(f64, f64)],
    pub x_range: (f64, f64),
    pub current: (f64, f64),
}
impl RateTrack {
    /// Returns `None` when the series has no calibrated temperature.
    pub fn from_series(
        series: &MeasurementSeries,
        value_window: usize,
        rate_window: usize,
    ) -> Option<Self> {
        let temps = series
            .samples()
            .iter()
            .map(|s| series.calibrated(s))
            .collect::<Option<Vec<f64>>>()?;
        let times: Vec<f64> = series.samples().iter().map(|s| s.timestamp).collect();
        Some(Self::compute(&times, &temps, value_window, rate_window))
    }
    pub fn compute(times: &[f64], values: &[f64], value_window: usize, rate_window: usize) -> Self {
        let n = times.len().min(values.len());
        if n < 2 {
            return Self {
                points: times[..n].iter().map(|t| (*t, 0.0)).collect(),
            };
        }
        let smooth = rolling_mean(&values[..n], value_window);
        let raw = gradient(&smooth, &times[..n]);
        let rates = rolling_mean(&raw, rate_window);
        Self {
            points: times[..n].iter().copied().zip(rates).collect(),
        }
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn rate_at(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|p| p.1)
    }
    /// Points within `span` seconds before sample `index`, inclusive.
    pub fn trend(&self, index: usize, span: f64) -> Option<Trend<'_>> {
        let current = *self.points.get(index)?;
        let first = self.points[0].0;
        let start_time = current.0 - span;
        let start = self.points[..=index].partition_point(|p| p.0 < start_time);
        let x_range = if start_time <= first {
            (first, current.0.max(first + 0.1))
        } else {
            (start_time, current.0)
        };
        Some(Trend {
            points: &self.points[start..=index],
            x_range,
            current,
        })
    }
}
impl Trend<'_> {
    /// Value bounds with a 10% margin; flat data gets a fixed margin of 1.
    pub fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .points
            .iter()
            .map(|p| p.1)
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if lo > hi {
            return (-1.0, 1.0);
        }
        let margin = (hi - lo) * 0.1;
        let margin = if margin == 0.0 { 1.0 } else { margin };
        (lo - margin, hi + margin)
    }
}
/// Centred moving average; edges average over the samples that exist.
fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let n = values.len();
    (0..n)
        .map(|i| {
            let end = (i + window / 2).min(n - 1);
            let start = (i + window / 2 + 1).saturating_sub(window);
            let slice = &values[start..=end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
/// Second-order central differences inside, one-sided at the ends.
/// Zero time steps yield a rate of 0.
fn gradient(values: &[f64], times: &[f64]) -> Vec<f64> {
    let n = values.len();
    let slope = |a: usize, b: usize| {
        let dx = times[b] - times[a];
        if dx > 0.0 {
            (values[b] - values[a]) / dx
        } else {
            0.0
        }
    };
    (0..n)
        .map(|i| {
            if i == 0 {
                return slope(0, 1);
            }
            if i == n - 1 {
                return slope(n - 2, n - 1);
            }
            let hd = times[i] - times[i - 1];
            let hs = times[i + 1] - times[i];
            if hd > 0.0 && hs > 0.0 {
                (hd * hd * values[i + 1] + (hs * hs - hd * hd) * values[i]
                    - hs * hs * values[i - 1])
                    / (hd * hs * (hd + hs))
            } else {
                slope(i - 1, i + 1)
            }
        })
        .collect()
}
