// src/sync.rs
use serde::{Deserialize, Serialize};
use crate::measurement::Sample;
/// Which side of the data range a lookup fell on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clamp {
    None,
    /// Before the first sample.
    Low,
    /// Past the last sample: the data ran out before the video.
    High,
}
/// What happens to frames once the data is exhausted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataExhaustedPolicy {
    /// Keep showing the last sample.
    #[default]
    Hold,
    /// End the video at the first frame past the data.
    StopVideo,
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub index: usize,
    pub sample: Sample,
    pub clamp: Clamp,
}
/// Forward-only cursor over a series.
///
/// Query times must not decrease; the cursor never moves back, so a whole
/// video costs O(frames + samples) probes.
pub struct Synchronizer<'a> {
    samples: &'a [Sample],
    cursor: usize,
    probes: u64,
}
impl<'a> Synchronizer<'a> {
    /// `samples` must be non-empty and sorted by timestamp.
    pub fn new(samples: &'a [Sample]) -> Self {
        Self {
            samples,
            cursor: 0,
            probes: 0,
        }
    }
    pub fn resolve(&mut self, effective_time: f64) -> Resolved {
        let last = self.samples.len() - 1;
        while self.cursor < last {
            self.probes += 1;
            if self.samples[self.cursor + 1].timestamp <= effective_time {
                self.cursor += 1;
            } else {
                break;
            }
        }
        let sample = self.samples[self.cursor];
        let clamp = if effective_time < self.samples[0].timestamp {
            Clamp::Low
        } else if effective_time > self.samples[last].timestamp {
            Clamp::High
        } else {
            Clamp::None
        };
        Resolved {
            index: self.cursor,
            sample,
            clamp,
        }
    }
    pub fn cursor(&self) -> usize {
        self.cursor
    }
    /// Comparisons made so far.
    pub fn probes(&self) -> u64 {
        self.probes
    }
}
