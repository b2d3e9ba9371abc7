//! Decoded waveform traces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a trace violates its invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    /// The independent axis is not strictly increasing.
    #[error("trace '{name}': axis not strictly increasing at sample {index} ({previous} -> {current})")]
    NonIncreasingAxis {
        name: String,
        index: usize,
        previous: f64,
        current: f64,
    },

    /// The independent axis holds NaN or infinity.
    #[error("trace '{name}': non-finite axis value at sample {index}")]
    NonFiniteAxis { name: String, index: usize },

    /// Two traces share a name.
    #[error("duplicate trace name '{name}'")]
    DuplicateName { name: String },
}

/// A single sample value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Real(f64),
    Complex { re: f64, im: f64 },
}

impl SampleValue {
    /// Real part (the value itself for real samples).
    pub fn re(&self) -> f64 {
        match *self {
            SampleValue::Real(v) => v,
            SampleValue::Complex { re, .. } => re,
        }
    }

    /// Imaginary part (zero for real samples).
    pub fn im(&self) -> f64 {
        match *self {
            SampleValue::Real(_) => 0.0,
            SampleValue::Complex { im, .. } => im,
        }
    }

    /// Magnitude.
    pub fn magnitude(&self) -> f64 {
        self.re().hypot(self.im())
    }

    /// Returns true for complex samples.
    pub fn is_complex(&self) -> bool {
        matches!(self, SampleValue::Complex { .. })
    }
}

/// One point of a trace. `time` is the independent axis (frequency for AC
/// analyses).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: SampleValue,
}

/// A named, axis-ordered signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TraceRepr")]
pub struct WaveformTrace {
    name: String,
    unit: String,
    samples: Vec<Sample>,
}

#[derive(Deserialize)]
struct TraceRepr {
    name: String,
    unit: String,
    samples: Vec<Sample>,
}

impl TryFrom<TraceRepr> for WaveformTrace {
    type Error = TraceError;

    fn try_from(repr: TraceRepr) -> Result<Self, Self::Error> {
        WaveformTrace::new(repr.name, repr.unit, repr.samples)
    }
}

impl WaveformTrace {
    /// Creates a trace, rejecting non-finite or non-increasing axis values.
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        samples: Vec<Sample>,
    ) -> Result<Self, TraceError> {
        let name = name.into();
        for (index, sample) in samples.iter().enumerate() {
            if !sample.time.is_finite() {
                return Err(TraceError::NonFiniteAxis { name, index });
            }
            if index > 0 {
                let previous = samples[index - 1].time;
                if sample.time <= previous {
                    return Err(TraceError::NonIncreasingAxis {
                        name,
                        index,
                        previous,
                        current: sample.time,
                    });
                }
            }
        }
        Ok(Self {
            name,
            unit: unit.into(),
            samples,
        })
    }

    /// Builds a real-valued trace from parallel axis and value slices.
    pub fn from_real(
        name: impl Into<String>,
        unit: impl Into<String>,
        axis: &[f64],
        values: &[f64],
    ) -> Result<Self, TraceError> {
        let samples = axis
            .iter()
            .zip(values)
            .map(|(&time, &value)| Sample {
                time,
                value: SampleValue::Real(value),
            })
            .collect();
        Self::new(name, unit, samples)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Axis values.
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.time)
    }

    /// Real parts of the values.
    pub fn real_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value.re())
    }

    /// Value at the last sample at or before `time`.
    pub fn value_at(&self, time: f64) -> Option<SampleValue> {
        let idx = self.samples.partition_point(|s| s.time <= time);
        idx.checked_sub(1).map(|i| self.samples[i].value)
    }
}

/// Checks that no two traces share a name.
pub fn ensure_unique_names(traces: &[WaveformTrace]) -> Result<(), TraceError> {
    let mut seen = std::collections::HashSet::new();
    for trace in traces {
        if !seen.insert(trace.name()) {
            return Err(TraceError::DuplicateName {
                name: trace.name().to_string(),
            });
        }
    }
    Ok(())
}
