use serde::{Deserialize, Serialize};

use crate::error::MeshError;

pub const MAX_RAMP_ENTRIES: usize = 500;

/// A single stop of a color ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Height at which the color applies.
    pub threshold: f64,
    /// Linear RGB in `[0, 1]`.
    pub rgb: [f32; 3],
}

/// Height-keyed color ramp with non-decreasing thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
}

impl Serialize for ColorRamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.stops.iter().map(|s| (s.threshold, s.rgb)))
    }
}

impl<'de> Deserialize<'de> for ColorRamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stops = Vec::<(f64, [f32; 3])>::deserialize(deserializer)?;
        ColorRamp::from_pairs(&stops).map_err(serde::de::Error::custom)
    }
}

impl Default for ColorRamp {
    /// Blue lowlands through green and brown to white peaks, over `[0, 1]`.
    fn default() -> Self {
        Self {
            stops: vec![
                ColorStop { threshold: 0.0, rgb: [0.05, 0.2, 0.6] },
                ColorStop { threshold: 0.3, rgb: [0.2, 0.6, 0.25] },
                ColorStop { threshold: 0.7, rgb: [0.55, 0.4, 0.25] },
                ColorStop { threshold: 1.0, rgb: [1.0, 1.0, 1.0] },
            ],
        }
    }
}

impl ColorRamp {
    pub fn new(stops: Vec<ColorStop>) -> Result<Self, MeshError> {
        if stops.is_empty() || stops.len() > MAX_RAMP_ENTRIES {
            return Err(MeshError::RampSize {
                count: stops.len(),
                max: MAX_RAMP_ENTRIES,
            });
        }
        for i in 1..stops.len() {
            if !(stops[i].threshold >= stops[i - 1].threshold) {
                return Err(MeshError::RampOrder(i));
            }
        }
        Ok(Self { stops })
    }

    /// Builds a ramp from `(threshold, rgb)` pairs as handed over by file readers.
    pub fn from_pairs(pairs: &[(f64, [f32; 3])]) -> Result<Self, MeshError> {
        Self::new(
            pairs
                .iter()
                .map(|&(threshold, rgb)| ColorStop { threshold, rgb })
                .collect(),
        )
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Heights below the first stop or above the last one clamp to those stops.
    pub fn sample(&self, height: f64) -> [f32; 3] {
        let first = &self.stops[0];
        let last = &self.stops[self.stops.len() - 1];
        if height <= first.threshold {
            return first.rgb;
        }
        if height >= last.threshold {
            return last.rgb;
        }
        let upper = self.stops.partition_point(|s| s.threshold <= height);
        let (a, b) = (&self.stops[upper - 1], &self.stops[upper]);
        let span = b.threshold - a.threshold;
        let t = if span > 0.0 {
            ((height - a.threshold) / span) as f32
        } else {
            0.0
        };
        [
            a.rgb[0] + (b.rgb[0] - a.rgb[0]) * t,
            a.rgb[1] + (b.rgb[1] - a.rgb[1]) * t,
            a.rgb[2] + (b.rgb[2] - a.rgb[2]) * t,
        ]
    }

    /// Same ramp stretched onto `[min, max]`, used when the default ramp is
    /// applied to a surface of arbitrary height range.
    pub fn rescaled(&self, min: f64, max: f64) -> ColorRamp {
        let (lo, hi) = (self.stops[0].threshold, self.stops[self.stops.len() - 1].threshold);
        let span = hi - lo;
        let stops = self
            .stops
            .iter()
            .map(|s| ColorStop {
                threshold: if span > 0.0 {
                    min + (s.threshold - lo) / span * (max - min)
                } else {
                    min
                },
                rgb: s.rgb,
            })
            .collect();
        ColorRamp { stops }
    }
}
