use std::ops::Index;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{MorphCardsError, Result};
use crate::parameter_clipper::clip_parameters;

pub const PARAMETER_COUNT: usize = 17;

/// Starting point for new users and for the optimizer.
///
/// | index | role |
/// |-------|------|
/// | 0..=3 | initial stability for Again, Hard, Good, Easy |
/// | 4, 5  | initial difficulty (Again value, rating exponent) |
/// | 6     | difficulty change per rating step |
/// | 7..=9 | stability growth on recall (scale, saturation, retrievability gain) |
/// | 10..=13 | stability after a lapse (scale, difficulty, stability and retrievability exponents) |
/// | 14, 15 | hard penalty, easy bonus |
/// | 16    | minimum shrink of stability on a lapse, as a log factor |
pub static DEFAULT_PARAMETERS: [f32; PARAMETER_COUNT] = [
    0.4072, 1.1829, 3.1262, 15.4722, 7.2102, 0.5316, 1.0651, 1.616, 0.1544, 1.0824, 1.75, 0.0953,
    0.2975, 2.2042, 0.2407, 2.9466, 0.3306,
];

/// Immutable parameter set handed to every memory model computation.
///
/// Values are always within their valid ranges; constructing from raw
/// values clips them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Parameters([f32; PARAMETER_COUNT]);

impl Parameters {
    /// An empty slice selects the defaults.
    pub fn new(values: &[f32]) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self::default());
        }
        if values.len() != PARAMETER_COUNT || values.iter().any(|w| !w.is_finite()) {
            return Err(MorphCardsError::InvalidParameters);
        }
        let clipped = clip_parameters(values);
        if clipped != values {
            warn!("parameters clipped to valid ranges: {values:?} -> {clipped:?}");
        }
        Ok(Self::from_clipped(&clipped))
    }

    /// Callers guarantee `values` came out of `clip_parameters`.
    pub(crate) fn from_clipped(values: &[f32]) -> Self {
        let mut w = [0.0; PARAMETER_COUNT];
        w.copy_from_slice(values);
        Self(w)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn initial_stability(&self) -> [f32; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    pub(crate) fn with_initial_stability(&self, initial_stability: [f32; 4]) -> Self {
        let mut w = self.0;
        w[..4].copy_from_slice(&initial_stability);
        Self::from_clipped(&clip_parameters(&w))
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self(DEFAULT_PARAMETERS)
    }
}

impl Index<usize> for Parameters {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

impl TryFrom<Vec<f32>> for Parameters {
    type Error = MorphCardsError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(&values)
    }
}

impl From<Parameters> for Vec<f32> {
    fn from(parameters: Parameters) -> Self {
        parameters.0.to_vec()
    }
}
