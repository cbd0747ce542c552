//! Scalar memory model: retrievability, state transitions and intervals.
//!
//! The tensor model in `model.rs` implements the same formulas for training;
//! the two are kept in lockstep by `model::tests::forward_matches_scalar_model`.

use serde::{Deserialize, Serialize};

use crate::error::{MorphCardsError, Result};
use crate::parameters::Parameters;
use crate::rating::Rating;

pub(crate) const S_MIN: f32 = 0.01;
pub(crate) const S_MAX: f32 = 36500.0;
pub(crate) const D_MIN: f32 = 1.0;
pub(crate) const D_MAX: f32 = 10.0;

/// Exponent of the forgetting curve.
pub const DECAY: f32 = -0.5;
/// `0.9^(1 / DECAY) - 1`, which makes retrievability exactly 0.9 when the
/// elapsed time equals the stability.
pub const FACTOR: f32 = 19.0 / 81.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    /// Days until recall probability decays to 90%.
    pub stability: f32,
    /// Intrinsic hardness in `[1, 10]`.
    pub difficulty: f32,
}

impl MemoryState {
    /// State after the very first review of an item.
    pub fn initial(w: &Parameters, rating: Rating) -> Result<Self> {
        MemoryState {
            stability: init_s(w, rating),
            difficulty: init_d(w, rating),
        }
        .validated()
    }

    /// State after reviewing an item `elapsed_days` after its previous review.
    pub fn next(&self, w: &Parameters, rating: Rating, elapsed_days: f32) -> Result<Self> {
        let MemoryState {
            stability: s,
            difficulty: d,
        } = self.validated()?;
        let r = power_forgetting_curve(elapsed_days.max(0.0), s);
        let stability = match rating {
            Rating::Again => stability_after_failure(w, s, r, d),
            _ => stability_after_success(w, s, r, d, rating),
        };
        MemoryState {
            stability,
            difficulty: next_d(w, d, rating),
        }
        .validated()
    }

    /// Probability of recall `elapsed_days` after the last review.
    pub fn retrievability(&self, elapsed_days: f32) -> f32 {
        power_forgetting_curve(elapsed_days.max(0.0), self.stability)
    }

    fn validated(self) -> Result<Self> {
        let valid = self.stability.is_finite()
            && self.difficulty.is_finite()
            && (S_MIN..=S_MAX).contains(&self.stability)
            && (D_MIN..=D_MAX).contains(&self.difficulty);
        if valid {
            Ok(self)
        } else {
            Err(MorphCardsError::InvalidState {
                stability: self.stability,
                difficulty: self.difficulty,
            })
        }
    }
}

/// Applies one review to an optional previous state.
pub fn next_memory_state(
    w: &Parameters,
    state: Option<MemoryState>,
    rating: Rating,
    elapsed_days: f32,
) -> Result<MemoryState> {
    match state {
        None => MemoryState::initial(w, rating),
        Some(state) => state.next(w, rating, elapsed_days),
    }
}

pub fn power_forgetting_curve(t: f32, s: f32) -> f32 {
    (t / s).mul_add(FACTOR, 1.0).powf(DECAY)
}

/// Days until retrievability falls to `desired_retention`; the exact inverse
/// of [`power_forgetting_curve`].
pub fn next_interval(stability: f32, desired_retention: f32) -> f32 {
    stability / FACTOR * (desired_retention.powf(1.0 / DECAY) - 1.0)
}

fn init_s(w: &Parameters, rating: Rating) -> f32 {
    w[rating as usize - 1]
}

fn init_d(w: &Parameters, rating: Rating) -> f32 {
    (w[4] - (w[5] * (rating.as_f32() - 1.0)).exp() + 1.0).clamp(D_MIN, D_MAX)
}

fn linear_damping(delta_d: f32, old_d: f32) -> f32 {
    (10.0 - old_d) / 9.0 * delta_d
}

fn next_d(w: &Parameters, d: f32, rating: Rating) -> f32 {
    let delta_d = -w[6] * (rating.as_f32() - 3.0);
    (d + linear_damping(delta_d, d)).clamp(D_MIN, D_MAX)
}

fn stability_after_success(w: &Parameters, s: f32, r: f32, d: f32, rating: Rating) -> f32 {
    let hard_penalty = if rating == Rating::Hard { w[14] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[15] } else { 1.0 };
    (s * (f32::exp(w[7])
        * (11.0 - d)
        * s.powf(-w[8])
        * (f32::exp((1.0 - r) * w[9]) - 1.0)
        * hard_penalty)
        .mul_add(easy_bonus, 1.0))
    .clamp(S_MIN, S_MAX)
}

/// Strictly below `s` for any `s` above `S_MIN`. At the floor itself the
/// clamp holds stability at `S_MIN`.
fn stability_after_failure(w: &Parameters, s: f32, r: f32, d: f32) -> f32 {
    let new_s_max = s / w[16].exp();
    let new_s =
        (w[10] * d.powf(-w[11]) * ((s + 1.0).powf(w[12]) - 1.0) * f32::exp((1.0 - r) * w[13]))
            .min(new_s_max);
    new_s.clamp(S_MIN, S_MAX)
}
