use burn::backend::autodiff::Autodiff;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::card::ReviewLog;
use crate::memory::{MemoryState, next_interval, next_memory_state, power_forgetting_curve};
use crate::parameters::Parameters;
use crate::rating::Rating;

pub type NdArrayAutodiff = Autodiff<burn::backend::NdArray>;
pub type Model = crate::model::Model<NdArrayAutodiff>;
pub type Tensor<const D: usize, K = burn::tensor::Float> =
    burn::tensor::Tensor<NdArrayAutodiff, D, K>;

pub(crate) trait TestHelper {
    fn assert_approx_eq<const N: usize>(&self, expected: [f32; N]);
}

impl TestHelper for [f32] {
    fn assert_approx_eq<const N: usize>(&self, expected: [f32; N]) {
        assert_eq!(self.len(), N, "{self:?} vs {expected:?}");
        for (actual, expected) in self.iter().zip(expected) {
            let tolerance = 1e-5 * expected.abs().max(1.0);
            assert!(
                (actual - expected).abs() <= tolerance,
                "{self:?} vs {expected:?}"
            );
        }
    }
}

impl<const M: usize> TestHelper for [f32; M] {
    fn assert_approx_eq<const N: usize>(&self, expected: [f32; N]) {
        self.as_slice().assert_approx_eq(expected)
    }
}

impl TestHelper for Vec<f32> {
    fn assert_approx_eq<const N: usize>(&self, expected: [f32; N]) {
        self.as_slice().assert_approx_eq(expected)
    }
}

pub(crate) fn init_logger() {
    let _ = fern::Dispatch::new()
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .apply();
}

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

/// Deterministic learner driven by a known parameter set.
///
/// Every card is reviewed on schedule (with a little jitter), and each
/// outcome is drawn from the recall probability the generating model assigns
/// at that moment.
pub(crate) fn simulate_logs(
    w: &Parameters,
    cards: usize,
    reviews_per_card: usize,
    seed: u64,
) -> Vec<ReviewLog> {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let mut logs = Vec::with_capacity(cards * reviews_per_card);
    for _ in 0..cards {
        let card_id = Uuid::new_v4();
        let mut now = start_time();
        let mut state: Option<MemoryState> = None;
        let mut elapsed_days = 0.0;
        for review_number in 1..=reviews_per_card {
            let rating = match state {
                None => match rng.random_range(0..100) {
                    0..20 => Rating::Again,
                    20..40 => Rating::Hard,
                    40..80 => Rating::Good,
                    _ => Rating::Easy,
                },
                Some(memory) => {
                    let r = power_forgetting_curve(elapsed_days, memory.stability);
                    if rng.random::<f32>() >= r {
                        Rating::Again
                    } else {
                        match rng.random_range(0..10) {
                            0 => Rating::Hard,
                            9 => Rating::Easy,
                            _ => Rating::Good,
                        }
                    }
                }
            };
            let next = next_memory_state(w, state, rating, elapsed_days)
                .unwrap_or_else(|e| panic!("simulated state left the valid range: {e}"));
            let interval = next_interval(next.stability, 0.9).clamp(1.0, 36500.0);
            logs.push(ReviewLog {
                id: Uuid::new_v4(),
                card_id,
                review_time: now,
                rating,
                elapsed_days,
                scheduled_days: interval,
                stability: next.stability,
                difficulty: next.difficulty,
                review_number: review_number as u32,
            });
            state = Some(next);
            let jitter = rng.random_range(0.5..1.5f32);
            elapsed_days = (interval * jitter).round().max(1.0);
            now += Duration::days(elapsed_days as i64);
        }
    }
    logs
}
