use chrono::{DateTime, Utc};
use snafu::Snafu;
use uuid::Uuid;

use crate::parameters::Parameters;

#[derive(Snafu, Debug, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum MorphCardsError {
    #[snafu(display("rating {rating} is outside 1..=4"))]
    InvalidRating { rating: u32 },
    #[snafu(display("invalid memory state: stability {stability}, difficulty {difficulty}"))]
    InvalidState { stability: f32, difficulty: f32 },
    #[snafu(display("review at {now} precedes last activity at {last_activity}"))]
    StaleReview {
        now: DateTime<Utc>,
        last_activity: DateTime<Utc>,
    },
    #[snafu(display("{reviews} usable reviews, at least {required} required"))]
    InsufficientData { reviews: usize, required: usize },
    #[snafu(display("loss did not settle within {iterations} iterations (best {loss})"))]
    NonConvergent {
        best: Parameters,
        loss: f32,
        iterations: usize,
    },
    InvalidParameters,
    #[snafu(display("due date {interval_days} days after {now} is out of range"))]
    DueDateOverflow {
        now: DateTime<Utc>,
        interval_days: f32,
    },
    #[snafu(display("vocabulary tracker uses different mastery rules than the scheduler"))]
    MasteryRulesMismatch,
    Interrupted,
    #[snafu(display("card {id} not found"))]
    CardNotFound { id: Uuid },
    #[snafu(display("storage: {message}"))]
    Storage { message: String },
}

pub type Result<T, E = MorphCardsError> = std::result::Result<T, E>;
