use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::error::MorphCardsError;

/// Outcome of a single review, as reported by the learner.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// Whether the review counts as a successful recall.
    pub fn is_recall(self) -> bool {
        self != Rating::Again
    }

    pub(crate) fn as_f32(self) -> f32 {
        u32::from(self) as f32
    }
}

impl TryFrom<u32> for Rating {
    type Error = MorphCardsError;

    fn try_from(rating: u32) -> Result<Self, Self::Error> {
        match rating {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            _ => Err(MorphCardsError::InvalidRating { rating }),
        }
    }
}

impl From<Rating> for u32 {
    fn from(rating: Rating) -> Self {
        rating as u32
    }
}
