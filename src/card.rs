use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::MemoryState;
use crate::rating::Rating;

/// Learning state of a card. A card that was never reviewed has no memory
/// state at all rather than placeholder zeros.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CardState {
    New,
    Review(MemoryState),
}

impl CardState {
    pub fn memory(&self) -> Option<MemoryState> {
        match self {
            CardState::New => None,
            CardState::Review(memory) => Some(*memory),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub word: String,
    /// Sentence currently shown; may be a generated variation.
    pub sentence: String,
    /// Sentence the card was created with.
    pub original_sentence: String,
    pub state: CardState,
    pub due: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub review_count: u32,
}

impl Card {
    /// A fresh card, reviewable immediately.
    pub fn new(word: impl Into<String>, sentence: impl Into<String>, now: DateTime<Utc>) -> Self {
        let sentence = sentence.into();
        Self {
            id: Uuid::new_v4(),
            word: word.into(),
            original_sentence: sentence.clone(),
            sentence,
            state: CardState::New,
            due: now,
            created_at: now,
            last_reviewed: None,
            review_count: 0,
        }
    }

    /// Most recent moment the card's memory state refers to.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_reviewed.unwrap_or(self.created_at)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due <= now
    }

    /// Modeled recall probability at `now`; `None` before the first review.
    pub fn retrievability(&self, now: DateTime<Utc>) -> Option<f32> {
        self.state
            .memory()
            .map(|memory| memory.retrievability(days_between(self.last_activity(), now)))
    }
}

/// Immutable record of one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub id: Uuid,
    pub card_id: Uuid,
    pub review_time: DateTime<Utc>,
    pub rating: Rating,
    /// Days since the card's previous review, or since creation for the first.
    pub elapsed_days: f32,
    /// Interval chosen by this review.
    pub scheduled_days: f32,
    pub stability: f32,
    pub difficulty: f32,
    /// The card's review count after this review; 1 for a first review.
    pub review_number: u32,
}

pub(crate) fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f32 {
    (to - from).num_milliseconds() as f32 / 86_400_000.0
}
