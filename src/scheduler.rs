use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ensure};
use uuid::Uuid;

use crate::card::{Card, CardState, ReviewLog, days_between};
use crate::error::{
    DueDateOverflowSnafu, MasteryRulesMismatchSnafu, MorphCardsError, Result, StaleReviewSnafu,
};
use crate::memory::{MemoryState, S_MAX, next_interval, next_memory_state};
use crate::parameters::Parameters;
use crate::rating::Rating;
use crate::vocabulary::{MasteryLevel, MasteryRules, VocabularyTracker};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Recall probability at which a card falls due.
    pub desired_retention: f32,
    pub min_interval_days: f32,
    pub max_interval_days: f32,
    /// Words must be strictly above this level to count as learned.
    pub mastery_threshold: MasteryLevel,
    /// Learned words needed before new example sentences are worth asking for.
    pub min_vocabulary: usize,
    pub mastery: MasteryRules,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            desired_retention: 0.9,
            min_interval_days: 1.0,
            max_interval_days: 36500.0,
            mastery_threshold: MasteryLevel::New,
            min_vocabulary: 5,
            mastery: MasteryRules::default(),
        }
    }
}

/// A possible outcome of the next review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub memory: MemoryState,
    pub interval: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextStates {
    pub again: ItemState,
    pub hard: ItemState,
    pub good: ItemState,
    pub easy: ItemState,
}

impl NextStates {
    pub fn get(&self, rating: Rating) -> &ItemState {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub card: Card,
    pub log: ReviewLog,
    /// Whether enough vocabulary is learned to ask for a new example sentence.
    pub vocabulary_sufficient: bool,
}

/// Turns a rating into the card's next memory state and due date.
#[derive(Debug, Clone)]
pub struct Scheduler {
    parameters: Parameters,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(parameters: Parameters, config: SchedulerConfig) -> Result<Self> {
        let valid = config.desired_retention > 0.0
            && config.desired_retention < 1.0
            && config.min_interval_days >= 1.0
            && config.max_interval_days >= config.min_interval_days
            && config.max_interval_days <= S_MAX;
        if !valid {
            return Err(MorphCardsError::InvalidParameters);
        }
        Ok(Self { parameters, config })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// An empty tracker using this scheduler's mastery rules.
    pub fn new_tracker(&self) -> VocabularyTracker {
        VocabularyTracker::new(self.config.mastery)
    }

    /// Swaps in a refitted parameter set.
    pub fn set_parameters(&mut self, parameters: Parameters) {
        info!("scheduler parameters updated: {:?}", parameters.as_slice());
        self.parameters = parameters;
    }

    /// Interval in days for a card with `stability`, within the configured bounds.
    pub fn interval(&self, stability: f32) -> f32 {
        next_interval(stability, self.config.desired_retention)
            .clamp(self.config.min_interval_days, self.config.max_interval_days)
    }

    /// The state each rating would lead to if the card were reviewed at `now`.
    pub fn preview(&self, card: &Card, now: DateTime<Utc>) -> Result<NextStates> {
        let elapsed_days = self.elapsed_days(card, now)?;
        let item_state = |rating| -> Result<ItemState> {
            let memory =
                next_memory_state(&self.parameters, card.state.memory(), rating, elapsed_days)?;
            Ok(ItemState {
                memory,
                interval: self.interval(memory.stability),
            })
        };
        Ok(NextStates {
            again: item_state(Rating::Again)?,
            hard: item_state(Rating::Hard)?,
            good: item_state(Rating::Good)?,
            easy: item_state(Rating::Easy)?,
        })
    }

    /// Applies one review without touching anything but the returned values.
    pub fn next_state(
        &self,
        card: &Card,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<(Card, ReviewLog)> {
        let elapsed_days = self.elapsed_days(card, now)?;
        let memory = next_memory_state(&self.parameters, card.state.memory(), rating, elapsed_days)?;
        let interval = self.interval(memory.stability);
        let due = TimeDelta::try_milliseconds((f64::from(interval) * 86_400_000.0).round() as i64)
            .and_then(|delta| now.checked_add_signed(delta))
            .context(DueDateOverflowSnafu {
                now,
                interval_days: interval,
            })?;

        let review_count = card.review_count + 1;
        let next = Card {
            state: CardState::Review(memory),
            due,
            last_reviewed: Some(now),
            review_count,
            ..card.clone()
        };
        let log = ReviewLog {
            id: Uuid::new_v4(),
            card_id: card.id,
            review_time: now,
            rating,
            elapsed_days,
            scheduled_days: interval,
            stability: memory.stability,
            difficulty: memory.difficulty,
            review_number: review_count,
        };
        debug!(
            "{} rated {rating}: stability {:.3}, difficulty {:.3}, next in {interval:.2} days",
            card.word, memory.stability, memory.difficulty
        );
        Ok((next, log))
    }

    /// Reviews `card` and records its word in `tracker`, which must follow the
    /// configured mastery rules.
    ///
    /// The tracker is only touched once the review itself has succeeded.
    pub fn review(
        &self,
        card: &Card,
        rating: Rating,
        now: DateTime<Utc>,
        tracker: &mut VocabularyTracker,
    ) -> Result<ReviewOutcome> {
        ensure!(
            tracker.rules() == &self.config.mastery,
            MasteryRulesMismatchSnafu
        );
        let (card, log) = self.next_state(card, rating, now)?;
        tracker.record(&card.word, now);
        let vocabulary_sufficient =
            tracker.is_sufficient(self.config.mastery_threshold, self.config.min_vocabulary);
        Ok(ReviewOutcome {
            card,
            log,
            vocabulary_sufficient,
        })
    }

    fn elapsed_days(&self, card: &Card, now: DateTime<Utc>) -> Result<f32> {
        let last_activity = card.last_activity();
        ensure!(
            now >= last_activity,
            StaleReviewSnafu { now, last_activity }
        );
        Ok(days_between(last_activity, now))
    }
}
