#![allow(clippy::single_range_in_vec_init)]

mod batch_shuffle;
mod card;
mod cosine_annealing;
mod dataset;
mod deck;
mod error;
mod evaluation;
mod memory;
mod model;
mod parameter_clipper;
mod parameters;
mod pre_training;
mod rating;
mod scheduler;
mod sentence;
mod storage;
#[cfg(test)]
mod test_helpers;
mod training;
mod vocabulary;

pub use card::{Card, CardState, ReviewLog};
pub use dataset::{ItemReview, ReviewItem, items_from_logs};
pub use deck::{Deck, DeckStats};
pub use error::{MorphCardsError, Result};
pub use evaluation::{ModelEvaluation, evaluate};
pub use memory::{DECAY, FACTOR, MemoryState, next_interval, next_memory_state, power_forgetting_curve};
pub use parameters::{DEFAULT_PARAMETERS, PARAMETER_COUNT, Parameters};
pub use rating::Rating;
pub use scheduler::{ItemState, NextStates, ReviewOutcome, Scheduler, SchedulerConfig};
pub use sentence::{NoSentences, SentenceGenerator};
pub use storage::{LogFilter, MemoryStorage, Storage};
pub use training::{FitProgress, Optimizer, OptimizerConfig};
pub use vocabulary::{
    MasteryLevel, MasteryRules, VocabularyEntry, VocabularyStats, VocabularyTracker, normalize_word,
};
