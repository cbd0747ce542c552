//! Per-word review bookkeeping.
//!
//! Every review of a card counts towards its word. Mastery is derived from
//! two counters only, how often the word was reviewed and how long it has
//! been retained, so it can never go down as more reviews arrive.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum MasteryLevel {
    #[default]
    New,
    Seen,
    Learning,
    Familiar,
    Mastered,
}

/// Thresholds for each mastery level. A level is reached when both its review
/// count and its retention span (days between first and last review) are met.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryRules {
    pub seen_reviews: u32,
    pub learning_reviews: u32,
    pub familiar_reviews: u32,
    pub familiar_span_days: f32,
    pub mastered_reviews: u32,
    pub mastered_span_days: f32,
}

impl Default for MasteryRules {
    fn default() -> Self {
        Self {
            seen_reviews: 1,
            learning_reviews: 3,
            familiar_reviews: 5,
            familiar_span_days: 3.0,
            mastered_reviews: 8,
            mastered_span_days: 21.0,
        }
    }
}

impl MasteryRules {
    pub fn level(&self, review_count: u32, span: Duration) -> MasteryLevel {
        let span_days = span.num_seconds() as f32 / 86_400.0;
        if review_count >= self.mastered_reviews && span_days >= self.mastered_span_days {
            MasteryLevel::Mastered
        } else if review_count >= self.familiar_reviews && span_days >= self.familiar_span_days {
            MasteryLevel::Familiar
        } else if review_count >= self.learning_reviews {
            MasteryLevel::Learning
        } else if review_count >= self.seen_reviews {
            MasteryLevel::Seen
        } else {
            MasteryLevel::New
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    pub first_seen: DateTime<Utc>,
    pub last_reviewed: DateTime<Utc>,
    pub review_count: u32,
    pub mastery: MasteryLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyStats {
    pub words: usize,
    pub reviews: u64,
    pub by_level: BTreeMap<MasteryLevel, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyTracker {
    rules: MasteryRules,
    entries: BTreeMap<String, VocabularyEntry>,
}

/// Words are keyed case-insensitively, ignoring surrounding whitespace.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

impl VocabularyTracker {
    pub fn new(rules: MasteryRules) -> Self {
        Self {
            rules,
            entries: BTreeMap::new(),
        }
    }

    /// Rebuilds a tracker from past `(word, reviewed_at)` pairs, in any order.
    pub fn rebuild<I, S>(rules: MasteryRules, reviews: I) -> Self
    where
        I: IntoIterator<Item = (S, DateTime<Utc>)>,
        S: AsRef<str>,
    {
        let mut tracker = Self::new(rules);
        for (word, at) in reviews {
            tracker.record(word.as_ref(), at);
        }
        tracker
    }

    pub fn rules(&self) -> &MasteryRules {
        &self.rules
    }

    /// Counts one review of `word` at `at` and returns the updated entry.
    pub fn record(&mut self, word: &str, at: DateTime<Utc>) -> &VocabularyEntry {
        let rules = self.rules;
        let entry = self
            .entries
            .entry(normalize_word(word))
            .or_insert_with_key(|word| VocabularyEntry {
                word: word.clone(),
                first_seen: at,
                last_reviewed: at,
                review_count: 0,
                mastery: MasteryLevel::New,
            });
        entry.review_count += 1;
        entry.first_seen = entry.first_seen.min(at);
        entry.last_reviewed = entry.last_reviewed.max(at);
        let mastery = rules.level(entry.review_count, entry.last_reviewed - entry.first_seen);
        if mastery != entry.mastery {
            debug!("{} is now {mastery}", entry.word);
        }
        entry.mastery = mastery;
        entry
    }

    pub fn entry(&self, word: &str) -> Option<&VocabularyEntry> {
        self.entries.get(&normalize_word(word))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &VocabularyEntry> {
        self.entries.values()
    }

    /// Number of words whose mastery is strictly above `threshold`.
    pub fn count_above(&self, threshold: MasteryLevel) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.mastery > threshold)
            .count()
    }

    /// Whether at least `min_count` words are strictly above `threshold`.
    pub fn is_sufficient(&self, threshold: MasteryLevel, min_count: usize) -> bool {
        self.count_above(threshold) >= min_count
    }

    /// Words strictly above `threshold`, in alphabetical order.
    pub fn mastered_words(&self, threshold: MasteryLevel) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.mastery > threshold)
            .map(|entry| entry.word.clone())
            .collect()
    }

    pub fn stats(&self) -> VocabularyStats {
        let mut stats = VocabularyStats {
            words: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            stats.reviews += u64::from(entry.review_count);
            *stats.by_level.entry(entry.mastery).or_default() += 1;
        }
        stats
    }
}
