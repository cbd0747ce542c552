use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::Card;
use crate::error::{MorphCardsError, Result};
use crate::parameters::Parameters;
use crate::rating::Rating;
use crate::scheduler::{ReviewOutcome, Scheduler, SchedulerConfig};
use crate::sentence::SentenceGenerator;
use crate::storage::{LogFilter, Storage};
use crate::training::{Optimizer, OptimizerConfig};
use crate::vocabulary::{VocabularyStats, VocabularyTracker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckStats {
    pub cards: usize,
    pub due: usize,
    pub reviews: usize,
    pub vocabulary: VocabularyStats,
}

/// A learner's card collection: schedules reviews, keeps the history and
/// refreshes example sentences once enough vocabulary is known.
pub struct Deck<S, G> {
    storage: S,
    generator: G,
    scheduler: Scheduler,
    tracker: VocabularyTracker,
}

impl<S: Storage, G: SentenceGenerator> Deck<S, G> {
    /// Opens a deck over `storage`, rebuilding vocabulary from its review history.
    pub fn open(
        storage: S,
        generator: G,
        parameters: Parameters,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let scheduler = Scheduler::new(parameters, config)?;
        let logs = storage.review_logs(&LogFilter::default())?;
        let mut words = HashMap::new();
        let mut reviews = Vec::with_capacity(logs.len());
        for log in &logs {
            let word = match words.entry(log.card_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(storage.card(log.card_id)?.map(|card| card.word)),
            };
            match word {
                Some(word) => reviews.push((word.clone(), log.review_time)),
                None => warn!("skipping review log {} of missing card {}", log.id, log.card_id),
            }
        }
        let tracker = VocabularyTracker::rebuild(config.mastery, reviews);
        info!(
            "opened deck: {} words from {} reviews",
            tracker.len(),
            logs.len()
        );
        Ok(Self {
            storage,
            generator,
            scheduler,
            tracker,
        })
    }

    pub fn add_card(&mut self, word: &str, sentence: &str, now: DateTime<Utc>) -> Result<Card> {
        let card = Card::new(word.trim(), sentence, now);
        self.storage.upsert_card(&card)?;
        Ok(card)
    }

    pub fn card(&self, id: Uuid) -> Result<Card> {
        self.storage
            .card(id)?
            .ok_or(MorphCardsError::CardNotFound { id })
    }

    /// Reviews a stored card, persists the result and picks the sentence to
    /// show next time.
    ///
    /// Vocabulary only advances once the log and card are both stored.
    pub fn review(&mut self, card_id: Uuid, rating: Rating, now: DateTime<Utc>) -> Result<ReviewOutcome> {
        let card = self.card(card_id)?;
        let mut tracker = self.tracker.clone();
        let mut outcome = self.scheduler.review(&card, rating, now, &mut tracker)?;

        outcome.card.sentence = if outcome.vocabulary_sufficient {
            let vocabulary = tracker.mastered_words(self.scheduler.config().mastery_threshold);
            match self.generator.generate(&outcome.card.word, &vocabulary) {
                Ok(sentence) => sentence,
                Err(e) => {
                    warn!("keeping original sentence for {}: {e}", outcome.card.word);
                    outcome.card.original_sentence.clone()
                }
            }
        } else {
            outcome.card.original_sentence.clone()
        };

        self.storage.append_review_log(&outcome.log)?;
        self.storage.upsert_card(&outcome.card)?;
        self.tracker = tracker;
        Ok(outcome)
    }

    pub fn due_cards(&self, now: DateTime<Utc>) -> Result<Vec<Card>> {
        self.storage.due_cards(now)
    }

    /// Refits the scheduler's parameters from the full review history.
    ///
    /// On failure the current parameters stay in place.
    pub fn optimize_parameters(&mut self, config: OptimizerConfig) -> Result<Parameters> {
        let logs = self.storage.review_logs(&LogFilter::default())?;
        let optimizer = Optimizer::new(config, *self.scheduler.parameters());
        let parameters = optimizer.fit(&logs)?;
        self.scheduler.set_parameters(parameters);
        Ok(parameters)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<DeckStats> {
        Ok(DeckStats {
            cards: self.storage.card_count()?,
            due: self.storage.due_cards(now)?.len(),
            reviews: self.storage.review_logs(&LogFilter::default())?.len(),
            vocabulary: self.tracker.stats(),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn vocabulary(&self) -> &VocabularyTracker {
        &self.tracker
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::NoSentences;
    use crate::storage::MemoryStorage;
    use crate::test_helpers::start_time;
    use chrono::Duration;

    fn generator(word: &str, vocabulary: &[String]) -> Result<String, String> {
        Ok(format!("{word}: {}", vocabulary.join(", ")))
    }

    /// Memory storage whose log appends can be made to fail.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_appends: bool,
    }

    impl Storage for FlakyStorage {
        fn card(&self, id: Uuid) -> Result<Option<Card>> {
            self.inner.card(id)
        }

        fn upsert_card(&mut self, card: &Card) -> Result<()> {
            self.inner.upsert_card(card)
        }

        fn append_review_log(&mut self, log: &crate::card::ReviewLog) -> Result<()> {
            if self.fail_appends {
                return Err(MorphCardsError::Storage {
                    message: "disk full".into(),
                });
            }
            self.inner.append_review_log(log)
        }

        fn review_logs(&self, filter: &LogFilter) -> Result<Vec<crate::card::ReviewLog>> {
            self.inner.review_logs(filter)
        }

        fn due_cards(&self, now: DateTime<Utc>) -> Result<Vec<Card>> {
            self.inner.due_cards(now)
        }

        fn card_count(&self) -> Result<usize> {
            self.inner.card_count()
        }
    }

    #[test]
    fn review_persists_card_and_log() {
        let mut deck = Deck::open(
            MemoryStorage::new(),
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        let now = start_time();
        let card = deck.add_card(" casa ", "La casa es grande.", now).unwrap();
        assert_eq!(card.word, "casa");
        assert_eq!(deck.due_cards(now).unwrap().len(), 1);

        let outcome = deck.review(card.id, Rating::Good, now).unwrap();
        assert_eq!(deck.card(card.id).unwrap(), outcome.card);
        assert_eq!(outcome.card.sentence, "La casa es grande.");
        assert!(deck.due_cards(now).unwrap().is_empty());

        let stats = deck.stats(now + Duration::days(4)).unwrap();
        assert_eq!(stats.cards, 1);
        assert_eq!(stats.due, 1);
        assert_eq!(stats.reviews, 1);
        assert_eq!(stats.vocabulary.words, 1);
    }

    #[test]
    fn unknown_card() {
        let mut deck = Deck::open(
            MemoryStorage::new(),
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        let id = Uuid::new_v4();
        assert_eq!(
            deck.review(id, Rating::Good, start_time()),
            Err(MorphCardsError::CardNotFound { id })
        );
    }

    #[test]
    fn sentences_change_once_vocabulary_suffices() {
        let mut deck = Deck::open(
            MemoryStorage::new(),
            generator,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        let now = start_time();
        let words = ["uno", "dos", "tres", "cuatro", "cinco"];
        let mut sentences = Vec::new();
        for word in words {
            let card = deck.add_card(word, &format!("Frase con {word}."), now).unwrap();
            sentences.push(deck.review(card.id, Rating::Good, now).unwrap().card.sentence);
        }
        assert_eq!(sentences[3], "Frase con cuatro.");
        assert_eq!(sentences[4], "cinco: cinco, cuatro, dos, tres, uno");
    }

    #[test]
    fn failed_generation_falls_back() {
        let failing = |_: &str, _: &[String]| -> Result<String, String> { Err("offline".into()) };
        let config = SchedulerConfig {
            min_vocabulary: 1,
            ..Default::default()
        };
        let mut deck =
            Deck::open(MemoryStorage::new(), failing, Parameters::default(), config).unwrap();
        let now = start_time();
        let card = deck.add_card("sol", "Hace sol.", now).unwrap();
        let outcome = deck.review(card.id, Rating::Easy, now).unwrap();
        assert!(outcome.vocabulary_sufficient);
        assert_eq!(outcome.card.sentence, "Hace sol.");
    }

    #[test]
    fn reopening_rebuilds_vocabulary() {
        let mut deck = Deck::open(
            MemoryStorage::new(),
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        let now = start_time();
        let card = deck.add_card("luna", "La luna brilla.", now).unwrap();
        let outcome = deck.review(card.id, Rating::Good, now).unwrap();
        deck.review(card.id, Rating::Good, outcome.card.due).unwrap();
        let before = deck.vocabulary().clone();

        let reopened = Deck::open(
            deck.into_storage(),
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        assert_eq!(reopened.vocabulary(), &before);
    }

    #[test]
    fn failed_log_write_changes_nothing() {
        let mut deck = Deck::open(
            FlakyStorage::default(),
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        let now = start_time();
        let card = deck.add_card("casa", "La casa es grande.", now).unwrap();
        deck.storage.fail_appends = true;

        assert_eq!(
            deck.review(card.id, Rating::Good, now),
            Err(MorphCardsError::Storage {
                message: "disk full".into()
            })
        );
        assert_eq!(deck.card(card.id).unwrap(), card);
        assert_eq!(deck.stats(now).unwrap().reviews, 0);
        assert!(deck.vocabulary().is_empty());

        deck.storage.fail_appends = false;
        let outcome = deck.review(card.id, Rating::Good, now).unwrap();
        assert_eq!(outcome.card.review_count, 1);
        assert_eq!(deck.vocabulary().entry("casa").unwrap().review_count, 1);
    }

    #[test]
    fn logs_of_missing_cards_are_skipped() {
        let mut storage = MemoryStorage::new();
        let now = start_time();
        let scheduler = Scheduler::new(Parameters::default(), SchedulerConfig::default()).unwrap();
        let kept = Card::new("luna", "La luna brilla.", now);
        let deleted = Card::new("sol", "Hace sol.", now);
        storage.upsert_card(&kept).unwrap();
        for card in [&kept, &deleted] {
            let (_, log) = scheduler.next_state(card, Rating::Good, now).unwrap();
            storage.append_review_log(&log).unwrap();
        }

        let deck = Deck::open(
            storage,
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        assert_eq!(deck.vocabulary().len(), 1);
        assert!(deck.vocabulary().entry("luna").is_some());
        assert!(deck.vocabulary().entry("sol").is_none());
    }

    #[test]
    fn optimizing_without_history_keeps_parameters() {
        let mut deck = Deck::open(
            MemoryStorage::new(),
            NoSentences,
            Parameters::default(),
            SchedulerConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            deck.optimize_parameters(OptimizerConfig::new()),
            Err(MorphCardsError::InsufficientData { .. })
        ));
        assert_eq!(deck.scheduler().parameters(), &Parameters::default());
    }
}
