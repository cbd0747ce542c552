use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::{Card, ReviewLog};
use crate::error::Result;

/// Which review logs to load. An empty filter selects everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub card_id: Option<Uuid>,
    /// Inclusive lower bound on the review time.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the review time.
    pub until: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn card(card_id: Uuid) -> Self {
        Self {
            card_id: Some(card_id),
            ..Default::default()
        }
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
            ..Default::default()
        }
    }

    pub fn matches(&self, log: &ReviewLog) -> bool {
        self.card_id.is_none_or(|id| id == log.card_id)
            && self.since.is_none_or(|since| log.review_time >= since)
            && self.until.is_none_or(|until| log.review_time < until)
    }
}

/// Persistence for cards and their review history.
pub trait Storage {
    fn card(&self, id: Uuid) -> Result<Option<Card>>;

    fn upsert_card(&mut self, card: &Card) -> Result<()>;

    /// Logs are never modified once appended.
    fn append_review_log(&mut self, log: &ReviewLog) -> Result<()>;

    /// Matching logs ordered by review time.
    fn review_logs(&self, filter: &LogFilter) -> Result<Vec<ReviewLog>>;

    /// Cards due at or before `now`, earliest first.
    fn due_cards(&self, now: DateTime<Utc>) -> Result<Vec<Card>>;

    fn card_count(&self) -> Result<usize>;
}

/// Storage kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    cards: HashMap<Uuid, Card>,
    logs: Vec<ReviewLog>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn card(&self, id: Uuid) -> Result<Option<Card>> {
        Ok(self.cards.get(&id).cloned())
    }

    fn upsert_card(&mut self, card: &Card) -> Result<()> {
        self.cards.insert(card.id, card.clone());
        Ok(())
    }

    fn append_review_log(&mut self, log: &ReviewLog) -> Result<()> {
        self.logs.push(log.clone());
        Ok(())
    }

    fn review_logs(&self, filter: &LogFilter) -> Result<Vec<ReviewLog>> {
        let mut logs: Vec<_> = self
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.review_time);
        Ok(logs)
    }

    fn due_cards(&self, now: DateTime<Utc>) -> Result<Vec<Card>> {
        let mut due: Vec<_> = self
            .cards
            .values()
            .filter(|card| card.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|card| (card.due, card.id));
        Ok(due)
    }

    fn card_count(&self) -> Result<usize> {
        Ok(self.cards.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::Rating;
    use crate::test_helpers::start_time;
    use chrono::Duration;

    fn log(card_id: Uuid, day: i64) -> ReviewLog {
        ReviewLog {
            id: Uuid::new_v4(),
            card_id,
            review_time: start_time() + Duration::days(day),
            rating: Rating::Good,
            elapsed_days: 1.0,
            scheduled_days: 2.0,
            stability: 2.0,
            difficulty: 5.0,
            review_number: 1,
        }
    }

    #[test]
    fn upsert_replaces() {
        let mut storage = MemoryStorage::new();
        let mut card = Card::new("casa", "La casa es grande.", start_time());
        storage.upsert_card(&card).unwrap();
        card.review_count = 3;
        storage.upsert_card(&card).unwrap();
        assert_eq!(storage.card_count().unwrap(), 1);
        assert_eq!(storage.card(card.id).unwrap().unwrap().review_count, 3);
        assert_eq!(storage.card(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn filters_logs() {
        let mut storage = MemoryStorage::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for (card, day) in [(a, 3), (b, 1), (a, 0), (b, 7)] {
            storage.append_review_log(&log(card, day)).unwrap();
        }
        let all = storage.review_logs(&LogFilter::default()).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|pair| pair[0].review_time <= pair[1].review_time));

        let only_a = storage.review_logs(&LogFilter::card(a)).unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|log| log.card_id == a));

        let window = LogFilter::between(
            start_time() + Duration::days(1),
            start_time() + Duration::days(7),
        );
        assert_eq!(storage.review_logs(&window).unwrap().len(), 2);
    }

    #[test]
    fn due_cards_in_due_order() {
        let mut storage = MemoryStorage::new();
        let now = start_time();
        let mut later = Card::new("perro", "El perro ladra.", now);
        later.due = now + Duration::days(2);
        let mut soon = Card::new("gato", "El gato duerme.", now);
        soon.due = now + Duration::hours(1);
        let fresh = Card::new("casa", "La casa es grande.", now);
        for card in [&later, &soon, &fresh] {
            storage.upsert_card(card).unwrap();
        }
        assert_eq!(storage.due_cards(now).unwrap(), vec![fresh.clone()]);
        let due = storage.due_cards(now + Duration::days(1)).unwrap();
        assert_eq!(due, vec![fresh, soon]);
    }
}
