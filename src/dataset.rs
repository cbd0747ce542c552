use burn::tensor::{Shape, Tensor, TensorData, backend::Backend};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::card::ReviewLog;

/// One prediction target: a card's reviews up to and including the one
/// whose outcome is predicted from the others.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReviewItem {
    pub reviews: Vec<ItemReview>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct ItemReview {
    pub rating: u32,
    /// Days since the previous review; 0 for the first.
    pub delta_t: f32,
}

impl ReviewItem {
    pub(crate) fn history(&self) -> impl Iterator<Item = &ItemReview> {
        self.reviews.iter().take(self.reviews.len().saturating_sub(1))
    }

    pub(crate) fn current(&self) -> Option<&ItemReview> {
        self.reviews.last()
    }

    pub(crate) fn long_term_review_cnt(&self) -> usize {
        self.history().count()
    }
}

/// Builds training items from raw review logs.
///
/// Logs are grouped by card and ordered by review time. A card whose earliest
/// surviving log is not its first review cannot be replayed from the start
/// and is skipped. Every prefix of two or more reviews becomes one item.
pub fn items_from_logs(logs: &[ReviewLog]) -> Vec<ReviewItem> {
    let mut skipped = 0;
    let items: Vec<ReviewItem> = logs
        .iter()
        .sorted_by_key(|log| (log.card_id, log.review_time))
        .chunk_by(|log| log.card_id)
        .into_iter()
        .filter_map(|(_, card_logs)| {
            let card_logs: Vec<_> = card_logs.collect();
            if card_logs.first().map(|log| log.review_number) != Some(1) {
                skipped += 1;
                return None;
            }
            let reviews: Vec<ItemReview> = card_logs
                .iter()
                .enumerate()
                .map(|(i, log)| ItemReview {
                    rating: log.rating.into(),
                    delta_t: if i == 0 { 0.0 } else { log.elapsed_days.max(0.0) },
                })
                .collect();
            Some(
                (2..=reviews.len())
                    .map(|len| ReviewItem {
                        reviews: reviews[..len].to_vec(),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect();
    if skipped > 0 {
        debug!("skipped {skipped} cards without their first review");
    }
    items
}

/// Items with exactly one prior review feed pre-training; the rest train
/// the full model.
pub fn split_data(items: Vec<ReviewItem>) -> (Vec<ReviewItem>, Vec<ReviewItem>) {
    items.into_iter().partition(|item| item.reviews.len() == 2)
}

/// Padded batch of histories, laid out `[seq_len, batch_size]`.
#[derive(Debug, Clone)]
pub(crate) struct ReviewBatch<B: Backend> {
    pub t_historys: Tensor<B, 2>,
    pub r_historys: Tensor<B, 2>,
    pub delta_ts: Tensor<B, 1>,
    pub labels: Tensor<B, 1>,
}

impl<B: Backend> ReviewBatch<B> {
    /// `items` must be non-empty and every item must hold at least two reviews.
    pub(crate) fn new(items: &[ReviewItem], device: &B::Device) -> Self {
        let batch_size = items.len();
        let pad_size = items
            .iter()
            .map(ReviewItem::long_term_review_cnt)
            .max()
            .unwrap_or(0);

        let mut delta_t = vec![0.0f32; pad_size * batch_size];
        let mut rating = vec![0.0f32; pad_size * batch_size];
        for (column, item) in items.iter().enumerate() {
            for (row, review) in item.history().enumerate() {
                delta_t[row * batch_size + column] = review.delta_t;
                rating[row * batch_size + column] = review.rating as f32;
            }
        }

        let (delta_ts, labels): (Vec<f32>, Vec<f32>) = items
            .iter()
            .map(|item| match item.current() {
                Some(current) => (current.delta_t, if current.rating == 1 { 0.0 } else { 1.0 }),
                None => (0.0, 1.0),
            })
            .unzip();

        let seq = |values: Vec<f32>| {
            Tensor::<B, 1>::from_floats(
                TensorData::new(values, Shape::new([pad_size * batch_size])),
                device,
            )
            .reshape([pad_size, batch_size])
        };
        let flat = |values: Vec<f32>| {
            Tensor::<B, 1>::from_floats(TensorData::new(values, Shape::new([batch_size])), device)
        };

        Self {
            t_historys: seq(delta_t),
            r_historys: seq(rating),
            delta_ts: flat(delta_ts),
            labels: flat(labels),
        }
    }
}
