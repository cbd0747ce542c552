use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::card::ReviewLog;
use crate::dataset::{ReviewItem, items_from_logs};
use crate::error::{MorphCardsError, Result};
use crate::memory::{MemoryState, next_memory_state};
use crate::parameters::Parameters;
use crate::rating::Rating;

/// How well a parameter set predicts recorded outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    /// Mean binary cross-entropy between predicted recall and outcome.
    pub log_loss: f32,
    /// Root mean squared gap between predicted and observed recall, over
    /// bins of predicted recall weighted by their size.
    pub rmse_bins: f32,
    pub items: usize,
}

/// Scores `parameters` against every follow-up review found in `logs`.
pub fn evaluate(parameters: &Parameters, logs: &[ReviewLog]) -> Result<ModelEvaluation> {
    let items = items_from_logs(logs);
    if items.is_empty() {
        return Err(MorphCardsError::InsufficientData {
            reviews: logs.len(),
            required: 2,
        });
    }
    evaluate_items(parameters, &items)
}

pub(crate) fn evaluate_items(
    parameters: &Parameters,
    items: &[ReviewItem],
) -> Result<ModelEvaluation> {
    let predictions = items
        .par_iter()
        .map(|item| predict(parameters, item))
        .collect::<Result<Vec<_>>>()?;

    let log_loss = predictions
        .iter()
        .map(|&(p, y)| {
            let p = p.clamp(1e-4, 1.0 - 1e-4);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f32>()
        / predictions.len() as f32;
    let (pred, true_val): (Vec<f32>, Vec<f32>) = predictions.into_iter().unzip();

    Ok(ModelEvaluation {
        log_loss,
        rmse_bins: calibration_rmse(&pred, &true_val),
        items: items.len(),
    })
}

/// Replays the history of `item` and returns the predicted recall of its
/// last review together with the observed outcome.
fn predict(parameters: &Parameters, item: &ReviewItem) -> Result<(f32, f32)> {
    let mut state: Option<MemoryState> = None;
    for review in item.history() {
        let rating = Rating::try_from(review.rating)?;
        state = Some(next_memory_state(parameters, state, rating, review.delta_t)?);
    }
    let (Some(state), Some(current)) = (state, item.current()) else {
        return Err(MorphCardsError::InsufficientData {
            reviews: item.reviews.len(),
            required: 2,
        });
    };
    let label = if current.rating == u32::from(Rating::Again) {
        0.0
    } else {
        1.0
    };
    Ok((state.retrievability(current.delta_t), label))
}

fn get_bin(x: f32, bins: i32) -> i32 {
    let log_base = ((bins + 1) as f32).ln();
    let binned_x = (x * log_base).exp().floor() - 1.0;
    (binned_x as i32).clamp(0, bins - 1)
}

fn calibration_rmse(pred: &[f32], true_val: &[f32]) -> f32 {
    let mut groups: HashMap<i32, (f32, f32, f32)> = HashMap::new();
    for (&p, &y) in pred.iter().zip(true_val) {
        let (pred_sum, true_sum, count) = groups.entry(get_bin(p, 20)).or_default();
        *pred_sum += p;
        *true_sum += y;
        *count += 1.0;
    }

    let (total_sum, total_count) = groups.values().fold(
        (0.0, 0.0),
        |(total_sum, total_count), &(pred_sum, true_sum, count)| {
            let gap = (pred_sum - true_sum) / count;
            (total_sum + gap.powi(2) * count, total_count + count)
        },
    );
    if total_count == 0.0 {
        return 0.0;
    }
    (total_sum / total_count).sqrt()
}
