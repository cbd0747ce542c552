use std::collections::{BTreeMap, HashMap};

use log::debug;
use ndarray::Array1;

use crate::dataset::ReviewItem;
use crate::error::{MorphCardsError, Result};
use crate::memory::{DECAY, FACTOR, S_MIN};
use crate::parameters::DEFAULT_PARAMETERS;

pub(crate) const INIT_S_MAX: f32 = 100.0;

type FirstRating = u32;
type Count = u32;

/// Fits the initial stability of each first rating from the outcome of the
/// review that followed it.
///
/// Returns the four stabilities in rating order together with the number of
/// items seen per first rating.
pub fn pretrain(
    items: &[ReviewItem],
    average_recall: f32,
) -> Result<([f32; 4], HashMap<FirstRating, Count>)> {
    let pretrainset = create_pretrain_data(items);
    let rating_count = total_rating_count(&pretrainset);
    let mut rating_stability = search_parameters(&pretrainset, average_recall);
    Ok((
        smooth_and_fill(&mut rating_stability, &rating_count)?,
        rating_count,
    ))
}

struct AverageRecall {
    delta_t: f64,
    recall: f64,
    count: f64,
}

fn create_pretrain_data(items: &[ReviewItem]) -> HashMap<FirstRating, Vec<AverageRecall>> {
    // bucket follow-up delays to the hour so fractional days still group
    let mut groups: HashMap<FirstRating, BTreeMap<i64, (u32, u32)>> = HashMap::new();
    for item in items.iter().filter(|item| item.reviews.len() == 2) {
        let first_rating = item.reviews[0].rating;
        let follow_up = item.reviews[1];
        let hours = (f64::from(follow_up.delta_t) * 24.0).round() as i64;
        let (recalled, total) = groups
            .entry(first_rating)
            .or_default()
            .entry(hours)
            .or_default();
        *recalled += u32::from(follow_up.rating > 1);
        *total += 1;
    }

    groups
        .into_iter()
        .map(|(first_rating, by_delay)| {
            let data = by_delay
                .into_iter()
                .map(|(hours, (recalled, total))| AverageRecall {
                    delta_t: hours as f64 / 24.0,
                    recall: f64::from(recalled) / f64::from(total),
                    count: f64::from(total),
                })
                .collect();
            (first_rating, data)
        })
        .collect()
}

fn total_rating_count(
    pretrainset: &HashMap<FirstRating, Vec<AverageRecall>>,
) -> HashMap<FirstRating, Count> {
    pretrainset
        .iter()
        .map(|(first_rating, data)| {
            let count = data.iter().map(|d| d.count).sum::<f64>() as u32;
            (*first_rating, count)
        })
        .collect()
}

fn power_forgetting_curve(t: &Array1<f64>, s: f64) -> Array1<f64> {
    (t / s * f64::from(FACTOR) + 1.0).mapv(|v| v.powf(f64::from(DECAY)))
}

fn loss(
    delta_t: &Array1<f64>,
    recall: &Array1<f64>,
    count: &Array1<f64>,
    init_s0: f64,
    default_s0: f64,
) -> f64 {
    let y_pred = power_forgetting_curve(delta_t, init_s0).mapv(|v| v.clamp(1e-9, 1.0 - 1e-9));
    let logloss = (-(recall * y_pred.mapv(f64::ln) + (1.0 - recall) * (1.0 - &y_pred).mapv(f64::ln))
        * count)
        .sum();
    let l1 = (init_s0 - default_s0).abs() / 16.0;
    logloss + l1
}

fn default_s0(rating: FirstRating) -> f32 {
    DEFAULT_PARAMETERS[(rating.clamp(1, 4) - 1) as usize]
}

fn search_parameters(
    pretrainset: &HashMap<FirstRating, Vec<AverageRecall>>,
    average_recall: f32,
) -> HashMap<FirstRating, f32> {
    let mut optimal_stabilities = HashMap::new();

    for (&first_rating, data) in pretrainset {
        let default_s0 = f64::from(default_s0(first_rating));
        let delta_t = Array1::from_iter(data.iter().map(|d| d.delta_t));
        let count = Array1::from_iter(data.iter().map(|d| d.count));
        let recall = {
            // one pseudo-observation at the collection-wide recall rate
            let real_recall = Array1::from_iter(data.iter().map(|d| d.recall));
            (real_recall * &count + f64::from(average_recall)) / (&count + 1.0)
        };
        let mut low = f64::from(S_MIN);
        let mut high = f64::from(INIT_S_MAX);
        let mut optimal_s = default_s0;

        let mut iter = 0;
        while high - low > f64::EPSILON && iter < 1000 {
            iter += 1;
            let mid1 = low + (high - low) / 3.0;
            let mid2 = high - (high - low) / 3.0;

            let loss1 = loss(&delta_t, &recall, &count, mid1, default_s0);
            let loss2 = loss(&delta_t, &recall, &count, mid2, default_s0);

            if loss1 < loss2 {
                high = mid2;
            } else {
                low = mid1;
            }

            optimal_s = (high + low) / 2.0;
        }
        debug!("first rating {first_rating}: initial stability {optimal_s:.4}");
        optimal_stabilities.insert(first_rating, optimal_s as f32);
    }

    optimal_stabilities
}

/// Orders the fitted stabilities so a better first rating never starts with a
/// smaller stability, then fills ratings that had no data.
///
/// Missing ratings take their default scaled by the geometric mean ratio of
/// fitted to default over the ratings that were fitted.
pub(crate) fn smooth_and_fill(
    rating_stability: &mut HashMap<FirstRating, f32>,
    rating_count: &HashMap<FirstRating, Count>,
) -> Result<[f32; 4]> {
    rating_stability.retain(|key, _| rating_count.contains_key(key) && (1..=4).contains(key));
    if rating_stability.is_empty() {
        return Err(MorphCardsError::InsufficientData {
            reviews: 0,
            required: 1,
        });
    }
    for (small_rating, big_rating) in [(1, 2), (2, 3), (3, 4), (1, 3), (2, 4), (1, 4)] {
        if let (Some(&small_value), Some(&big_value)) = (
            rating_stability.get(&small_rating),
            rating_stability.get(&big_rating),
        ) {
            if small_value > big_value {
                if rating_count[&small_rating] > rating_count[&big_rating] {
                    rating_stability.insert(big_rating, small_value);
                } else {
                    rating_stability.insert(small_rating, big_value);
                }
            }
        }
    }

    let log_ratio = (1..=4)
        .filter_map(|rating| {
            rating_stability
                .get(&rating)
                .map(|&s| (s / default_s0(rating)).ln())
        })
        .sum::<f32>()
        / rating_stability.len() as f32;
    let factor = log_ratio.exp();

    let mut init_s0 = [0.0; 4];
    for (rating, s0) in (1..=4).zip(init_s0.iter_mut()) {
        *s0 = rating_stability
            .get(&rating)
            .copied()
            .unwrap_or_else(|| default_s0(rating) * factor)
            .clamp(S_MIN, INIT_S_MAX);
    }
    // filled values may still break the order around fitted ones
    for i in 1..4 {
        init_s0[i] = init_s0[i].max(init_s0[i - 1]);
    }
    Ok(init_s0)
}
